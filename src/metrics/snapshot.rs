//! Point-in-time copies of eviction metrics.

/// Latency aggregate for one event tag.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatencySnapshot {
    pub samples: u64,
    pub total_us: u64,
    pub max_us: u64,
}

impl LatencySnapshot {
    /// Mean sample latency in microseconds; 0 when empty.
    pub fn mean_us(&self) -> u64 {
        if self.samples == 0 {
            0
        } else {
            self.total_us / self.samples
        }
    }
}

/// Copy of every eviction counter at snapshot time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionMetricsSnapshot {
    pub evicted_keys: u64,
    pub cycles: u64,
    pub cycles_blocked: u64,
    pub cycles_no_candidates: u64,
    pub backstop_rescues: u64,

    pub eviction_cycle: LatencySnapshot,
    pub eviction_del: LatencySnapshot,
    pub eviction_lazyfree: LatencySnapshot,
}
