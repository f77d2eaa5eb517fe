//! Counters and latency trackers written by the eviction engine.

use std::time::Duration;

use crate::metrics::snapshot::{EvictionMetricsSnapshot, LatencySnapshot};

/// Running latency aggregate for one event tag.
///
/// Tracks sample count, total, and worst case in microseconds. Cheap
/// enough to update on every eviction cycle.
#[derive(Debug, Default, Clone)]
pub struct LatencyTracker {
    samples: u64,
    total_us: u64,
    max_us: u64,
}

impl LatencyTracker {
    /// Folds one measured duration into the aggregate.
    pub fn record(&mut self, elapsed: Duration) {
        let us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self.samples += 1;
        self.total_us += us;
        self.max_us = self.max_us.max(us);
    }

    /// Number of recorded samples.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Copies the aggregate out.
    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            samples: self.samples,
            total_us: self.total_us,
            max_us: self.max_us,
        }
    }
}

/// Cumulative eviction statistics since engine creation.
#[derive(Debug, Default, Clone)]
pub struct EvictionMetrics {
    /// Keys deleted by eviction.
    pub evicted_keys: u64,
    /// Cycles that entered the eviction loop.
    pub cycles: u64,
    /// Cycles refused because the policy forbids eviction.
    pub cycles_blocked: u64,
    /// Cycles that ran out of eligible keys.
    pub cycles_no_candidates: u64,
    /// Cycles rescued by the lazy-free backstop after falling short.
    pub backstop_rescues: u64,
    /// Whole-cycle latency, tagged `eviction-cycle`.
    pub eviction_cycle: LatencyTracker,
    /// Per-victim delete latency, tagged `eviction-del`.
    pub eviction_del: LatencyTracker,
    /// Backstop wait latency, tagged `eviction-lazyfree`.
    pub eviction_lazyfree: LatencyTracker,
}

impl EvictionMetrics {
    /// Copies every counter out.
    pub fn snapshot(&self) -> EvictionMetricsSnapshot {
        EvictionMetricsSnapshot {
            evicted_keys: self.evicted_keys,
            cycles: self.cycles,
            cycles_blocked: self.cycles_blocked,
            cycles_no_candidates: self.cycles_no_candidates,
            backstop_rescues: self.backstop_rescues,
            eviction_cycle: self.eviction_cycle.snapshot(),
            eviction_del: self.eviction_del.snapshot(),
            eviction_lazyfree: self.eviction_lazyfree.snapshot(),
        }
    }
}
