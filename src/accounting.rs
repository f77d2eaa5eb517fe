//! Memory accounting against the configured budget.
//!
//! The accountant turns the allocator's raw used-bytes figure into an
//! over/under verdict. Replica output buffers and append-log buffers are
//! transient and self-draining, so they are subtracted before comparing
//! against the budget; otherwise an eviction storm would try to reclaim
//! bytes that eviction cannot reclaim, which only makes those buffers
//! grow further.
//!
//! The fast path never computes the overhead: if raw usage is already at
//! or under the budget there is nothing to free regardless of how large
//! the buffers are.

/// Verdict and figures produced by [`assess`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryState {
    /// `true` when logical usage exceeds the budget.
    pub over_limit: bool,
    /// Raw allocator usage in bytes.
    pub total: u64,
    /// Usage minus transient replication and append-log buffers.
    pub logical: u64,
    /// Bytes to free to return under the budget; 0 when under.
    pub to_free: u64,
    /// Usage as a fraction of the budget. 0.0 when the budget is
    /// unlimited; may exceed 1.0 when over.
    pub level: f64,
}

/// Classifies memory usage against `maxmemory`.
///
/// `total` is the allocator's used-bytes reading and `overhead` the sum of
/// replica output and append-log buffer sizes. A `maxmemory` of 0 means
/// unlimited and always reports under.
///
/// # Example
///
/// ```
/// use evictkit::accounting::assess;
///
/// let state = assess(1_000, 1_400, 100);
/// assert!(state.over_limit);
/// assert_eq!(state.logical, 1_300);
/// assert_eq!(state.to_free, 300);
/// ```
pub fn assess(maxmemory: u64, total: u64, overhead: u64) -> MemoryState {
    let logical = total.saturating_sub(overhead);

    // Raw usage within budget: under, no matter the overhead.
    if maxmemory == 0 || total <= maxmemory {
        let level = if maxmemory == 0 {
            0.0
        } else {
            total as f64 / maxmemory as f64
        };
        return MemoryState {
            over_limit: false,
            total,
            logical,
            to_free: 0,
            level,
        };
    }

    let level = logical as f64 / maxmemory as f64;
    if logical <= maxmemory {
        return MemoryState {
            over_limit: false,
            total,
            logical,
            to_free: 0,
            level,
        };
    }

    MemoryState {
        over_limit: true,
        total,
        logical,
        to_free: logical - maxmemory,
        level,
    }
}
