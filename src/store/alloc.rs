//! Shared used-bytes counter standing in for the allocator.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::traits::Allocator;

/// Byte counter charged by stores on insert and released on delete.
///
/// The counter is a single atomic so the eviction loop can read it while
/// a background lazy-free worker concurrently returns memory.
///
/// # Example
///
/// ```
/// use evictkit::store::TrackingAllocator;
/// use evictkit::traits::Allocator;
///
/// let alloc = TrackingAllocator::new();
/// alloc.grow(1_024);
/// alloc.release(256);
/// assert_eq!(alloc.used_bytes(), 768);
/// ```
#[derive(Debug, Default)]
pub struct TrackingAllocator {
    used: AtomicU64,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charges `bytes` to the counter.
    pub fn grow(&self, bytes: u64) {
        self.used.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns `bytes` to the counter, clamping at zero.
    pub fn release(&self, bytes: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes))
            });
    }
}

impl Allocator for TrackingAllocator {
    fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn grow_and_release_balance_out() {
        let alloc = TrackingAllocator::new();
        alloc.grow(500);
        alloc.grow(300);
        alloc.release(200);
        assert_eq!(alloc.used_bytes(), 600);
    }

    #[test]
    fn release_clamps_at_zero() {
        let alloc = TrackingAllocator::new();
        alloc.grow(10);
        alloc.release(1_000);
        assert_eq!(alloc.used_bytes(), 0);
    }

    #[test]
    fn counter_is_shared_through_arc() {
        let alloc = Arc::new(TrackingAllocator::new());
        let clone = alloc.clone();
        clone.grow(42);
        assert_eq!(alloc.used_bytes(), 42);

        // Arc also satisfies the Allocator trait directly.
        fn used<A: crate::traits::Allocator>(a: &A) -> u64 {
            a.used_bytes()
        }
        assert_eq!(used(&alloc), 42);
    }

    #[test]
    fn concurrent_updates_do_not_lose_counts() {
        let alloc = Arc::new(TrackingAllocator::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let alloc = alloc.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1_000 {
                    alloc.grow(3);
                    alloc.release(1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(alloc.used_bytes(), 4 * 1_000 * 2);
    }
}
