//! Coarse clocks for access-recency tracking.
//!
//! Two ticks drive the eviction scoring math:
//!
//! - the LRU clock, a wrapping 24-bit counter advancing once per
//!   [`LRU_CLOCK_RESOLUTION_MS`], stamped on objects when they are accessed;
//! - the LFU decay clock, Unix minutes reduced to 16 bits, stored in the
//!   high half of LFU access metadata.
//!
//! The LRU tick is cached and refreshed by the server's periodic task.
//! Readers use the cached value whenever the task period (`1000 / hz` ms)
//! is at most one clock resolution, otherwise they fall through to the
//! time source. The cached value lives in an atomic so the periodic task
//! and readers never need a lock.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds per LRU clock tick.
pub const LRU_CLOCK_RESOLUTION_MS: u64 = 1000;

/// Largest representable LRU tick; the clock wraps past this value.
pub const LRU_CLOCK_MAX: u32 = (1 << 24) - 1;

/// Modulus of the LFU decay clock, in minutes.
pub const LFU_MINUTES_MODULUS: u32 = 1 << 16;

/// Source of wall-clock time consumed by [`LruClock`].
///
/// Implementations must be cheap to call; the eviction loop queries the
/// clock once per sampled key.
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// Whole seconds since the Unix epoch.
    fn unix_seconds(&self) -> u64 {
        self.now_ms() / 1000
    }
}

/// Time source backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven time source for tests and demos.
///
/// # Example
///
/// ```
/// use evictkit::clock::{ManualTimeSource, TimeSource};
///
/// let time = ManualTimeSource::new(1_000);
/// time.advance_ms(500);
/// assert_eq!(time.now_ms(), 1_500);
/// ```
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    ms: AtomicU64,
}

impl ManualTimeSource {
    /// Creates a source reporting `ms` milliseconds since the epoch.
    pub fn new(ms: u64) -> Self {
        Self {
            ms: AtomicU64::new(ms),
        }
    }

    /// Advances the reported time by `delta` milliseconds.
    pub fn advance_ms(&self, delta: u64) {
        self.ms.fetch_add(delta, Ordering::Relaxed);
    }

    /// Sets the reported time to `ms` milliseconds since the epoch.
    pub fn set_ms(&self, ms: u64) {
        self.ms.store(ms, Ordering::Relaxed);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::Relaxed)
    }
}

/// The coarse LRU clock plus the LFU minutes tick.
///
/// Owned by the eviction engine; the server's periodic task calls
/// [`refresh`](Self::refresh) at `hz` and everything else reads through
/// [`tick`](Self::tick).
pub struct LruClock {
    source: Arc<dyn TimeSource>,
    cached: AtomicU32,
    hz: u32,
}

impl std::fmt::Debug for LruClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruClock")
            .field("cached", &self.cached.load(Ordering::Relaxed))
            .field("hz", &self.hz)
            .finish()
    }
}

impl LruClock {
    /// Creates a clock over the system time source.
    pub fn new(hz: u32) -> Self {
        Self::with_source(hz, Arc::new(SystemTimeSource))
    }

    /// Creates a clock over a caller-provided time source.
    pub fn with_source(hz: u32, source: Arc<dyn TimeSource>) -> Self {
        let clock = Self {
            source,
            cached: AtomicU32::new(0),
            hz: hz.max(1),
        };
        clock.refresh();
        clock
    }

    /// Computes the current tick directly from the time source.
    #[inline]
    pub fn raw_tick(&self) -> u32 {
        ((self.source.now_ms() / LRU_CLOCK_RESOLUTION_MS) as u32) & LRU_CLOCK_MAX
    }

    /// Recomputes and stores the cached tick. Called by the periodic task.
    pub fn refresh(&self) {
        self.cached.store(self.raw_tick(), Ordering::Relaxed);
    }

    /// Returns the current LRU tick.
    ///
    /// Uses the cached value when the periodic task refreshes at least once
    /// per clock resolution, otherwise recomputes from the time source.
    #[inline]
    pub fn tick(&self) -> u32 {
        if 1000 / self.hz as u64 <= LRU_CLOCK_RESOLUTION_MS {
            self.cached.load(Ordering::Relaxed)
        } else {
            self.raw_tick()
        }
    }

    /// Estimates how long ago an object stamped with `stamp` was accessed.
    ///
    /// Handles a single wrap of the 24-bit clock; multiple wraps are not
    /// distinguishable (the clock period is about 194 days at one-second
    /// resolution).
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use evictkit::clock::{LruClock, ManualTimeSource};
    ///
    /// let time = Arc::new(ManualTimeSource::new(10_000));
    /// let clock = LruClock::with_source(10, time.clone());
    /// let stamp = clock.tick();
    ///
    /// time.advance_ms(3_000);
    /// clock.refresh();
    /// assert_eq!(clock.idle_ms(stamp), 3_000);
    /// ```
    pub fn idle_ms(&self, stamp: u32) -> u64 {
        let now = self.tick();
        let ticks = if now >= stamp {
            now - stamp
        } else {
            now + ((1u32 << 24) - stamp)
        };
        ticks as u64 * LRU_CLOCK_RESOLUTION_MS
    }

    /// Returns Unix minutes reduced modulo 2^16, the LFU decay timestamp.
    #[inline]
    pub fn lfu_minutes(&self) -> u16 {
        ((self.source.unix_seconds() / 60) % LFU_MINUTES_MODULUS as u64) as u16
    }
}
