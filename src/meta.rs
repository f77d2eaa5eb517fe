//! Bit-packed per-object access metadata.
//!
//! Every stored object carries a 24-bit word whose interpretation depends
//! on the active policy family:
//!
//! ```text
//!   LRU mode                          LFU mode
//!   ┌────────────────────────┐        ┌────────────────┬────────┐
//!   │   last-access tick:24  │        │     ldt:16     │ ctr:8  │
//!   └────────────────────────┘        └────────────────┴────────┘
//!     wrapping LRU clock value          last decay time  log counter
//!                                       (Unix minutes)   [0, 255]
//! ```
//!
//! The counter is logarithmic: the higher it gets, the less likely an
//! access is to advance it. It also decays as minutes elapse so that keys
//! hot in the past do not stay ranked hot forever. Decay is computed on
//! demand for scoring and is only written back on a real access.
//!
//! New LFU objects start at [`LFU_INIT_VAL`] rather than zero so they can
//! collect a few accesses before becoming eviction bait.
//!
//! The word is opaque: collaborators go through the typed accessors and
//! never see the raw bits.

use crate::clock::LRU_CLOCK_MAX;
use crate::rng::XorShift64;

/// Initial LFU counter for newly created objects.
pub const LFU_INIT_VAL: u8 = 5;

/// Saturation value of the LFU counter.
pub const LFU_COUNTER_MAX: u8 = 255;

/// The 24-bit access-metadata word attached to each stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessMeta(u32);

impl AccessMeta {
    /// Encodes an LRU clock reading. Ticks beyond 24 bits are wrapped.
    #[inline]
    pub fn encode_lru(tick: u32) -> Self {
        Self(tick & LRU_CLOCK_MAX)
    }

    /// Decodes the stored LRU clock reading.
    #[inline]
    pub fn lru_tick(self) -> u32 {
        self.0 & LRU_CLOCK_MAX
    }

    /// Encodes an LFU pair of last-decay-time minutes and counter.
    #[inline]
    pub fn encode_lfu(ldt: u16, counter: u8) -> Self {
        Self(((ldt as u32) << 8) | counter as u32)
    }

    /// Decodes the LFU pair as `(ldt, counter)`.
    #[inline]
    pub fn decode_lfu(self) -> (u16, u8) {
        (self.lfu_ldt(), self.lfu_counter())
    }

    /// The last decay time, in Unix minutes modulo 2^16.
    #[inline]
    pub fn lfu_ldt(self) -> u16 {
        ((self.0 >> 8) & 0xFFFF) as u16
    }

    /// The logarithmic access counter.
    #[inline]
    pub fn lfu_counter(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Metadata for a freshly created object under an LFU policy: current
    /// minutes tick and a counter of [`LFU_INIT_VAL`].
    #[inline]
    pub fn initial_lfu(now_minutes: u16) -> Self {
        Self::encode_lfu(now_minutes, LFU_INIT_VAL)
    }
}

/// Minutes elapsed since `ldt`, treating the 16-bit minutes clock as
/// wrapping exactly once.
#[inline]
pub fn lfu_time_elapsed(ldt: u16, now_minutes: u16) -> u32 {
    if now_minutes >= ldt {
        (now_minutes - ldt) as u32
    } else {
        (1u32 << 16) - ldt as u32 + now_minutes as u32
    }
}

/// Logarithmically increments a counter, saturating at 255.
///
/// The probability of advancing is `1 / (base * log_factor + 1)` where
/// `base = max(0, counter - LFU_INIT_VAL)`, so counters already above the
/// initial value advance increasingly rarely.
pub fn lfu_log_incr(counter: u8, log_factor: u32, rng: &mut XorShift64) -> u8 {
    if counter == LFU_COUNTER_MAX {
        return LFU_COUNTER_MAX;
    }
    let base = counter.saturating_sub(LFU_INIT_VAL) as f64;
    let p = 1.0 / (base * log_factor as f64 + 1.0);
    if rng.next_f64() < p {
        counter + 1
    } else {
        counter
    }
}

/// Returns the counter after applying time decay, without persisting it.
///
/// One decrement per `decay_time` minutes elapsed since the stored decay
/// timestamp; `decay_time == 0` disables decay. The caller uses the result
/// for scoring only. Real accesses rewrite the metadata via
/// [`on_access_lfu`].
pub fn lfu_decay(meta: AccessMeta, now_minutes: u16, decay_time: u32) -> u8 {
    let counter = meta.lfu_counter();
    if decay_time == 0 {
        return counter;
    }
    let periods = lfu_time_elapsed(meta.lfu_ldt(), now_minutes) / decay_time;
    if periods >= counter as u32 {
        0
    } else {
        counter - periods as u8
    }
}

/// Metadata written when an object is accessed under an LRU policy.
#[inline]
pub fn on_access_lru(tick: u32) -> AccessMeta {
    AccessMeta::encode_lru(tick)
}

/// Metadata written when an object is accessed under an LFU policy.
///
/// Realizes any pending decay, then applies the probabilistic increment,
/// and stamps the current minutes tick as the new decay baseline.
pub fn on_access_lfu(
    meta: AccessMeta,
    now_minutes: u16,
    log_factor: u32,
    decay_time: u32,
    rng: &mut XorShift64,
) -> AccessMeta {
    let counter = lfu_decay(meta, now_minutes, decay_time);
    let counter = lfu_log_incr(counter, log_factor, rng);
    AccessMeta::encode_lfu(now_minutes, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_round_trips_and_masks_to_24_bits() {
        let meta = AccessMeta::encode_lru(0x00ab_cdef);
        assert_eq!(meta.lru_tick(), 0x00ab_cdef);

        let wrapped = AccessMeta::encode_lru(0xff00_0001);
        assert_eq!(wrapped.lru_tick(), 0x0000_0001);
    }

    #[test]
    fn lfu_round_trips_both_fields() {
        let meta = AccessMeta::encode_lfu(0xbeef, 42);
        assert_eq!(meta.decode_lfu(), (0xbeef, 42));
        assert_eq!(meta.lfu_ldt(), 0xbeef);
        assert_eq!(meta.lfu_counter(), 42);
    }

    #[test]
    fn initial_lfu_starts_at_init_val() {
        let meta = AccessMeta::initial_lfu(100);
        assert_eq!(meta.decode_lfu(), (100, LFU_INIT_VAL));
    }

    #[test]
    fn elapsed_handles_minute_clock_wrap() {
        assert_eq!(lfu_time_elapsed(10, 15), 5);
        assert_eq!(lfu_time_elapsed(15, 15), 0);
        // ldt near the top of the 16-bit range, now just past the wrap.
        assert_eq!(lfu_time_elapsed(65_530, 4), 10);
    }

    #[test]
    fn saturated_counter_never_advances() {
        let mut rng = XorShift64::new(1);
        for _ in 0..1_000 {
            assert_eq!(lfu_log_incr(LFU_COUNTER_MAX, 10, &mut rng), LFU_COUNTER_MAX);
        }
    }

    #[test]
    fn counters_at_or_below_init_val_always_advance() {
        // base = 0 means p = 1, so the increment is certain.
        let mut rng = XorShift64::new(2);
        for c in 0..=LFU_INIT_VAL {
            assert_eq!(lfu_log_incr(c, 10, &mut rng), c + 1);
        }
    }

    #[test]
    fn increment_rate_matches_expected_probability() {
        // At a fixed counter the hit rate over many draws approaches
        // 1 / (base * log_factor + 1).
        let log_factor = 10;
        let counter = 15; // base = 10, p = 1/101
        let trials = 50_000u32;

        let mut rng = XorShift64::new(0xfeed);
        let mut hits = 0u32;
        for _ in 0..trials {
            if lfu_log_incr(counter, log_factor, &mut rng) == counter + 1 {
                hits += 1;
            }
        }

        let expected = trials as f64 / 101.0;
        let ratio = hits as f64 / expected;
        assert!(
            (0.7..1.3).contains(&ratio),
            "got {} hits, expected about {}",
            hits,
            expected
        );
    }

    #[test]
    fn decay_is_disabled_when_decay_time_is_zero() {
        let meta = AccessMeta::encode_lfu(0, 200);
        assert_eq!(lfu_decay(meta, 60_000, 0), 200);
    }

    #[test]
    fn decay_subtracts_one_per_period() {
        let meta = AccessMeta::encode_lfu(100, 20);
        assert_eq!(lfu_decay(meta, 100, 1), 20);
        assert_eq!(lfu_decay(meta, 105, 1), 15);
        assert_eq!(lfu_decay(meta, 105, 2), 18);
    }

    #[test]
    fn decay_floors_at_zero() {
        let meta = AccessMeta::encode_lfu(0, 3);
        assert_eq!(lfu_decay(meta, 1_000, 1), 0);
    }

    #[test]
    fn decay_does_not_mutate_the_word() {
        let meta = AccessMeta::encode_lfu(100, 20);
        let _ = lfu_decay(meta, 500, 1);
        assert_eq!(meta.decode_lfu(), (100, 20));
    }

    #[test]
    fn access_under_lfu_realizes_decay_then_increments() {
        // Counter 20 with 10 elapsed minutes at decay_time 1 decays to 10,
        // then the increment applies with base 5 (p = 1/51).
        let meta = AccessMeta::encode_lfu(100, 20);
        let mut rng = XorShift64::new(3);
        let updated = on_access_lfu(meta, 110, 10, 1, &mut rng);
        assert_eq!(updated.lfu_ldt(), 110);
        let counter = updated.lfu_counter();
        assert!(counter == 10 || counter == 11);
    }
}
