//! Sampling and scoring of eviction candidates.
//!
//! Each populate pass draws a handful of keys from pseudo-random positions
//! in one database's table, scores them under the active policy, and
//! offers them to the candidate pool. The score is called `idle` because
//! the code grew out of LRU, but it is just a number where higher means a
//! better eviction candidate:
//!
//! | Policy family | score |
//! |---|---|
//! | `*-lru` | estimated idle milliseconds |
//! | `*-lfu` | `255 - decayed counter` |
//! | `volatile-ttl` | `u64::MAX - absolute expiry` |
//!
//! For `volatile-lru` and `volatile-lfu` the sampled table maps keys to
//! expiry timestamps, so the access metadata is fetched from the main
//! table. For `volatile-ttl` the expiry timestamp itself is the input and
//! no second lookup happens.

use crate::clock::LruClock;
use crate::config::{EvictionConfig, EvictionPolicy};
use crate::meta::{lfu_decay, AccessMeta, LFU_COUNTER_MAX};
use crate::pool::EvictionPool;
use crate::traits::{KeySpace, Sample, SamplePayload};

/// Draws up to `maxmemory_samples` keys from `db` and merges them into the
/// pool. Returns how many candidates the pool accepted.
///
/// Samples whose key vanished between draw and score are skipped.
pub fn populate<D: KeySpace>(
    pool: &mut EvictionPool,
    dbid: usize,
    db: &mut D,
    config: &EvictionConfig,
    clock: &LruClock,
) -> usize {
    let scope = config.policy.sample_scope();
    let mut samples = Vec::with_capacity(config.maxmemory_samples);
    db.sample_into(scope, config.maxmemory_samples, &mut samples);

    let mut accepted = 0;
    for sample in &samples {
        let Some(idle) = score(sample, db, config, clock) else {
            continue;
        };
        if pool.try_insert(idle, dbid, &sample.key) {
            accepted += 1;
        }
    }
    accepted
}

/// Scores one sampled key under the active policy.
///
/// Returns `None` when the value needed for scoring is gone (the key was
/// deleted since sampling).
fn score<D: KeySpace>(
    sample: &Sample,
    db: &D,
    config: &EvictionConfig,
    clock: &LruClock,
) -> Option<u64> {
    match config.policy {
        EvictionPolicy::AllkeysLru | EvictionPolicy::VolatileLru => {
            let meta = meta_for(sample, db)?;
            Some(clock.idle_ms(meta.lru_tick()))
        }
        EvictionPolicy::AllkeysLfu | EvictionPolicy::VolatileLfu => {
            let meta = meta_for(sample, db)?;
            let counter = lfu_decay(meta, clock.lfu_minutes(), config.lfu_decay_time);
            Some((LFU_COUNTER_MAX - counter) as u64)
        }
        EvictionPolicy::VolatileTtl => match sample.payload {
            // The expiring table maps keys directly to their deadline; the
            // sooner the expiry, the better the candidate.
            SamplePayload::ExpiryMs(at) => Some(u64::MAX - at),
            SamplePayload::Meta(_) => None,
        },
        EvictionPolicy::NoEviction
        | EvictionPolicy::AllkeysRandom
        | EvictionPolicy::VolatileRandom => {
            unreachable!("policy {} does not score candidates", config.policy)
        }
    }
}

/// Access metadata for a sample, looking it up in the main table when the
/// sample came from the expiring table.
fn meta_for<D: KeySpace>(sample: &Sample, db: &D) -> Option<AccessMeta> {
    match sample.payload {
        SamplePayload::Meta(meta) => Some(meta),
        SamplePayload::ExpiryMs(_) => db.access_meta(&sample.key),
    }
}
