//! Eviction policy selection and tunables.
//!
//! ## Recognized options
//!
//! | Option | Effect | Default |
//! |---|---|---|
//! | `maxmemory` | Byte budget; 0 disables eviction | 0 |
//! | `maxmemory-policy` | Algorithm and candidate scope | `noeviction` |
//! | `maxmemory-samples` | Keys sampled per populate call | 5 |
//! | `lfu-log-factor` | LFU increment probability curve | 10 |
//! | `lfu-decay-time` | Minutes per LFU decay step; 0 disables | 1 |
//! | `lazyfree-lazy-eviction` | Route eviction deletes to the background worker | off |
//! | `replica-ignore-maxmemory` | Replicas skip eviction | on |
//! | `hz` | Periodic task frequency; affects LRU clock caching | 10 |
//!
//! `allkeys-*` policies scan the full key set; `volatile-*` policies only
//! scan keys carrying a TTL.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::traits::TableScope;

/// Default number of keys sampled per populate call.
pub const DEFAULT_MAXMEMORY_SAMPLES: usize = 5;

/// Default LFU increment probability factor.
pub const DEFAULT_LFU_LOG_FACTOR: u32 = 10;

/// Default LFU decay period in minutes.
pub const DEFAULT_LFU_DECAY_TIME: u32 = 1;

/// Default periodic task frequency.
pub const DEFAULT_HZ: u32 = 10;

/// Key replacement policy applied when memory is over budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionPolicy {
    /// Refuse to evict; memory-growing commands fail while over budget.
    NoEviction,
    /// Approximate LRU over every key.
    AllkeysLru,
    /// Approximate LRU over keys with a TTL.
    VolatileLru,
    /// Approximate LFU over every key.
    AllkeysLfu,
    /// Approximate LFU over keys with a TTL.
    VolatileLfu,
    /// Uniform random over every key.
    AllkeysRandom,
    /// Uniform random over keys with a TTL.
    VolatileRandom,
    /// Evict the keys closest to expiring.
    VolatileTtl,
}

impl EvictionPolicy {
    /// `true` for policies scanning the full key set.
    #[inline]
    pub fn is_allkeys(self) -> bool {
        matches!(
            self,
            EvictionPolicy::AllkeysLru | EvictionPolicy::AllkeysLfu | EvictionPolicy::AllkeysRandom
        )
    }

    /// `true` for the approximate-LRU family.
    #[inline]
    pub fn uses_lru(self) -> bool {
        matches!(self, EvictionPolicy::AllkeysLru | EvictionPolicy::VolatileLru)
    }

    /// `true` for the approximate-LFU family.
    #[inline]
    pub fn uses_lfu(self) -> bool {
        matches!(self, EvictionPolicy::AllkeysLfu | EvictionPolicy::VolatileLfu)
    }

    /// `true` for uniform random victim selection.
    #[inline]
    pub fn is_random(self) -> bool {
        matches!(
            self,
            EvictionPolicy::AllkeysRandom | EvictionPolicy::VolatileRandom
        )
    }

    /// `true` for policies selecting victims through the candidate pool.
    #[inline]
    pub fn uses_pool(self) -> bool {
        self.uses_lru() || self.uses_lfu() || self == EvictionPolicy::VolatileTtl
    }

    /// Which table victims are drawn from.
    #[inline]
    pub fn sample_scope(self) -> TableScope {
        if self.is_allkeys() {
            TableScope::Main
        } else {
            TableScope::Expires
        }
    }

    /// Canonical configuration name.
    pub fn as_str(self) -> &'static str {
        match self {
            EvictionPolicy::NoEviction => "noeviction",
            EvictionPolicy::AllkeysLru => "allkeys-lru",
            EvictionPolicy::VolatileLru => "volatile-lru",
            EvictionPolicy::AllkeysLfu => "allkeys-lfu",
            EvictionPolicy::VolatileLfu => "volatile-lfu",
            EvictionPolicy::AllkeysRandom => "allkeys-random",
            EvictionPolicy::VolatileRandom => "volatile-random",
            EvictionPolicy::VolatileTtl => "volatile-ttl",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noeviction" => Ok(EvictionPolicy::NoEviction),
            "allkeys-lru" => Ok(EvictionPolicy::AllkeysLru),
            "volatile-lru" => Ok(EvictionPolicy::VolatileLru),
            "allkeys-lfu" => Ok(EvictionPolicy::AllkeysLfu),
            "volatile-lfu" => Ok(EvictionPolicy::VolatileLfu),
            "allkeys-random" => Ok(EvictionPolicy::AllkeysRandom),
            "volatile-random" => Ok(EvictionPolicy::VolatileRandom),
            "volatile-ttl" => Ok(EvictionPolicy::VolatileTtl),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Tunables driving the eviction engine.
///
/// # Example
///
/// ```
/// use evictkit::config::{EvictionConfig, EvictionPolicy};
///
/// let config = EvictionConfig::default()
///     .maxmemory(64 * 1024 * 1024)
///     .policy(EvictionPolicy::AllkeysLru)
///     .maxmemory_samples(10);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionConfig {
    /// Byte budget for resident data; 0 means unlimited.
    pub maxmemory: u64,
    /// Replacement policy.
    pub policy: EvictionPolicy,
    /// Keys sampled from each database per populate call.
    pub maxmemory_samples: usize,
    /// LFU increment probability factor.
    pub lfu_log_factor: u32,
    /// Minutes per LFU decay step; 0 disables decay.
    pub lfu_decay_time: u32,
    /// Route eviction deletes to the background worker.
    pub lazyfree_lazy_eviction: bool,
    /// Replicas skip eviction and mirror their master exactly.
    pub replica_ignore_maxmemory: bool,
    /// Periodic task frequency.
    pub hz: u32,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            maxmemory: 0,
            policy: EvictionPolicy::NoEviction,
            maxmemory_samples: DEFAULT_MAXMEMORY_SAMPLES,
            lfu_log_factor: DEFAULT_LFU_LOG_FACTOR,
            lfu_decay_time: DEFAULT_LFU_DECAY_TIME,
            lazyfree_lazy_eviction: false,
            replica_ignore_maxmemory: true,
            hz: DEFAULT_HZ,
        }
    }
}

impl EvictionConfig {
    /// Sets the byte budget.
    pub fn maxmemory(mut self, bytes: u64) -> Self {
        self.maxmemory = bytes;
        self
    }

    /// Sets the replacement policy.
    pub fn policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the per-populate sample count.
    pub fn maxmemory_samples(mut self, samples: usize) -> Self {
        self.maxmemory_samples = samples;
        self
    }

    /// Sets the LFU increment probability factor.
    pub fn lfu_log_factor(mut self, factor: u32) -> Self {
        self.lfu_log_factor = factor;
        self
    }

    /// Sets the LFU decay period in minutes.
    pub fn lfu_decay_time(mut self, minutes: u32) -> Self {
        self.lfu_decay_time = minutes;
        self
    }

    /// Enables or disables lazy eviction deletes.
    pub fn lazyfree_lazy_eviction(mut self, enabled: bool) -> Self {
        self.lazyfree_lazy_eviction = enabled;
        self
    }

    /// Sets whether replicas skip eviction.
    pub fn replica_ignore_maxmemory(mut self, enabled: bool) -> Self {
        self.replica_ignore_maxmemory = enabled;
        self
    }

    /// Sets the periodic task frequency.
    pub fn hz(mut self, hz: u32) -> Self {
        self.hz = hz;
        self
    }

    /// Validates parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maxmemory_samples == 0 {
            return Err(ConfigError::OutOfRange {
                option: "maxmemory-samples",
                constraint: "must be > 0",
            });
        }
        if self.hz == 0 {
            return Err(ConfigError::OutOfRange {
                option: "hz",
                constraint: "must be > 0",
            });
        }
        Ok(())
    }
}
