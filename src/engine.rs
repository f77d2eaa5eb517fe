//! The eviction loop and its safety wrapper.
//!
//! [`EvictionEngine`] owns the process-wide eviction state (candidate
//! pool, round-robin database cursor, clock, metrics) and drives the
//! collaborators through [`EvictionHost`]. It runs on the server's main
//! event-loop thread and takes no locks; the only cross-thread state it
//! reads is the allocator's used-bytes counter.
//!
//! ## Control flow
//!
//! ```text
//!   try_free_memory_safely
//!        │  declines while loading or a script is past its timeout
//!        ▼
//!   try_free_memory
//!        │  replica-with-ignore / paused clients → OK, untouched
//!        │  accountant under budget            → OK, untouched
//!        │  policy is noeviction               → ERR (via backstop)
//!        ▼
//!   while freed < target:
//!        ├─ pool policies: populate pool from every database,
//!        │                 consume from the high end, skip ghosts
//!        ├─ random policies: rotate the db cursor, pick one random key
//!        ├─ no victim → ERR (via backstop)
//!        ├─ propagate expire → delete (sync or lazy) → accrue freed
//!        │  bytes → stats → events → flush replica buffers
//!        └─ lazy eviction: every 16 keys re-ask the accountant, the
//!           background worker may already have retired enough bytes
//!        ▼
//!   backstop (only when the result is ERR):
//!        while lazy-free jobs are pending, sleep 1 ms and re-ask the
//!        accountant; flip to OK the moment it reports under budget
//! ```
//!
//! Candidates in the pool are snapshots: between populate and consume a
//! key can be removed by expiry or a concurrent cycle. The consumer
//! clears each visited slot unconditionally and verifies the key against
//! its table, so stale entries cost one lookup and nothing else.
//!
//! Populate passes walk every database rather than the victim's own:
//! the policy is process-global and sampling a single database would bias
//! eviction toward it.

use std::thread;
use std::time::{Duration, Instant};

use crate::accounting::{assess, MemoryState};
use crate::clock::LruClock;
use crate::config::EvictionConfig;
use crate::error::EvictError;
use crate::metrics::{EvictionMetrics, EvictionMetricsSnapshot};
use crate::pool::EvictionPool;
use crate::sampler;
use crate::traits::{Allocator, EventNotifier, EvictionHost, KeySpace, LazyFree, ReplicationSink};

/// How often the lazy-eviction loop re-consults the accountant.
const LAZY_RECHECK_PERIOD: u64 = 16;

/// Sleep between backstop polls of the accountant.
const BACKSTOP_POLL: Duration = Duration::from_millis(1);

/// What one successful call freed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FreeSummary {
    /// Bytes reclaimed, as observed through the allocator.
    pub freed_bytes: u64,
    /// Keys deleted by this call.
    pub evicted_keys: u64,
}

/// Process-wide eviction state and entry points.
#[derive(Debug)]
pub struct EvictionEngine {
    config: EvictionConfig,
    clock: LruClock,
    pool: EvictionPool,
    next_db: usize,
    metrics: EvictionMetrics,
}

impl EvictionEngine {
    /// Creates an engine over the system clock.
    pub fn new(config: EvictionConfig) -> Self {
        let clock = LruClock::new(config.hz);
        Self::with_clock(config, clock)
    }

    /// Creates an engine over a caller-provided clock.
    pub fn with_clock(config: EvictionConfig, clock: LruClock) -> Self {
        Self {
            config,
            clock,
            pool: EvictionPool::new(),
            next_db: 0,
            metrics: EvictionMetrics::default(),
        }
    }

    pub fn config(&self) -> &EvictionConfig {
        &self.config
    }

    /// Mutable access for runtime reconfiguration.
    pub fn config_mut(&mut self) -> &mut EvictionConfig {
        &mut self.config
    }

    /// The engine's clock; the server's periodic task refreshes it.
    pub fn clock(&self) -> &LruClock {
        &self.clock
    }

    pub fn pool(&self) -> &EvictionPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut EvictionPool {
        &mut self.pool
    }

    /// Copies the cumulative eviction statistics out.
    pub fn metrics(&self) -> EvictionMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Classifies current memory usage against the configured budget.
    pub fn maxmemory_state<H: EvictionHost>(&self, host: &H) -> MemoryState {
        assess(
            self.config.maxmemory,
            host.allocator().used_bytes(),
            host.replication().not_counted_bytes(),
        )
    }

    /// Entry point for callers that may be in a forbidden state.
    ///
    /// Declines without acting while persistent state is loading or an
    /// embedded script has exceeded its timeout; eviction mid-load would
    /// fight the loader, and a stuck script must observe a frozen dataset.
    pub fn try_free_memory_safely<H: EvictionHost>(
        &mut self,
        host: &mut H,
    ) -> Result<FreeSummary, EvictError> {
        if host.script_timed_out() || host.is_loading() {
            return Ok(FreeSummary::default());
        }
        self.try_free_memory(host)
    }

    /// Frees memory until usage returns under the budget.
    ///
    /// Returns `Ok` when the accountant reports under budget on entry or
    /// after work, `Err` otherwise. Each call is one bounded attempt; the
    /// caller retries implicitly on its next write.
    pub fn try_free_memory<H: EvictionHost>(
        &mut self,
        host: &mut H,
    ) -> Result<FreeSummary, EvictError> {
        // Replicas configured to mirror their master exactly never evict.
        if host.is_replica() && self.config.replica_ignore_maxmemory {
            return Ok(FreeSummary::default());
        }
        // While clients are paused the dataset must appear static.
        if host.clients_paused() {
            return Ok(FreeSummary::default());
        }

        let state = self.maxmemory_state(host);
        if !state.over_limit {
            return Ok(FreeSummary::default());
        }

        self.metrics.cycles += 1;
        let cycle_started = Instant::now();

        let mut summary = FreeSummary::default();
        let result = self.evict_until_under(host, state.to_free, &mut summary);
        let result = match result {
            Ok(()) => Ok(()),
            Err(err) => self.backstop(host, err),
        };

        self.metrics.eviction_cycle.record(cycle_started.elapsed());
        result.map(|()| summary)
    }

    fn evict_until_under<H: EvictionHost>(
        &mut self,
        host: &mut H,
        to_free: u64,
        summary: &mut FreeSummary,
    ) -> Result<(), EvictError> {
        if !self.config.policy.uses_pool() && !self.config.policy.is_random() {
            self.metrics.cycles_blocked += 1;
            return Err(EvictError::PolicyForbids);
        }

        let mut freed: u64 = 0;
        let mut keys_freed: u64 = 0;
        let lazy = self.config.lazyfree_lazy_eviction;

        while freed < to_free {
            let Some((dbid, key)) = self.select_victim(host) else {
                self.metrics.cycles_no_candidates += 1;
                let err = if keys_freed == 0 {
                    EvictError::NoCandidates
                } else {
                    EvictError::InsufficientProgress
                };
                summary.freed_bytes = freed;
                summary.evicted_keys = keys_freed;
                return Err(err);
            };

            // Replicas and the append log must drop the key too. The bytes
            // this propagation itself buffers are not charged against the
            // freed total; those buffers drain on their own.
            host.replication_mut().propagate_expire(dbid, &key, lazy);

            let used_before = host.allocator().used_bytes();
            let del_started = Instant::now();
            let deleted = if lazy {
                host.db_mut(dbid).delete_async(&key)
            } else {
                host.db_mut(dbid).delete_sync(&key)
            };
            self.metrics.eviction_del.record(del_started.elapsed());
            debug_assert!(deleted, "victim vanished between lookup and delete");

            let used_after = host.allocator().used_bytes();
            freed += used_before.saturating_sub(used_after);
            keys_freed += 1;
            self.metrics.evicted_keys += 1;

            host.events().signal_modified_key(dbid, &key);
            host.events().notify_evicted(dbid, &key);

            // Big eviction waves would otherwise starve replicas of the
            // deletions they need to apply.
            if host.replication().replica_count() > 0 {
                host.replication_mut().flush_replica_buffers();
            }

            // Under lazy eviction the per-victim delta understates real
            // progress because the worker retires bytes concurrently.
            if lazy && keys_freed % LAZY_RECHECK_PERIOD == 0 {
                if !self.maxmemory_state(host).over_limit {
                    freed = to_free;
                }
            }
        }

        summary.freed_bytes = freed;
        summary.evicted_keys = keys_freed;
        Ok(())
    }

    fn select_victim<H: EvictionHost>(&mut self, host: &mut H) -> Option<(usize, Vec<u8>)> {
        if self.config.policy.uses_pool() {
            self.select_from_pool(host)
        } else {
            self.select_random(host)
        }
    }

    /// Pool-based selection: sample every database into the pool, then
    /// consume from the best end, dropping ghosts as they surface.
    fn select_from_pool<H: EvictionHost>(&mut self, host: &mut H) -> Option<(usize, Vec<u8>)> {
        let scope = self.config.policy.sample_scope();
        loop {
            let mut total_keys = 0;
            for dbid in 0..host.db_count() {
                let db = host.db_mut(dbid);
                let keys = db.count(scope);
                if keys != 0 {
                    sampler::populate(&mut self.pool, dbid, db, &self.config, &self.clock);
                    total_keys += keys;
                }
            }
            if total_keys == 0 {
                return None;
            }

            while let Some(candidate) = self.pool.pop_worst() {
                if host.db(candidate.dbid).contains(scope, &candidate.key) {
                    return Some((candidate.dbid, candidate.key));
                }
                // Ghost: the key was deleted after it entered the pool.
                // Its slot is already reclaimed; try the next best.
            }
            // Every pool entry was a ghost. Sample again.
        }
    }

    /// Random selection: resume the rotating cursor at the next database
    /// with eligible keys and take one at random.
    fn select_random<H: EvictionHost>(&mut self, host: &mut H) -> Option<(usize, Vec<u8>)> {
        let scope = self.config.policy.sample_scope();
        let db_count = host.db_count();
        if db_count == 0 {
            return None;
        }
        for _ in 0..db_count {
            self.next_db = (self.next_db + 1) % db_count;
            let dbid = self.next_db;
            let db = host.db_mut(dbid);
            if db.count(scope) != 0 {
                if let Some(key) = db.random_key(scope) {
                    return Some((dbid, key));
                }
            }
        }
        None
    }

    /// Last chance on a failed cycle: while the background worker still
    /// holds destruction jobs, their bytes may yet come back. Poll the
    /// accountant until the queue drains or the budget is met.
    fn backstop<H: EvictionHost>(&mut self, host: &H, err: EvictError) -> Result<(), EvictError> {
        let wait_started = Instant::now();
        let mut result = Err(err);
        while host.lazy_free().pending_jobs() > 0 {
            if !self.maxmemory_state(host).over_limit {
                self.metrics.backstop_rescues += 1;
                result = Ok(());
                break;
            }
            thread::sleep(BACKSTOP_POLL);
        }
        self.metrics.eviction_lazyfree.record(wait_started.elapsed());
        result
    }
}
