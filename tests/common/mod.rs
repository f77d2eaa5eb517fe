//! Shared harness for integration tests: a minimal server wiring the
//! reference store to recording collaborators and a manual clock.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use evictkit::clock::{LruClock, ManualTimeSource};
use evictkit::config::EvictionConfig;
use evictkit::engine::EvictionEngine;
use evictkit::meta::{on_access_lfu, on_access_lru, AccessMeta};
use evictkit::rng::XorShift64;
use evictkit::store::{LazyFreeQueue, MemoryTable, TrackingAllocator};
use evictkit::traits::{Allocator, EventNotifier, EvictionHost, KeySpace, LazyFree, ReplicationSink};

/// Replication sink recording every propagated expiry.
#[derive(Debug, Default)]
pub struct RecordingReplication {
    pub expires: Vec<(usize, Vec<u8>, bool)>,
    pub flushes: u64,
    pub replicas: usize,
    pub replica_buffer: u64,
    pub append_log_buffer: u64,
    pub append_log_rewrite_buffer: u64,
}

impl ReplicationSink for RecordingReplication {
    fn propagate_expire(&mut self, db: usize, key: &[u8], lazy: bool) {
        self.expires.push((db, key.to_vec(), lazy));
    }

    fn replica_count(&self) -> usize {
        self.replicas
    }

    fn flush_replica_buffers(&mut self) {
        self.flushes += 1;
    }

    fn replica_buffer_bytes(&self) -> u64 {
        self.replica_buffer
    }

    fn append_log_buffer_bytes(&self) -> u64 {
        self.append_log_buffer
    }

    fn append_log_rewrite_buffer_bytes(&self) -> u64 {
        self.append_log_rewrite_buffer
    }
}

/// Event notifier recording evictions and modified-key signals.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    pub evicted: Vec<(usize, Vec<u8>)>,
    pub modified: Vec<(usize, Vec<u8>)>,
}

impl RecordingEvents {
    pub fn evicted_keys(&self) -> Vec<&[u8]> {
        self.evicted.iter().map(|(_, k)| k.as_slice()).collect()
    }
}

impl EventNotifier for RecordingEvents {
    fn notify_evicted(&mut self, db: usize, key: &[u8]) {
        self.evicted.push((db, key.to_vec()));
    }

    fn signal_modified_key(&mut self, db: usize, key: &[u8]) {
        self.modified.push((db, key.to_vec()));
    }
}

/// A server in miniature: databases, allocator, collaborators, state.
pub struct TestServer {
    pub dbs: Vec<MemoryTable>,
    pub alloc: Arc<TrackingAllocator>,
    pub repl: RecordingReplication,
    pub events: RecordingEvents,
    pub lazy: Arc<LazyFreeQueue>,
    pub time: Arc<ManualTimeSource>,
    pub paused: bool,
    pub loading: bool,
    pub script_timed_out: bool,
    pub replica: bool,
}

impl TestServer {
    pub fn new(db_count: usize) -> Self {
        let alloc = Arc::new(TrackingAllocator::new());
        let lazy = Arc::new(LazyFreeQueue::start());
        let dbs = (0..db_count)
            .map(|i| {
                let mut db = MemoryTable::with_seed(alloc.clone(), 0xbead + i as u64);
                db.attach_lazy_free(lazy.clone());
                db
            })
            .collect();
        Self {
            dbs,
            alloc,
            repl: RecordingReplication::default(),
            events: RecordingEvents::default(),
            lazy,
            time: Arc::new(ManualTimeSource::new(1_700_000_000_000)),
            paused: false,
            loading: false,
            script_timed_out: false,
            replica: false,
        }
    }

    /// Builds an engine sharing this server's manual time source.
    pub fn engine(&self, config: EvictionConfig) -> EvictionEngine {
        let clock = LruClock::with_source(config.hz, self.time.clone());
        EvictionEngine::with_clock(config, clock)
    }

    /// Advances time and refreshes the engine clock, as the periodic task
    /// would.
    pub fn tick(&self, engine: &EvictionEngine, delta: Duration) {
        self.time.advance_ms(delta.as_millis() as u64);
        engine.clock().refresh();
    }

    /// Inserts a key stamped with the engine's current LRU tick.
    pub fn insert_lru(&mut self, engine: &EvictionEngine, db: usize, key: &[u8], value: &[u8]) {
        let meta = on_access_lru(engine.clock().tick());
        self.dbs[db].insert(key, value, meta);
    }

    /// Inserts a key with fresh LFU metadata.
    pub fn insert_lfu(&mut self, engine: &EvictionEngine, db: usize, key: &[u8], value: &[u8]) {
        let meta = AccessMeta::initial_lfu(engine.clock().lfu_minutes());
        self.dbs[db].insert(key, value, meta);
    }

    /// Applies `count` accesses to a key under the LFU update rule.
    pub fn access_lfu(
        &mut self,
        engine: &EvictionEngine,
        db: usize,
        key: &[u8],
        count: usize,
        rng: &mut XorShift64,
    ) {
        let config = engine.config();
        for _ in 0..count {
            let meta = self.dbs[db]
                .access_meta(key)
                .expect("accessing a missing key");
            let updated = on_access_lfu(
                meta,
                engine.clock().lfu_minutes(),
                config.lfu_log_factor,
                config.lfu_decay_time,
                rng,
            );
            self.dbs[db].touch(key, updated);
        }
    }

    /// Sets the budget so that roughly `bytes` must be freed.
    pub fn budget_over_by(&self, bytes: u64) -> u64 {
        self.alloc.used_bytes().saturating_sub(bytes)
    }

    pub fn wait_for_lazy_drain(&self) {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while self.lazy.pending_jobs() > 0 {
            assert!(
                std::time::Instant::now() < deadline,
                "lazy-free queue never drained"
            );
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl EvictionHost for TestServer {
    type Db = MemoryTable;
    type Alloc = Arc<TrackingAllocator>;
    type Repl = RecordingReplication;
    type Events = RecordingEvents;
    type Lazy = Arc<LazyFreeQueue>;

    fn db_count(&self) -> usize {
        self.dbs.len()
    }

    fn db(&self, id: usize) -> &MemoryTable {
        &self.dbs[id]
    }

    fn db_mut(&mut self, id: usize) -> &mut MemoryTable {
        &mut self.dbs[id]
    }

    fn allocator(&self) -> &Arc<TrackingAllocator> {
        &self.alloc
    }

    fn replication(&self) -> &RecordingReplication {
        &self.repl
    }

    fn replication_mut(&mut self) -> &mut RecordingReplication {
        &mut self.repl
    }

    fn events(&mut self) -> &mut RecordingEvents {
        &mut self.events
    }

    fn lazy_free(&self) -> &Arc<LazyFreeQueue> {
        &self.lazy
    }

    fn is_replica(&self) -> bool {
        self.replica
    }

    fn clients_paused(&self) -> bool {
        self.paused
    }

    fn is_loading(&self) -> bool {
        self.loading
    }

    fn script_timed_out(&self) -> bool {
        self.script_timed_out
    }
}
