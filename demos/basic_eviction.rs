//! Minimal end-to-end run: fill a database past a budget, then let the
//! engine bring usage back under it with approximate LRU.
//!
//! ```bash
//! cargo run --example basic_eviction
//! ```

use std::sync::Arc;

use evictkit::config::{EvictionConfig, EvictionPolicy};
use evictkit::engine::EvictionEngine;
use evictkit::meta::on_access_lru;
use evictkit::metrics::PrometheusTextExporter;
use evictkit::store::{MemoryTable, TrackingAllocator};
use evictkit::traits::{
    Allocator, EvictionHost, KeySpace, NoopEvents, NoopLazyFree, NoopReplication,
};

struct Server {
    db: MemoryTable,
    alloc: Arc<TrackingAllocator>,
    repl: NoopReplication,
    events: NoopEvents,
    lazy: NoopLazyFree,
}

impl EvictionHost for Server {
    type Db = MemoryTable;
    type Alloc = Arc<TrackingAllocator>;
    type Repl = NoopReplication;
    type Events = NoopEvents;
    type Lazy = NoopLazyFree;

    fn db_count(&self) -> usize {
        1
    }

    fn db(&self, _id: usize) -> &MemoryTable {
        &self.db
    }

    fn db_mut(&mut self, _id: usize) -> &mut MemoryTable {
        &mut self.db
    }

    fn allocator(&self) -> &Arc<TrackingAllocator> {
        &self.alloc
    }

    fn replication(&self) -> &NoopReplication {
        &self.repl
    }

    fn replication_mut(&mut self) -> &mut NoopReplication {
        &mut self.repl
    }

    fn events(&mut self) -> &mut NoopEvents {
        &mut self.events
    }

    fn lazy_free(&self) -> &NoopLazyFree {
        &self.lazy
    }
}

fn main() {
    let alloc = Arc::new(TrackingAllocator::new());
    let mut server = Server {
        db: MemoryTable::new(alloc.clone()),
        alloc,
        repl: NoopReplication,
        events: NoopEvents,
        lazy: NoopLazyFree,
    };

    let config = EvictionConfig::default()
        .policy(EvictionPolicy::AllkeysLru)
        .maxmemory_samples(10);
    config.validate().expect("valid configuration");
    let mut engine = EvictionEngine::new(config);

    for i in 0..10_000u32 {
        let key = format!("session:{}", i);
        let value = vec![b'x'; 128];
        server
            .db
            .insert(key.as_bytes(), &value, on_access_lru(engine.clock().tick()));
    }
    let filled = server.alloc.used_bytes();
    println!("filled:  {} keys, {} bytes", server.db.key_count(), filled);

    engine.config_mut().maxmemory = filled / 2;
    let summary = engine
        .try_free_memory_safely(&mut server)
        .expect("budget reachable");
    println!(
        "evicted: {} keys, {} bytes freed",
        summary.evicted_keys, summary.freed_bytes
    );
    println!(
        "now:     {} keys, {} bytes (budget {})",
        server.db.key_count(),
        server.alloc.used_bytes(),
        engine.config().maxmemory
    );

    let exporter = PrometheusTextExporter::new("evictkit", std::io::stdout());
    exporter
        .export(&engine.metrics())
        .expect("write metrics to stdout");
}
