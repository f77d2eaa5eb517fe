//! Collaborator contracts consumed by the eviction engine.
//!
//! The engine never owns the key space, the allocator, or the replication
//! stream; it drives them through the traits below. This keeps the
//! decision logic independent of how the server stores values or ships
//! deletions downstream.
//!
//! ## Architecture
//!
//! ```text
//!                       ┌──────────────────────────────┐
//!                       │       EvictionHost           │
//!                       │  (umbrella, associated types)│
//!                       └──────┬───────────────────────┘
//!                              │ exposes
//!        ┌──────────┬──────────┼──────────────┬──────────────┐
//!        ▼          ▼          ▼              ▼              ▼
//!   ┌─────────┐ ┌─────────┐ ┌────────────┐ ┌────────────┐ ┌──────────┐
//!   │KeySpace │ │Allocator│ │Replication │ │EventNotifi-│ │ LazyFree │
//!   │per-db   │ │used     │ │Sink        │ │er          │ │pending   │
//!   │tables   │ │bytes    │ │expire/flush│ │evicted/mod │ │job count │
//!   └─────────┘ └─────────┘ └────────────┘ └────────────┘ └──────────┘
//! ```
//!
//! ## Key space model
//!
//! Each logical database exposes two key tables: the main table holding
//! every key (values carry [`AccessMeta`]) and the expiring table holding
//! the subset with a TTL (values are absolute expiry timestamps).
//! `volatile-*` policies sample the expiring table; `allkeys-*` policies
//! sample the main table. When scoring needs access metadata for a key
//! sampled from the expiring table, the engine looks it up in the main
//! table.
//!
//! ## Thread safety
//!
//! The engine is single-threaded and cooperative; none of these traits
//! require interior synchronization except [`Allocator::used_bytes`],
//! which a background lazy-free worker may update concurrently and must
//! therefore read from an atomic or equivalently synchronized counter.

use std::sync::Arc;

use crate::meta::AccessMeta;

/// Which of a database's two key tables an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableScope {
    /// The main table holding every key.
    Main,
    /// The subset of keys carrying a TTL.
    Expires,
}

/// Value observed alongside a sampled key.
///
/// Sampling the main table yields the object's access metadata; sampling
/// the expiring table yields the mapped absolute expiry timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePayload {
    Meta(AccessMeta),
    ExpiryMs(u64),
}

/// One entry returned by [`KeySpace::sample_into`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub key: Vec<u8>,
    pub payload: SamplePayload,
}

/// One logical database as seen by the eviction engine.
pub trait KeySpace {
    /// Number of keys in the main table.
    fn key_count(&self) -> usize;

    /// Number of keys in the expiring table.
    fn expiring_count(&self) -> usize;

    /// Number of keys in the given table.
    fn count(&self, scope: TableScope) -> usize {
        match scope {
            TableScope::Main => self.key_count(),
            TableScope::Expires => self.expiring_count(),
        }
    }

    /// Samples up to `n` distinct keys from pseudo-random positions in the
    /// chosen table, appending them to `out` and returning how many were
    /// produced. May return fewer than `n` when the table is sparse. No
    /// ordering guarantee; no duplicates within a single call.
    fn sample_into(&mut self, scope: TableScope, n: usize, out: &mut Vec<Sample>) -> usize;

    /// Returns one pseudo-random key from the chosen table, or `None` when
    /// it is empty.
    fn random_key(&mut self, scope: TableScope) -> Option<Vec<u8>>;

    /// Looks up a key's access metadata in the main table.
    fn access_meta(&self, key: &[u8]) -> Option<AccessMeta>;

    /// Looks up a key's absolute expiry timestamp in the expiring table.
    fn expiry_ms(&self, key: &[u8]) -> Option<u64>;

    /// Returns `true` when the key currently exists in the given table.
    fn contains(&self, scope: TableScope, key: &[u8]) -> bool {
        match scope {
            TableScope::Main => self.access_meta(key).is_some(),
            TableScope::Expires => self.expiry_ms(key).is_some(),
        }
    }

    /// Deletes a key and releases its memory before returning.
    ///
    /// Returns `true` if the key existed.
    fn delete_sync(&mut self, key: &[u8]) -> bool;

    /// Deletes a key, deferring value destruction to a background worker.
    ///
    /// The key must be unreachable once this returns even though its bytes
    /// may be reclaimed later. Returns `true` if the key existed.
    fn delete_async(&mut self, key: &[u8]) -> bool;
}

/// The allocator's global used-bytes counter.
pub trait Allocator {
    /// Heap bytes currently attributed to the allocator. Safe to read
    /// while a background worker concurrently returns memory.
    fn used_bytes(&self) -> u64;
}

impl<A: Allocator + ?Sized> Allocator for Arc<A> {
    fn used_bytes(&self) -> u64 {
        (**self).used_bytes()
    }
}

/// Replication stream and append-log writer, seen from the eviction loop.
pub trait ReplicationSink {
    /// Tells replicas and the append log that `key` is gone, so they delete
    /// it too. `lazy` mirrors whether the local delete was deferred.
    fn propagate_expire(&mut self, db: usize, key: &[u8], lazy: bool);

    /// Number of connected replicas.
    fn replica_count(&self) -> usize;

    /// Pushes pending replica output so eviction storms do not starve
    /// replicas of the deletions they need to apply.
    fn flush_replica_buffers(&mut self);

    /// Bytes sitting in replica output buffers.
    fn replica_buffer_bytes(&self) -> u64;

    /// Bytes buffered for the append log.
    fn append_log_buffer_bytes(&self) -> u64;

    /// Bytes buffered for an in-progress append-log rewrite.
    fn append_log_rewrite_buffer_bytes(&self) -> u64;

    /// Transient bytes excluded from the data budget. These buffers drain
    /// on their own; charging them against the budget would trigger
    /// eviction storms that only make them grow further.
    fn not_counted_bytes(&self) -> u64 {
        self.replica_buffer_bytes()
            + self.append_log_buffer_bytes()
            + self.append_log_rewrite_buffer_bytes()
    }
}

/// Keyspace-event and invalidation hooks fired per evicted key.
pub trait EventNotifier {
    /// Emits the keyspace "evicted" event.
    fn notify_evicted(&mut self, db: usize, key: &[u8]);

    /// Signals that the key changed, for client-side cache invalidation.
    fn signal_modified_key(&mut self, db: usize, key: &[u8]);
}

/// Background worker that destroys lazily deleted values.
pub trait LazyFree {
    /// Number of deferred destruction jobs not yet completed.
    fn pending_jobs(&self) -> usize;
}

impl<L: LazyFree + ?Sized> LazyFree for Arc<L> {
    fn pending_jobs(&self) -> usize {
        (**self).pending_jobs()
    }
}

/// Everything the engine needs from the server, in one place.
///
/// A server implements this once, wiring its databases and subsystems to
/// the associated types. The state probes default to the permissive
/// answer so minimal hosts (demos, benches) only implement the accessors.
pub trait EvictionHost {
    type Db: KeySpace;
    type Alloc: Allocator;
    type Repl: ReplicationSink;
    type Events: EventNotifier;
    type Lazy: LazyFree;

    /// Number of logical databases.
    fn db_count(&self) -> usize;

    fn db(&self, id: usize) -> &Self::Db;

    fn db_mut(&mut self, id: usize) -> &mut Self::Db;

    fn allocator(&self) -> &Self::Alloc;

    fn replication(&self) -> &Self::Repl;

    fn replication_mut(&mut self) -> &mut Self::Repl;

    fn events(&mut self) -> &mut Self::Events;

    fn lazy_free(&self) -> &Self::Lazy;

    /// `true` when this process replicates a master's dataset.
    fn is_replica(&self) -> bool {
        false
    }

    /// `true` while any client is paused; the dataset must appear static.
    fn clients_paused(&self) -> bool {
        false
    }

    /// `true` while persistent state is being loaded.
    fn is_loading(&self) -> bool {
        false
    }

    /// `true` while an embedded script has run past its timeout.
    fn script_timed_out(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// No-op collaborators
// ---------------------------------------------------------------------------

/// Replication sink for hosts with no replicas and no append log.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReplication;

impl ReplicationSink for NoopReplication {
    fn propagate_expire(&mut self, _db: usize, _key: &[u8], _lazy: bool) {}

    fn replica_count(&self) -> usize {
        0
    }

    fn flush_replica_buffers(&mut self) {}

    fn replica_buffer_bytes(&self) -> u64 {
        0
    }

    fn append_log_buffer_bytes(&self) -> u64 {
        0
    }

    fn append_log_rewrite_buffer_bytes(&self) -> u64 {
        0
    }
}

/// Event notifier that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl EventNotifier for NoopEvents {
    fn notify_evicted(&mut self, _db: usize, _key: &[u8]) {}

    fn signal_modified_key(&mut self, _db: usize, _key: &[u8]) {}
}

/// Lazy-free handle for hosts that only delete synchronously.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLazyFree;

impl LazyFree for NoopLazyFree {
    fn pending_jobs(&self) -> usize {
        0
    }
}
