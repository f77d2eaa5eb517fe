//! In-memory key table implementing the [`KeySpace`] contract.
//!
//! One `MemoryTable` is one logical database: a main table mapping keys to
//! values annotated with access metadata, and an expiring table mapping
//! the TTL'd subset to absolute expiry timestamps.
//!
//! ## Architecture
//!
//! ```text
//!   ┌─────────────────────────────────────────────────────────────────┐
//!   │                        MemoryTable                              │
//!   │                                                                 │
//!   │   entries: FxHashMap<Arc<[u8]>, Entry>    keys: Vec<Arc<[u8]>>  │
//!   │      key → { value, meta, weight, idx }      dense key array    │
//!   │                                                                 │
//!   │   expires: FxHashMap<Arc<[u8]>, {at_ms, idx}>                   │
//!   │      expiring_keys: Vec<Arc<[u8]>>                              │
//!   │                                                                 │
//!   │   Dense arrays give O(1) pseudo-random sampling; swap-remove    │
//!   │   keeps them packed on deletes with the moved key's index       │
//!   │   patched in the map.                                           │
//!   └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entry charges its weight (key + value bytes plus a fixed
//! bookkeeping overhead) to a shared [`TrackingAllocator`]. Synchronous
//! deletes release that weight before returning. Asynchronous deletes
//! unlink the key immediately but move the value into a
//! [`LazyFreeQueue`] job, so the bytes come back only when the worker has
//! run, which is exactly the window the engine's backstop covers.

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::meta::AccessMeta;
use crate::rng::XorShift64;
use crate::store::alloc::TrackingAllocator;
use crate::store::lazyfree::LazyFreeQueue;
use crate::traits::{KeySpace, Sample, SamplePayload, TableScope};

/// Fixed per-entry bookkeeping charge, on top of key and value bytes.
pub const ENTRY_OVERHEAD_BYTES: u64 = 64;

#[derive(Debug)]
struct Entry {
    value: Box<[u8]>,
    meta: AccessMeta,
    weight: u64,
    idx: usize,
}

#[derive(Debug)]
struct ExpireEntry {
    at_ms: u64,
    idx: usize,
}

/// One logical database backed by hash tables and dense key arrays.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use evictkit::meta::AccessMeta;
/// use evictkit::store::{MemoryTable, TrackingAllocator};
/// use evictkit::traits::{Allocator, KeySpace};
///
/// let alloc = Arc::new(TrackingAllocator::new());
/// let mut table = MemoryTable::new(alloc.clone());
///
/// table.insert(b"user:1", b"payload", AccessMeta::encode_lru(0));
/// table.set_expiry(b"user:1", 60_000);
///
/// assert_eq!(table.key_count(), 1);
/// assert_eq!(table.expiry_ms(b"user:1"), Some(60_000));
/// assert!(alloc.used_bytes() > 0);
///
/// table.delete_sync(b"user:1");
/// assert_eq!(alloc.used_bytes(), 0);
/// ```
#[derive(Debug)]
pub struct MemoryTable {
    entries: FxHashMap<Arc<[u8]>, Entry>,
    keys: Vec<Arc<[u8]>>,
    expires: FxHashMap<Arc<[u8]>, ExpireEntry>,
    expiring_keys: Vec<Arc<[u8]>>,
    alloc: Arc<TrackingAllocator>,
    lazy: Option<Arc<LazyFreeQueue>>,
    lazy_free_delay: Duration,
    rng: XorShift64,
}

impl MemoryTable {
    /// Creates a table charging the given allocator. Async deletes fall
    /// back to synchronous frees until a queue is attached.
    pub fn new(alloc: Arc<TrackingAllocator>) -> Self {
        Self::with_seed(alloc, 0x10ca1_7ab1e)
    }

    /// Creates a table with a fixed sampling seed, for reproducible tests.
    pub fn with_seed(alloc: Arc<TrackingAllocator>, seed: u64) -> Self {
        Self {
            entries: FxHashMap::default(),
            keys: Vec::new(),
            expires: FxHashMap::default(),
            expiring_keys: Vec::new(),
            alloc,
            lazy: None,
            lazy_free_delay: Duration::ZERO,
            rng: XorShift64::new(seed),
        }
    }

    /// Attaches a lazy-free queue; async deletes defer value destruction
    /// to it from now on.
    pub fn attach_lazy_free(&mut self, queue: Arc<LazyFreeQueue>) {
        self.lazy = Some(queue);
    }

    /// Adds an artificial pause to each deferred free, for exercising the
    /// window where deleted values still hold memory.
    pub fn set_lazy_free_delay(&mut self, delay: Duration) {
        self.lazy_free_delay = delay;
    }

    /// Inserts or replaces a key. Returns `true` when the key is new.
    pub fn insert(&mut self, key: &[u8], value: &[u8], meta: AccessMeta) -> bool {
        let weight = key.len() as u64 + value.len() as u64 + ENTRY_OVERHEAD_BYTES;
        if let Some(entry) = self.entries.get_mut(key) {
            self.alloc.release(entry.weight);
            self.alloc.grow(weight);
            entry.value = value.into();
            entry.weight = weight;
            entry.meta = meta;
            return false;
        }

        let shared: Arc<[u8]> = key.into();
        let idx = self.keys.len();
        self.keys.push(shared.clone());
        self.entries.insert(
            shared,
            Entry {
                value: value.into(),
                meta,
                weight,
                idx,
            },
        );
        self.alloc.grow(weight);
        true
    }

    /// Sets an absolute expiry for an existing key. Returns `false` when
    /// the key is not present in the main table.
    pub fn set_expiry(&mut self, key: &[u8], at_ms: u64) -> bool {
        let Some(shared) = self.entries.get_key_value(key).map(|(k, _)| k.clone()) else {
            return false;
        };
        if let Some(expire) = self.expires.get_mut(key) {
            expire.at_ms = at_ms;
            return true;
        }
        let idx = self.expiring_keys.len();
        self.expiring_keys.push(shared.clone());
        self.expires.insert(shared, ExpireEntry { at_ms, idx });
        true
    }

    /// Overwrites a key's access metadata, as the server does on access.
    pub fn touch(&mut self, key: &[u8], meta: AccessMeta) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.meta = meta;
                true
            }
            None => false,
        }
    }

    /// Returns the stored value.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(|e| e.value.as_ref())
    }

    fn detach_main(&mut self, key: &[u8]) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        let idx = entry.idx;
        let last = self.keys.len() - 1;
        self.keys.swap(idx, last);
        self.keys.pop();
        if idx < self.keys.len() {
            let moved = self.keys[idx].clone();
            if let Some(e) = self.entries.get_mut(moved.as_ref()) {
                e.idx = idx;
            }
        }
        Some(entry)
    }

    fn detach_expiry(&mut self, key: &[u8]) {
        let Some(expire) = self.expires.remove(key) else {
            return;
        };
        let idx = expire.idx;
        let last = self.expiring_keys.len() - 1;
        self.expiring_keys.swap(idx, last);
        self.expiring_keys.pop();
        if idx < self.expiring_keys.len() {
            let moved = self.expiring_keys[idx].clone();
            if let Some(e) = self.expires.get_mut(moved.as_ref()) {
                e.idx = idx;
            }
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert_eq!(self.entries.len(), self.keys.len());
        assert_eq!(self.expires.len(), self.expiring_keys.len());
        for (key, entry) in &self.entries {
            assert!(entry.idx < self.keys.len());
            assert_eq!(self.keys[entry.idx].as_ref(), key.as_ref());
        }
        for (key, expire) in &self.expires {
            assert!(expire.idx < self.expiring_keys.len());
            assert_eq!(self.expiring_keys[expire.idx].as_ref(), key.as_ref());
            assert!(self.entries.contains_key(key));
        }
    }
}

impl KeySpace for MemoryTable {
    fn key_count(&self) -> usize {
        self.entries.len()
    }

    fn expiring_count(&self) -> usize {
        self.expires.len()
    }

    fn sample_into(&mut self, scope: TableScope, n: usize, out: &mut Vec<Sample>) -> usize {
        let len = match scope {
            TableScope::Main => self.keys.len(),
            TableScope::Expires => self.expiring_keys.len(),
        };
        if len == 0 || n == 0 {
            return 0;
        }

        // A window of consecutive positions starting at a pseudo-random
        // offset: distinct within one call, cheap, position-random.
        let take = n.min(len);
        let start = self.rng.next_below(len);
        for i in 0..take {
            let pos = (start + i) % len;
            match scope {
                TableScope::Main => {
                    let key = &self.keys[pos];
                    let meta = self.entries[key.as_ref()].meta;
                    out.push(Sample {
                        key: key.to_vec(),
                        payload: SamplePayload::Meta(meta),
                    });
                }
                TableScope::Expires => {
                    let key = &self.expiring_keys[pos];
                    let at_ms = self.expires[key.as_ref()].at_ms;
                    out.push(Sample {
                        key: key.to_vec(),
                        payload: SamplePayload::ExpiryMs(at_ms),
                    });
                }
            }
        }
        take
    }

    fn random_key(&mut self, scope: TableScope) -> Option<Vec<u8>> {
        let keys = match scope {
            TableScope::Main => &self.keys,
            TableScope::Expires => &self.expiring_keys,
        };
        if keys.is_empty() {
            return None;
        }
        let pos = self.rng.next_below(keys.len());
        Some(keys[pos].to_vec())
    }

    fn access_meta(&self, key: &[u8]) -> Option<AccessMeta> {
        self.entries.get(key).map(|e| e.meta)
    }

    fn expiry_ms(&self, key: &[u8]) -> Option<u64> {
        self.expires.get(key).map(|e| e.at_ms)
    }

    fn delete_sync(&mut self, key: &[u8]) -> bool {
        self.detach_expiry(key);
        match self.detach_main(key) {
            Some(entry) => {
                self.alloc.release(entry.weight);
                true
            }
            None => false,
        }
    }

    fn delete_async(&mut self, key: &[u8]) -> bool {
        self.detach_expiry(key);
        let Some(entry) = self.detach_main(key) else {
            return false;
        };
        match &self.lazy {
            Some(queue) => {
                let alloc = self.alloc.clone();
                let delay = self.lazy_free_delay;
                queue.enqueue(move || {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    let weight = entry.weight;
                    drop(entry);
                    alloc.release(weight);
                });
            }
            None => self.alloc.release(entry.weight),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Allocator;

    fn table() -> (Arc<TrackingAllocator>, MemoryTable) {
        let alloc = Arc::new(TrackingAllocator::new());
        let table = MemoryTable::new(alloc.clone());
        (alloc, table)
    }

    fn meta() -> AccessMeta {
        AccessMeta::encode_lru(0)
    }

    #[test]
    fn insert_charges_and_delete_releases_weight() {
        let (alloc, mut t) = table();
        t.insert(b"k", b"0123456789", meta());
        assert_eq!(
            alloc.used_bytes(),
            1 + 10 + ENTRY_OVERHEAD_BYTES
        );
        assert!(t.delete_sync(b"k"));
        assert_eq!(alloc.used_bytes(), 0);
        assert!(!t.delete_sync(b"k"));
    }

    #[test]
    fn replacing_a_value_adjusts_the_charge() {
        let (alloc, mut t) = table();
        t.insert(b"k", b"short", meta());
        t.insert(b"k", b"a-much-longer-value", meta());
        assert_eq!(t.key_count(), 1);
        assert_eq!(
            alloc.used_bytes(),
            1 + 19 + ENTRY_OVERHEAD_BYTES
        );
    }

    #[test]
    fn expiry_tracks_membership_in_both_tables() {
        let (_alloc, mut t) = table();
        t.insert(b"a", b"v", meta());
        t.insert(b"b", b"v", meta());
        assert!(t.set_expiry(b"a", 1_000));
        assert!(!t.set_expiry(b"missing", 1_000));

        assert_eq!(t.key_count(), 2);
        assert_eq!(t.expiring_count(), 1);
        assert_eq!(t.expiry_ms(b"a"), Some(1_000));
        assert_eq!(t.expiry_ms(b"b"), None);

        t.delete_sync(b"a");
        assert_eq!(t.expiring_count(), 0);
        t.debug_validate_invariants();
    }

    #[test]
    fn dense_arrays_survive_interleaved_churn() {
        let (_alloc, mut t) = table();
        for i in 0..100u32 {
            let key = format!("key-{}", i);
            t.insert(key.as_bytes(), b"value", meta());
            if i % 3 == 0 {
                t.set_expiry(key.as_bytes(), 1_000 + i as u64);
            }
        }
        for i in (0..100u32).step_by(2) {
            assert!(t.delete_sync(format!("key-{}", i).as_bytes()));
        }
        assert_eq!(t.key_count(), 50);
        t.debug_validate_invariants();
    }

    #[test]
    fn sampling_returns_distinct_present_keys() {
        let (_alloc, mut t) = table();
        for i in 0..20u32 {
            t.insert(format!("key-{}", i).as_bytes(), b"v", meta());
        }

        let mut out = Vec::new();
        let n = t.sample_into(TableScope::Main, 5, &mut out);
        assert_eq!(n, 5);
        assert_eq!(out.len(), 5);

        let mut seen: Vec<&[u8]> = out.iter().map(|s| s.key.as_slice()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5, "no duplicates within one call");
        for sample in &out {
            assert!(t.access_meta(&sample.key).is_some());
            assert!(matches!(sample.payload, SamplePayload::Meta(_)));
        }
    }

    #[test]
    fn sampling_a_sparse_table_returns_fewer() {
        let (_alloc, mut t) = table();
        t.insert(b"only", b"v", meta());
        let mut out = Vec::new();
        assert_eq!(t.sample_into(TableScope::Main, 5, &mut out), 1);
        assert_eq!(out[0].key, b"only");
    }

    #[test]
    fn expires_scope_samples_carry_the_deadline() {
        let (_alloc, mut t) = table();
        t.insert(b"a", b"v", meta());
        t.set_expiry(b"a", 123_456);

        let mut out = Vec::new();
        t.sample_into(TableScope::Expires, 5, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload, SamplePayload::ExpiryMs(123_456));
    }

    #[test]
    fn random_key_only_returns_present_keys() {
        let (_alloc, mut t) = table();
        assert_eq!(t.random_key(TableScope::Main), None);
        t.insert(b"x", b"v", meta());
        assert_eq!(t.random_key(TableScope::Main), Some(b"x".to_vec()));
        assert_eq!(t.random_key(TableScope::Expires), None);
    }

    #[test]
    fn async_delete_without_a_queue_frees_synchronously() {
        let (alloc, mut t) = table();
        t.insert(b"k", b"v", meta());
        assert!(t.delete_async(b"k"));
        assert_eq!(alloc.used_bytes(), 0);
    }

    #[test]
    fn async_delete_defers_the_release_to_the_worker() {
        let (alloc, mut t) = table();
        let queue = Arc::new(LazyFreeQueue::start());
        t.attach_lazy_free(queue.clone());
        t.set_lazy_free_delay(Duration::from_millis(10));

        t.insert(b"k", b"v", meta());
        let charged = alloc.used_bytes();
        assert!(t.delete_async(b"k"));

        // Key is unreachable at once; bytes return later.
        assert_eq!(t.access_meta(b"k"), None);
        assert!(alloc.used_bytes() == charged || alloc.used_bytes() == 0);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while alloc.used_bytes() > 0 {
            assert!(std::time::Instant::now() < deadline);
            std::thread::yield_now();
        }
    }

    #[test]
    fn touch_updates_metadata_in_place() {
        let (_alloc, mut t) = table();
        t.insert(b"k", b"v", AccessMeta::encode_lru(5));
        assert!(t.touch(b"k", AccessMeta::encode_lru(9)));
        assert_eq!(t.access_meta(b"k").unwrap().lru_tick(), 9);
        assert!(!t.touch(b"missing", AccessMeta::encode_lru(1)));
    }
}
