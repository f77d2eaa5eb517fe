//! Fixed-capacity ordered pool of eviction candidates.
//!
//! The pool improves the quality of the approximate LRU/LFU algorithms by
//! remembering good candidates across eviction cycles. Sampled keys are
//! merged in keyed by a score (`idle`) where higher means more evictable;
//! the eviction loop consumes from the high end.
//!
//! ## Architecture
//!
//! ```text
//!   ┌─────────────────────────────────────────────────────────────────────┐
//!   │                       EvictionPool (16 slots)                       │
//!   │                                                                     │
//!   │   idx     0      1      2      3       ...      14      15         │
//!   │        ┌──────┬──────┬──────┬──────┬─────────┬──────┬──────┐        │
//!   │  idle  │  12  │  40  │  95  │ 220  │   ...   │      │      │        │
//!   │  key   │ "a"  │ "q"  │ "k3" │ "x"  │   ...   │ ───  │ ───  │        │
//!   │  dbid  │  0   │  2   │  0   │  1   │   ...   │      │      │        │
//!   │        └──────┴──────┴──────┴──────┴─────────┴──────┴──────┘        │
//!   │          ascending idle ──────────►            empty slots          │
//!   │                                                                     │
//!   │   Each slot owns a reusable 255-byte buffer. Short key names are    │
//!   │   copied into it; longer names get a one-off heap allocation.       │
//!   │   Shifts move slot contents together with their buffers, so no      │
//!   │   buffer is ever lost or reallocated across rearrangements.         │
//!   └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Insertion
//!
//! ```text
//!   try_insert(idle, dbid, key)
//!        │
//!        ▼
//!   find smallest k where slot k is empty or slot k has idle >= new idle
//!        │
//!        ├── k == 0 and rightmost slot populated
//!        │       └── candidate is worse than everything: drop it
//!        │
//!        ├── slot k empty ──────────────► write into slot k
//!        │
//!        ├── rightmost slot empty ──────► shift k.. right one, write at k
//!        │
//!        └── otherwise ─────────────────► drop slot 0 (weakest candidate),
//!                                         shift left, write at k-1
//! ```
//!
//! ## Lifecycle notes
//!
//! - Slots live for the lifetime of the pool; clearing a slot drops any
//!   heap key but keeps the slot's reusable buffer.
//! - A populated slot can go stale between populate and consume when its
//!   key is deleted by expiry or another eviction ("ghost"). The consumer
//!   verifies against the key table and silently skips ghosts.
//! - Offering a key already in the pool re-scores it in place rather than
//!   occupying a second slot.

use std::mem;

/// Number of candidate slots in the pool.
pub const EVPOOL_SIZE: usize = 16;

/// Size of the per-slot reusable key buffer. Keys at most this long avoid
/// a heap allocation when entering the pool.
pub const EVPOOL_CACHED_SIZE: usize = 255;

/// Where a slot's key bytes live.
#[derive(Debug)]
enum SlotKey {
    /// No candidate stored.
    Empty,
    /// Key bytes are in the slot's reusable buffer.
    Inline { len: u8 },
    /// Key was too long for the buffer and owns its own allocation.
    Heap(Box<[u8]>),
}

#[derive(Debug)]
struct PoolSlot {
    idle: u64,
    dbid: usize,
    key: SlotKey,
    cached: Box<[u8; EVPOOL_CACHED_SIZE]>,
}

impl PoolSlot {
    fn empty() -> Self {
        Self {
            idle: 0,
            dbid: 0,
            key: SlotKey::Empty,
            cached: Box::new([0; EVPOOL_CACHED_SIZE]),
        }
    }

    #[inline]
    fn is_populated(&self) -> bool {
        !matches!(self.key, SlotKey::Empty)
    }

    fn key_bytes(&self) -> Option<&[u8]> {
        match &self.key {
            SlotKey::Empty => None,
            SlotKey::Inline { len } => Some(&self.cached[..*len as usize]),
            SlotKey::Heap(bytes) => Some(bytes),
        }
    }

    /// Drops the candidate but keeps the reusable buffer.
    fn clear(&mut self) {
        self.key = SlotKey::Empty;
        self.idle = 0;
        self.dbid = 0;
    }

    fn store(&mut self, idle: u64, dbid: usize, key: &[u8]) {
        if key.len() > EVPOOL_CACHED_SIZE {
            self.key = SlotKey::Heap(key.into());
        } else {
            self.cached[..key.len()].copy_from_slice(key);
            self.key = SlotKey::Inline {
                len: key.len() as u8,
            };
        }
        self.idle = idle;
        self.dbid = dbid;
    }
}

/// Candidate removed from the pool by [`EvictionPool::pop_worst`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Score recorded at populate time; higher means more evictable.
    pub idle: u64,
    /// Database the key was sampled from.
    pub dbid: usize,
    /// The key name.
    pub key: Vec<u8>,
}

/// View of a populated slot, for inspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEntry<'a> {
    pub idle: u64,
    pub dbid: usize,
    pub key: &'a [u8],
}

/// Process-wide ordered buffer of eviction candidates.
#[derive(Debug)]
pub struct EvictionPool {
    slots: [PoolSlot; EVPOOL_SIZE],
}

impl Default for EvictionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionPool {
    /// Creates an empty pool with all slot buffers preallocated.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| PoolSlot::empty()),
        }
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_populated()).count()
    }

    /// Returns `true` when no slot holds a candidate.
    pub fn is_empty(&self) -> bool {
        !self.slots.iter().any(|s| s.is_populated())
    }

    /// Iterates populated slots in ascending score order.
    pub fn iter(&self) -> impl Iterator<Item = PoolEntry<'_>> {
        self.slots.iter().filter_map(|slot| {
            slot.key_bytes().map(|key| PoolEntry {
                idle: slot.idle,
                dbid: slot.dbid,
                key,
            })
        })
    }

    /// Offers a candidate to the pool.
    ///
    /// Returns `true` if the candidate was stored, `false` if it scored
    /// worse than every resident candidate in a full pool (or re-offered
    /// an identical resident entry).
    ///
    /// # Example
    ///
    /// ```
    /// use evictkit::pool::EvictionPool;
    ///
    /// let mut pool = EvictionPool::new();
    /// assert!(pool.try_insert(100, 0, b"stale-key"));
    /// assert!(pool.try_insert(700, 0, b"staler-key"));
    ///
    /// let worst = pool.pop_worst().unwrap();
    /// assert_eq!(worst.key, b"staler-key");
    /// assert_eq!(worst.idle, 700);
    /// ```
    pub fn try_insert(&mut self, idle: u64, dbid: usize, key: &[u8]) -> bool {
        // A key can be offered again with a fresher score on a later
        // populate pass. Re-score the resident entry instead of letting the
        // same key occupy two slots.
        if let Some(existing) = self.position_of(dbid, key) {
            if self.slots[existing].idle == idle {
                return false;
            }
            self.remove_at(existing);
        }

        let mut k = 0;
        while k < EVPOOL_SIZE && self.slots[k].is_populated() && self.slots[k].idle < idle {
            k += 1;
        }

        if k == 0 && self.slots[EVPOOL_SIZE - 1].is_populated() {
            // Worse than every resident candidate and no free slot.
            return false;
        }

        if k < EVPOOL_SIZE && !self.slots[k].is_populated() {
            // Empty slot: write in place.
        } else if !self.slots[EVPOOL_SIZE - 1].is_populated() {
            // Room on the right: shift k.. right by one. The rotation carries
            // the empty rightmost slot, buffer included, into position k.
            self.slots[k..].rotate_right(1);
        } else {
            // No room on the right: discard the weakest candidate in slot 0
            // and shift the prefix left, landing slot 0's buffer at k-1.
            k -= 1;
            self.slots[0].clear();
            self.slots[..=k].rotate_left(1);
        }

        self.slots[k].store(idle, dbid, key);

        #[cfg(debug_assertions)]
        self.debug_validate_invariants();

        true
    }

    /// Removes and returns the highest-scored candidate, clearing its slot.
    ///
    /// Returns `None` when the pool is empty. The caller must verify the
    /// key still exists before acting on it; the slot is reclaimed either
    /// way so the pool stays fresh.
    pub fn pop_worst(&mut self) -> Option<Candidate> {
        for k in (0..EVPOOL_SIZE).rev() {
            if !self.slots[k].is_populated() {
                continue;
            }
            let slot = &mut self.slots[k];
            let key = match mem::replace(&mut slot.key, SlotKey::Empty) {
                SlotKey::Empty => unreachable!("slot reported populated"),
                SlotKey::Inline { len } => slot.cached[..len as usize].to_vec(),
                SlotKey::Heap(bytes) => bytes.into_vec(),
            };
            let candidate = Candidate {
                idle: slot.idle,
                dbid: slot.dbid,
                key,
            };
            slot.idle = 0;
            slot.dbid = 0;
            return Some(candidate);
        }
        None
    }

    /// Clears every slot, keeping the reusable buffers.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
    }

    fn position_of(&self, dbid: usize, key: &[u8]) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.dbid == dbid && slot.key_bytes() == Some(key))
    }

    /// Removes the candidate at `index`, closing the gap so populated slots
    /// stay contiguous. The rotation keeps every buffer with a slot.
    fn remove_at(&mut self, index: usize) {
        self.slots[index].clear();
        let end = self
            .slots
            .iter()
            .rposition(|s| s.is_populated())
            .map_or(index, |p| p.max(index));
        self.slots[index..=end].rotate_left(1);
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        // Populated slots form one contiguous run with ascending scores.
        let populated: Vec<usize> = (0..EVPOOL_SIZE)
            .filter(|&i| self.slots[i].is_populated())
            .collect();
        for pair in populated.windows(2) {
            assert_eq!(pair[1], pair[0] + 1, "populated slots must be contiguous");
            assert!(
                self.slots[pair[0]].idle <= self.slots[pair[1]].idle,
                "scores must be non-decreasing"
            );
        }
        for slot in &self.slots {
            if let SlotKey::Inline { len } = slot.key {
                assert!(len as usize <= EVPOOL_CACHED_SIZE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pool: &EvictionPool) -> Vec<u64> {
        pool.iter().map(|e| e.idle).collect()
    }

    #[test]
    fn starts_empty() {
        let pool = EvictionPool::new();
        assert!(pool.is_empty());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn inserts_keep_scores_ascending() {
        let mut pool = EvictionPool::new();
        for (i, idle) in [50u64, 10, 90, 70, 30].iter().enumerate() {
            assert!(pool.try_insert(*idle, 0, format!("k{}", i).as_bytes()));
        }
        assert_eq!(scores(&pool), vec![10, 30, 50, 70, 90]);
        pool.debug_validate_invariants();
    }

    #[test]
    fn full_pool_drops_candidates_worse_than_everything() {
        let mut pool = EvictionPool::new();
        for i in 0..EVPOOL_SIZE as u64 {
            assert!(pool.try_insert(100 + i, 0, format!("k{}", i).as_bytes()));
        }
        assert_eq!(pool.len(), EVPOOL_SIZE);

        assert!(!pool.try_insert(5, 0, b"too-fresh"));
        assert_eq!(pool.len(), EVPOOL_SIZE);
        assert!(pool.iter().all(|e| e.key != b"too-fresh"));
    }

    #[test]
    fn full_pool_displaces_weakest_for_a_better_candidate() {
        let mut pool = EvictionPool::new();
        for i in 0..EVPOOL_SIZE as u64 {
            pool.try_insert(100 + i, 0, format!("k{}", i).as_bytes());
        }

        // Stronger than everything: the weakest resident (idle 100) goes.
        assert!(pool.try_insert(999, 0, b"ancient"));
        assert_eq!(pool.len(), EVPOOL_SIZE);
        assert!(pool.iter().all(|e| e.idle != 100));
        assert_eq!(pool.iter().last().unwrap().key, b"ancient");
        pool.debug_validate_invariants();
    }

    #[test]
    fn full_pool_middle_insert_drops_weakest() {
        let mut pool = EvictionPool::new();
        for i in 0..EVPOOL_SIZE as u64 {
            pool.try_insert((i + 1) * 10, 0, format!("k{}", i).as_bytes());
        }

        assert!(pool.try_insert(55, 0, b"mid"));
        assert_eq!(pool.len(), EVPOOL_SIZE);
        let s = scores(&pool);
        assert!(!s.contains(&10), "weakest candidate must be discarded");
        assert!(s.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn pop_worst_returns_highest_score_first() {
        let mut pool = EvictionPool::new();
        pool.try_insert(10, 1, b"a");
        pool.try_insert(30, 2, b"b");
        pool.try_insert(20, 3, b"c");

        let first = pool.pop_worst().unwrap();
        assert_eq!((first.idle, first.dbid, first.key.as_slice()), (30, 2, b"b".as_slice()));

        let second = pool.pop_worst().unwrap();
        assert_eq!(second.idle, 20);

        let third = pool.pop_worst().unwrap();
        assert_eq!(third.idle, 10);

        assert!(pool.pop_worst().is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn long_keys_round_trip_through_heap_storage() {
        let mut pool = EvictionPool::new();
        let long_key = vec![b'x'; EVPOOL_CACHED_SIZE + 40];
        assert!(pool.try_insert(77, 0, &long_key));

        let got = pool.pop_worst().unwrap();
        assert_eq!(got.key, long_key);
    }

    #[test]
    fn boundary_key_length_uses_the_inline_buffer() {
        let mut pool = EvictionPool::new();
        let key = vec![b'y'; EVPOOL_CACHED_SIZE];
        assert!(pool.try_insert(1, 0, &key));
        assert_eq!(pool.iter().next().unwrap().key, key.as_slice());
    }

    #[test]
    fn reoffering_same_key_keeps_a_single_slot() {
        let mut pool = EvictionPool::new();
        assert!(pool.try_insert(10, 0, b"dup"));
        assert!(!pool.try_insert(10, 0, b"dup"));
        assert_eq!(pool.len(), 1);

        // A fresher score repositions the entry instead of duplicating it.
        assert!(pool.try_insert(40, 0, b"dup"));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.iter().next().unwrap().idle, 40);
    }

    #[test]
    fn same_key_in_different_databases_is_not_a_duplicate() {
        let mut pool = EvictionPool::new();
        assert!(pool.try_insert(10, 0, b"k"));
        assert!(pool.try_insert(20, 1, b"k"));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn interleaved_insert_and_pop_preserve_invariants() {
        let mut pool = EvictionPool::new();
        let mut state = 0x12345u64;
        for i in 0..500u64 {
            // Cheap xorshift so the pattern is deterministic.
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let idle = state % 1_000;
            pool.try_insert(idle, (state % 4) as usize, format!("key-{}", i).as_bytes());
            if i % 3 == 0 {
                pool.pop_worst();
            }
            pool.debug_validate_invariants();
        }
    }

    #[test]
    fn clear_empties_every_slot() {
        let mut pool = EvictionPool::new();
        for i in 0..8u64 {
            pool.try_insert(i, 0, format!("k{}", i).as_bytes());
        }
        pool.clear();
        assert!(pool.is_empty());
        assert!(pool.pop_worst().is_none());
    }
}
