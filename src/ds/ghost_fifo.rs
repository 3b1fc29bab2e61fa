//! Bounded FIFO of recently evicted keys.
//!
//! S3-FIFO remembers the keys it pushed out of the small queue so that a
//! quick re-insertion can be admitted straight into the main queue. The
//! ghost structure stores keys only — never values — so a ghosted key pins
//! no cached data in memory.
//!
//! ```text
//!   record flow (capacity = 3, full):
//!
//!     ghost:  head ─► [oldest] ◄──► [..] ◄──► [newest] ◄─ tail
//!
//!     record(k):  pop_front(oldest), push_back(k)
//!     remove(k):  admission hit — unlink k wherever it sits
//! ```
//!
//! A `GhostFifo` with capacity 0 is a no-op tracker: `record` does nothing
//! and `contains` is always false.

use rustc_hash::FxHashMap;
use std::hash::Hash;

use crate::ds::slot_list::{SlotId, SlotList};

/// Bounded FIFO of keys (no values) for ghost-guided admission.
///
/// Keys enter at the back when evicted and fall off the front when the
/// queue is full. Membership is answered in O(1) through a hash index, and
/// an admission hit removes the key from the middle in O(1).
///
/// # Example
///
/// ```
/// use sievekit::ds::GhostFifo;
///
/// let mut ghost = GhostFifo::new(2);
/// ghost.record("a");
/// ghost.record("b");
/// assert!(ghost.contains(&"a"));
///
/// // At capacity the oldest key is forgotten.
/// ghost.record("c");
/// assert!(!ghost.contains(&"a"));
/// assert!(ghost.contains(&"b"));
/// assert!(ghost.contains(&"c"));
///
/// // An admission hit consumes the ghost entry.
/// assert!(ghost.remove(&"b"));
/// assert!(!ghost.contains(&"b"));
/// ```
#[derive(Debug)]
pub struct GhostFifo<K> {
    list: SlotList<K>,
    index: FxHashMap<K, SlotId>,
    capacity: usize,
}

impl<K> GhostFifo<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a ghost queue holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            list: SlotList::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            capacity,
        }
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns `true` if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Returns `true` if `key` was recently evicted (a ghost hit).
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Appends `key` to the queue, forgetting the oldest key if full.
    ///
    /// Callers only record keys that are not resident, and a resident key
    /// is never in the ghost queue, so `key` is not already tracked.
    pub fn record(&mut self, key: K) {
        if self.capacity == 0 {
            return;
        }
        debug_assert!(!self.index.contains_key(&key), "ghost key recorded twice");

        if self.list.len() >= self.capacity {
            if let Some(old_key) = self.list.pop_front() {
                self.index.remove(&old_key);
            }
        }

        let id = self.list.push_back(key.clone());
        self.index.insert(key, id);
    }

    /// Removes `key` from the queue; returns `true` if it was tracked.
    pub fn remove(&mut self, key: &K) -> bool {
        let id = match self.index.remove(key) {
            Some(id) => id,
            None => return false,
        };
        self.list.remove(id);
        true
    }

    /// Iterates over the tracked keys, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.list.iter()
    }

    /// Forgets all tracked keys.
    pub fn clear(&mut self) {
        self.list.clear();
        self.index.clear();
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert!(self.list.len() <= self.capacity);
        assert_eq!(self.list.len(), self.index.len());
        for key in self.list.iter() {
            let id = self.index.get(key).expect("listed key missing from index");
            assert!(self.list.contains(*id));
        }
        self.list.debug_validate_invariants();
    }
}
