//! SIEVE cache replacement policy.
//!
//! SIEVE keeps a single FIFO-ordered list, a one-bit access flag per entry
//! and a scanning "hand", and still beats classical LRU on skewed web-style
//! workloads. Unlike LRU it never moves an entry on access, so the hit path
//! is a hash lookup plus a bit set.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SieveCache<K, V> Layout                          │
//! │                                                                         │
//! │   ┌─────────────────────────────────────────────────────────────────┐   │
//! │   │  map: FxHashMap<K, NodePtr>        (key -> node, pre-reserved)  │   │
//! │   └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │   ┌─────────────────────────────────────────────────────────────────┐   │
//! │   │  list (newest at head, oldest at tail)                          │   │
//! │   │                                                                 │   │
//! │   │   head ─► [E] ◄──► [D] ◄──► [C] ◄──► [B] ◄──► [A] ◄─ tail       │   │
//! │   │            ▲        v        ▲                 v                │   │
//! │   │          insert            hand            first victim         │   │
//! │   │                                            candidate            │   │
//! │   │                                                                 │   │
//! │   │   v = visited bit set by get()                                  │   │
//! │   └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │   On access:   set visited (no list operations)                         │
//! │   On eviction: walk from hand toward head, clearing visited bits;       │
//! │                evict the first unvisited node, park hand on its prev    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm
//!
//! ```text
//! GET(key):
//!   node = map[key]?          -> miss: return None
//!   node.visited = true
//!   return &node.value
//!
//! INSERT(key, value):
//!   if key resident: overwrite value in place, visited = false
//!                    (a fresh installation; list position unchanged)
//!   if len == capacity: EVICT()
//!   prepend new node at head, visited = false
//!
//! EVICT():  (exactly one entry leaves)
//!   cursor = hand ?? tail
//!   loop:
//!     if cursor.visited: clear it, step to prev (wrap to tail past head)
//!     else: hand = cursor.prev; unlink cursor; remove from map; free
//! ```
//!
//! The scan terminates: each step either clears a visited bit (at most
//! `len` of them, and none are set during the scan) or evicts.
//!
//! ## Operations
//!
//! | Operation   | Time   | Notes                                    |
//! |-------------|--------|------------------------------------------|
//! | `get`       | O(1)   | Sets the visited bit                     |
//! | `insert`    | O(1)*  | *Amortized, eviction may sweep           |
//! | `contains`  | O(1)   | Index lookup only, no bit update         |
//! | `remove`    | O(1)   | Unlink + index removal, hand repaired    |
//! | `clear`     | O(n)   | Frees every node, resets the hand        |
//!
//! ## Example Usage
//!
//! ```
//! use sievekit::policy::sieve::SieveCache;
//!
//! let mut cache = SieveCache::new(100);
//!
//! cache.insert("page1", "content1");
//! cache.insert("page2", "content2");
//!
//! // A hit marks the entry visited; the next eviction scan spares it once.
//! assert_eq!(cache.get(&"page1"), Some(&"content1"));
//! assert_eq!(cache.len(), 2);
//! ```
//!
//! ## Thread Safety
//!
//! - [`SieveCache`]: not thread-safe; callers serialize access externally.
//! - [`ConcurrentSieveCache`]: RwLock wrapper; `get` runs under the read
//!   lock because setting an already-set visited bit is idempotent.
//!
//! ## References
//!
//! - Zhang et al., "SIEVE is Simpler than LRU: an Efficient Turn-Key
//!   Eviction Algorithm for Web Caches", NSDI 2024

use std::fmt::Debug;
use std::hash::Hash;
use std::ptr::NonNull;
#[cfg(feature = "concurrency")]
use std::sync::Arc;
#[cfg(all(feature = "concurrency", feature = "metrics"))]
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicBool;
#[cfg(feature = "concurrency")]
use std::sync::atomic::Ordering;

#[cfg(feature = "concurrency")]
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::ConfigError;
#[cfg(feature = "concurrency")]
use crate::traits::ConcurrentCache;
use crate::traits::{CoreCache, MutableCache, ReadOnlyCache};

/// Performance metrics for SIEVE cache operations.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct SieveMetrics {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of insertions.
    pub inserts: u64,
    /// Number of in-place overwrites (key already resident).
    pub updates: u64,
    /// Number of evictions.
    pub evictions: u64,
    /// Number of visited bits cleared by eviction scans.
    pub visited_clears: u64,
}

#[cfg(feature = "metrics")]
impl std::fmt::Display for SieveMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        write!(
            f,
            "SieveMetrics {{ hits: {}, misses: {}, hit_rate: {:.2}%, inserts: {}, updates: {}, \
             evictions: {}, visited_clears: {} }}",
            self.hits, self.misses, hit_rate, self.inserts, self.updates, self.evictions,
            self.visited_clears
        )
    }
}

/// Internal node storing key, value, links and the visited bit.
///
/// `visited` uses `AtomicBool` so that concurrent readers can mark an entry
/// through a shared reference (read lock), while exclusive-access paths
/// (`&mut self`) use `get_mut()` for zero-overhead non-atomic access.
struct Node<K, V> {
    prev: Option<NonNull<Node<K, V>>>,
    next: Option<NonNull<Node<K, V>>>,
    visited: AtomicBool,
    key: K,
    value: V,
}

/// Iterator over cache entries, newest to oldest.
pub struct Iter<'a, K, V> {
    current: Option<NonNull<Node<K, V>>>,
    remaining: usize,
    _marker: std::marker::PhantomData<&'a (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node_ptr = self.current?;
        // SAFETY: the borrow on the cache keeps every node alive and
        // unmutated for the iterator's lifetime.
        unsafe {
            let node = &*node_ptr.as_ptr();
            self.current = node.next;
            self.remaining -= 1;
            Some((&node.key, &node.value))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K, V> ExactSizeIterator for Iter<'a, K, V> {}
impl<'a, K, V> std::iter::FusedIterator for Iter<'a, K, V> {}

impl<'a, K, V> Debug for Iter<'a, K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.remaining)
            .finish()
    }
}

/// Iterator over cache keys.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Iterator over cache values.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// SIEVE cache: one list, one hand, one visited bit per entry.
///
/// See the module documentation for the algorithm. New entries enter at
/// the head; the eviction scan walks from the hand (or the tail) toward
/// the head and removes the first entry whose visited bit is clear.
///
/// # Type Parameters
///
/// - `K`: Key type, must be `Clone + Eq + Hash`
/// - `V`: Value type
///
/// # Example
///
/// ```
/// use sievekit::policy::sieve::SieveCache;
///
/// let mut cache: SieveCache<String, String> = SieveCache::new(3);
///
/// cache.insert("hot".to_string(), "data".to_string());
/// cache.get(&"hot".to_string()); // visited = true
///
/// // One-hit wonders fall out before the visited entry does.
/// for i in 0..5 {
///     cache.insert(format!("scan_{i}"), "noise".to_string());
/// }
/// assert!(cache.contains(&"hot".to_string()));
/// ```
pub struct SieveCache<K, V> {
    /// Key -> node pointer mapping, pre-reserved to `capacity`.
    map: FxHashMap<K, NonNull<Node<K, V>>>,

    /// List of resident entries: head = newest, tail = oldest.
    head: Option<NonNull<Node<K, V>>>,
    tail: Option<NonNull<Node<K, V>>>,

    /// Eviction scan cursor; `None` means "start at the tail".
    hand: Option<NonNull<Node<K, V>>>,

    /// Immutable capacity bound.
    capacity: usize,

    #[cfg(feature = "metrics")]
    metrics: SieveMetrics,
}

// SAFETY: `NonNull<Node<K, V>>` is `!Send`, but the pointers exclusively
// own their heap allocations and moving the cache moves ownership of every
// node with it, which is safe when K and V are themselves `Send`.
unsafe impl<K, V> Send for SieveCache<K, V>
where
    K: Clone + Eq + Hash + Send,
    V: Send,
{
}

// SAFETY: all `&self` methods only read through the node pointers, except
// `get_shared` (`pub(crate)`), which flips `Node::visited` through an
// `AtomicBool` — an inherently `Sync` type — so concurrent `&self` access
// is data-race-free. Structural mutation requires `&mut self`, which the
// borrow checker or an external lock makes exclusive.
unsafe impl<K, V> Sync for SieveCache<K, V>
where
    K: Clone + Eq + Hash + Sync,
    V: Sync,
{
}

impl<K, V> Default for SieveCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates a cache with default capacity of 128.
    fn default() -> Self {
        Self::new(128)
    }
}

impl<K, V> SieveCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates a new SIEVE cache with the specified capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Use [`try_new`](Self::try_new) to
    /// handle that case without panicking.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::sieve::SieveCache;
    ///
    /// let cache: SieveCache<String, i32> = SieveCache::new(100);
    /// assert_eq!(cache.capacity(), 100);
    /// assert!(cache.is_empty());
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self::try_new(capacity).expect("cache capacity must be greater than zero")
    }

    /// Creates a new SIEVE cache, rejecting a zero capacity.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::sieve::SieveCache;
    ///
    /// assert!(SieveCache::<u64, u64>::try_new(16).is_ok());
    /// assert!(SieveCache::<u64, u64>::try_new(0).is_err());
    /// ```
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::new("cache capacity must be greater than zero"));
        }
        Ok(Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            head: None,
            tail: None,
            hand: None,
            capacity,
            #[cfg(feature = "metrics")]
            metrics: SieveMetrics::default(),
        })
    }

    /// Returns the number of resident entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the cache is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the cache capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if the key is resident. Never touches the visited bit.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Retrieves a value by key without marking the entry visited.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::sieve::SieveCache;
    ///
    /// let mut cache = SieveCache::new(10);
    /// cache.insert("key", 42);
    ///
    /// assert_eq!(cache.peek(&"key"), Some(&42));
    /// assert_eq!(cache.peek(&"missing"), None);
    /// ```
    #[inline]
    pub fn peek(&self, key: &K) -> Option<&V> {
        let node_ptr = *self.map.get(key)?;
        // SAFETY: every indexed pointer refers to a live node owned by the
        // cache; `&self` guarantees no structural mutation is in flight.
        unsafe { Some(&(*node_ptr.as_ptr()).value) }
    }

    /// Retrieves a value by key, marking the entry visited.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::sieve::SieveCache;
    ///
    /// let mut cache = SieveCache::new(10);
    /// cache.insert("key", 42);
    ///
    /// assert_eq!(cache.get(&"key"), Some(&42));
    /// assert_eq!(cache.get(&"missing"), None);
    /// ```
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let node_ptr = match self.map.get(key) {
            Some(&ptr) => ptr,
            None => {
                #[cfg(feature = "metrics")]
                {
                    self.metrics.misses += 1;
                }
                return None;
            },
        };

        #[cfg(feature = "metrics")]
        {
            self.metrics.hits += 1;
        }

        // SAFETY: indexed pointer is live; `&mut self` gives exclusive
        // access, so the non-atomic `get_mut` store is race-free.
        unsafe {
            let node = &mut *node_ptr.as_ptr();
            *node.visited.get_mut() = true;
            Some(&node.value)
        }
    }

    /// Retrieves a mutable reference to a value, marking the entry visited.
    #[inline]
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let node_ptr = match self.map.get(key) {
            Some(&ptr) => ptr,
            None => {
                #[cfg(feature = "metrics")]
                {
                    self.metrics.misses += 1;
                }
                return None;
            },
        };

        #[cfg(feature = "metrics")]
        {
            self.metrics.hits += 1;
        }

        // SAFETY: as in `get`.
        unsafe {
            let node = &mut *node_ptr.as_ptr();
            *node.visited.get_mut() = true;
            Some(&mut node.value)
        }
    }

    /// Retrieves a value under shared access, marking the entry visited
    /// through an atomic store.
    ///
    /// Setting an already-set bit is idempotent, so concurrent readers
    /// observing the same entry cannot disagree. Metrics are not updated
    /// here; the concurrent wrapper keeps its own atomic counters.
    #[cfg(feature = "concurrency")]
    #[inline]
    pub(crate) fn get_shared(&self, key: &K) -> Option<&V> {
        let &node_ptr = self.map.get(key)?;
        // SAFETY: indexed pointer is live; the store goes through an
        // `AtomicBool`, so shared-access readers cannot race.
        unsafe {
            let node = &*node_ptr.as_ptr();
            node.visited.store(true, Ordering::SeqCst);
            Some(&node.value)
        }
    }

    /// Inserts or overwrites a key-value pair.
    ///
    /// Overwriting a resident key replaces the value in place and clears
    /// the visited bit (the entry is treated as a fresh installation); its
    /// list position does not change. Inserting a new key at capacity runs
    /// one eviction first.
    ///
    /// # Returns
    ///
    /// - `Some(old_value)` if the key was resident
    /// - `None` if the key is new
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::sieve::SieveCache;
    ///
    /// let mut cache = SieveCache::new(10);
    ///
    /// assert_eq!(cache.insert("key", "initial"), None);
    /// assert_eq!(cache.insert("key", "updated"), Some("initial"));
    /// assert_eq!(cache.len(), 1);
    /// ```
    #[inline]
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&node_ptr) = self.map.get(&key) {
            #[cfg(feature = "metrics")]
            {
                self.metrics.updates += 1;
            }

            // SAFETY: indexed pointer is live; exclusive access.
            unsafe {
                let node = &mut *node_ptr.as_ptr();
                let old = std::mem::replace(&mut node.value, value);
                // Overwrite is a fresh installation: the entry must earn
                // its visited bit again.
                *node.visited.get_mut() = false;
                return Some(old);
            }
        }

        #[cfg(feature = "metrics")]
        {
            self.metrics.inserts += 1;
        }

        if self.map.len() >= self.capacity {
            self.evict();
        }

        let node = Box::new(Node {
            prev: None,
            next: None,
            visited: AtomicBool::new(false),
            key: key.clone(),
            value,
        });
        // SAFETY: Box::into_raw always returns a non-null pointer.
        let node_ptr = unsafe { NonNull::new_unchecked(Box::into_raw(node)) };

        self.map.insert(key, node_ptr);
        self.attach_head(node_ptr);

        None
    }

    /// Removes a key, returning its value if it was resident.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::sieve::SieveCache;
    ///
    /// let mut cache = SieveCache::new(10);
    /// cache.insert("key", 42);
    ///
    /// assert_eq!(cache.remove(&"key"), Some(42));
    /// assert_eq!(cache.remove(&"key"), None);
    /// ```
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Detaches and returns the entry for a key, removing it from the
    /// index and the list.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::sieve::SieveCache;
    ///
    /// let mut cache = SieveCache::new(10);
    /// cache.insert("foo", "bar");
    ///
    /// assert_eq!(cache.remove_entry(&"foo"), Some(("foo", "bar")));
    /// assert_eq!(cache.get(&"foo"), None);
    /// ```
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let node_ptr = self.map.remove(key)?;

        if self.hand == Some(node_ptr) {
            // Keep the scan cursor valid: resume from the neighbour the
            // scan would have visited next.
            // SAFETY: the node is still linked at this point.
            self.hand = unsafe { node_ptr.as_ref().prev };
        }
        self.detach(node_ptr);

        // SAFETY: detached and unindexed; this is the sole owner.
        let node = unsafe { Box::from_raw(node_ptr.as_ptr()) };
        let Node { key, value, .. } = *node;
        Some((key, value))
    }

    /// Removes all entries, leaving the cache empty but usable.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::sieve::SieveCache;
    ///
    /// let mut cache = SieveCache::new(10);
    /// cache.insert("a", 1);
    /// cache.insert("b", 2);
    ///
    /// cache.clear();
    /// assert!(cache.is_empty());
    /// ```
    pub fn clear(&mut self) {
        self.hand = None;
        while self.drop_tail() {}
        self.map.clear();
    }

    /// Returns an iterator over key-value pairs, newest to oldest.
    ///
    /// Iteration order is an implementation detail, not a contract.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            current: self.head,
            remaining: self.len(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Returns an iterator over keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns performance metrics.
    #[cfg(feature = "metrics")]
    #[inline]
    pub fn metrics(&self) -> &SieveMetrics {
        &self.metrics
    }

    /// Resets performance metrics to zero.
    #[cfg(feature = "metrics")]
    #[inline]
    pub fn reset_metrics(&mut self) {
        self.metrics = SieveMetrics::default();
    }

    /// Validates internal data structure invariants.
    ///
    /// Checks index/list size agreement, link integrity, head/tail/hand
    /// consistency and the capacity bound.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if all invariants hold
    /// - `Err(String)` describing the violated invariant
    #[cfg(debug_assertions)]
    pub fn check_invariants(&self) -> Result<(), String>
    where
        K: Debug,
    {
        if self.head.is_none() != self.tail.is_none() {
            return Err(format!(
                "head/tail inconsistent: head={:?}, tail={:?}",
                self.head.is_some(),
                self.tail.is_some()
            ));
        }
        if self.head.is_none() && !self.map.is_empty() {
            return Err(format!("list empty but map holds {} entries", self.map.len()));
        }

        let mut count = 0usize;
        let mut hand_seen = false;
        let mut current = self.head;
        let mut prev_ptr: Option<NonNull<Node<K, V>>> = None;

        while let Some(node_ptr) = current {
            count += 1;
            if count > self.map.len() {
                return Err("list longer than map (cycle or stale index)".to_string());
            }
            if Some(node_ptr) == self.hand {
                hand_seen = true;
            }

            unsafe {
                let node = &*node_ptr.as_ptr();

                if node.prev != prev_ptr {
                    return Err(format!("node {:?}: prev pointer inconsistent", node.key));
                }
                match self.map.get(&node.key) {
                    Some(&map_ptr) if map_ptr == node_ptr => {},
                    Some(_) => {
                        return Err(format!(
                            "map entry for key {:?} points to a different node",
                            node.key
                        ));
                    },
                    None => {
                        return Err(format!("listed key {:?} missing from map", node.key));
                    },
                }
                if node.next.is_none() && Some(node_ptr) != self.tail {
                    return Err(format!("last node {:?} does not match tail", node.key));
                }

                prev_ptr = Some(node_ptr);
                current = node.next;
            }
        }

        if count != self.map.len() {
            return Err(format!(
                "counted {} list nodes but map holds {}",
                count,
                self.map.len()
            ));
        }
        if self.hand.is_some() && !hand_seen {
            return Err("hand points at a node outside the list".to_string());
        }
        if self.map.len() > self.capacity {
            return Err(format!(
                "resident entries {} > capacity {}",
                self.map.len(),
                self.capacity
            ));
        }

        Ok(())
    }

    /// Evicts exactly one entry.
    ///
    /// Walks from the hand (or the tail) toward the head. Visited nodes
    /// get their bit cleared and a second chance; the first unvisited node
    /// is the victim. The hand parks on the victim's `prev` so the next
    /// scan resumes where this one stopped.
    fn evict(&mut self) {
        let mut cursor = self.hand.or(self.tail);
        while let Some(node_ptr) = cursor {
            // SAFETY: every pointer reachable from hand/tail refers to a
            // live node owned by this cache; exclusive access via &mut self.
            let node = unsafe { &mut *node_ptr.as_ptr() };
            if *node.visited.get_mut() {
                *node.visited.get_mut() = false;
                #[cfg(feature = "metrics")]
                {
                    self.metrics.visited_clears += 1;
                }
                // Step toward the head; wrap to the tail when walking off
                // the front. Terminates: no bit is set during the scan.
                cursor = node.prev.or(self.tail);
            } else {
                self.hand = node.prev;
                self.detach(node_ptr);
                // SAFETY: detached above; the map entry is removed next,
                // so this Box is the sole owner.
                let node = unsafe { Box::from_raw(node_ptr.as_ptr()) };
                self.map.remove(&node.key);
                #[cfg(feature = "metrics")]
                {
                    self.metrics.evictions += 1;
                }
                return;
            }
        }
    }

    /// Attaches a node at the head of the list.
    #[inline(always)]
    fn attach_head(&mut self, mut node_ptr: NonNull<Node<K, V>>) {
        unsafe {
            let node = node_ptr.as_mut();
            node.prev = None;
            node.next = self.head;

            match self.head {
                Some(mut h) => h.as_mut().prev = Some(node_ptr),
                None => self.tail = Some(node_ptr),
            }

            self.head = Some(node_ptr);
        }
    }

    /// Detaches a node from the list without deallocating it.
    ///
    /// Callers repair the hand before detaching.
    #[inline(always)]
    fn detach(&mut self, mut node_ptr: NonNull<Node<K, V>>) {
        unsafe {
            let node = node_ptr.as_mut();

            match node.prev {
                Some(mut p) => p.as_mut().next = node.next,
                None => self.head = node.next,
            }

            match node.next {
                Some(mut n) => n.as_mut().prev = node.prev,
                None => self.tail = node.prev,
            }
        }
    }
}

// Private helper needed by Drop, without trait bounds.
impl<K, V> SieveCache<K, V> {
    /// Pops and deallocates the tail node.
    fn drop_tail(&mut self) -> bool {
        if let Some(tail_ptr) = self.tail {
            // SAFETY: the tail is live and owned by the cache; after this
            // block no pointer to it remains.
            unsafe {
                let node = Box::from_raw(tail_ptr.as_ptr());
                self.tail = node.prev;
                match self.tail {
                    Some(mut t) => t.as_mut().next = None,
                    None => self.head = None,
                }
            }
            true
        } else {
            false
        }
    }
}

impl<K, V> Drop for SieveCache<K, V> {
    fn drop(&mut self) {
        while self.drop_tail() {}
    }
}

impl<K, V> FromIterator<(K, V)> for SieveCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Builds a cache from an iterator; capacity comes from the size hint,
    /// with a minimum of 16.
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        let mut cache = Self::new(lower.max(16));
        for (k, v) in iter {
            cache.insert(k, v);
        }
        cache
    }
}

impl<K, V> Extend<(K, V)> for SieveCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V> IntoIterator for &'a SieveCache<K, V>
where
    K: Clone + Eq + Hash,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V> Debug for SieveCache<K, V>
where
    K: Clone + Eq + Hash + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SieveCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("hand_parked", &self.hand.is_some())
            .finish_non_exhaustive()
    }
}

impl<K, V> ReadOnlyCache<K, V> for SieveCache<K, V>
where
    K: Clone + Eq + Hash,
{
    #[inline]
    fn contains(&self, key: &K) -> bool {
        SieveCache::contains(self, key)
    }

    #[inline]
    fn len(&self) -> usize {
        SieveCache::len(self)
    }

    #[inline]
    fn capacity(&self) -> usize {
        SieveCache::capacity(self)
    }
}

impl<K, V> CoreCache<K, V> for SieveCache<K, V>
where
    K: Clone + Eq + Hash,
{
    #[inline]
    fn insert(&mut self, key: K, value: V) -> Option<V> {
        SieveCache::insert(self, key, value)
    }

    #[inline]
    fn get(&mut self, key: &K) -> Option<&V> {
        SieveCache::get(self, key)
    }

    fn clear(&mut self) {
        SieveCache::clear(self);
    }
}

impl<K, V> MutableCache<K, V> for SieveCache<K, V>
where
    K: Clone + Eq + Hash,
{
    #[inline]
    fn remove(&mut self, key: &K) -> Option<V> {
        SieveCache::remove(self, key)
    }

    #[inline]
    fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        SieveCache::remove_entry(self, key)
    }
}

/// Thread-safe SIEVE cache wrapper using an RwLock.
///
/// `get` runs under the **read lock**: marking an entry visited is an
/// idempotent atomic store, so parallel readers are safe. Structural
/// mutation takes the write lock.
///
/// # Example
///
/// ```
/// use sievekit::policy::sieve::ConcurrentSieveCache;
///
/// let cache = ConcurrentSieveCache::new(100);
///
/// cache.insert("key", "value");
/// assert!(cache.contains(&"key"));
/// assert_eq!(cache.get(&"key"), Some("value"));
/// ```
#[cfg(feature = "concurrency")]
#[derive(Debug)]
pub struct ConcurrentSieveCache<K, V>
where
    K: Clone + Eq + Hash,
{
    inner: Arc<RwLock<SieveCache<K, V>>>,

    /// Hit counter for the read-lock `get`/`get_with` path.
    #[cfg(feature = "metrics")]
    read_hits: AtomicU64,

    /// Miss counter for the read-lock `get`/`get_with` path.
    #[cfg(feature = "metrics")]
    read_misses: AtomicU64,
}

#[cfg(feature = "concurrency")]
impl<K, V> Clone for ConcurrentSieveCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            #[cfg(feature = "metrics")]
            read_hits: AtomicU64::new(self.read_hits.load(Ordering::Relaxed)),
            #[cfg(feature = "metrics")]
            read_misses: AtomicU64::new(self.read_misses.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(feature = "concurrency")]
impl<K, V> ConcurrentSieveCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates a new concurrent SIEVE cache.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::from_inner(SieveCache::new(capacity))
    }

    /// Creates a new concurrent SIEVE cache, rejecting a zero capacity.
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        SieveCache::try_new(capacity).map(Self::from_inner)
    }

    fn from_inner(inner: SieveCache<K, V>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(inner)),
            #[cfg(feature = "metrics")]
            read_hits: AtomicU64::new(0),
            #[cfg(feature = "metrics")]
            read_misses: AtomicU64::new(0),
        }
    }

    /// Inserts a key-value pair. Takes the write lock.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// Gets a cloned value by key, marking the entry visited.
    ///
    /// Takes the **read lock**, so parallel `get` calls proceed together.
    /// Requires `V: Clone`; use [`get_with`](Self::get_with) otherwise.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let guard = self.inner.read();
        let result = guard.get_shared(key);

        #[cfg(feature = "metrics")]
        {
            if result.is_some() {
                self.read_hits.fetch_add(1, Ordering::Relaxed);
            } else {
                self.read_misses.fetch_add(1, Ordering::Relaxed);
            }
        }

        result.cloned()
    }

    /// Gets a value by key and applies `f` to it inside the read lock.
    ///
    /// The entry is marked visited. Works for non-`Clone` values.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::sieve::ConcurrentSieveCache;
    ///
    /// let cache = ConcurrentSieveCache::new(10);
    /// cache.insert("key".to_string(), vec![1, 2, 3]);
    ///
    /// let len = cache.get_with(&"key".to_string(), |v| v.len());
    /// assert_eq!(len, Some(3));
    /// ```
    pub fn get_with<F, R>(&self, key: &K, f: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        let guard = self.inner.read();
        let result = guard.get_shared(key);

        #[cfg(feature = "metrics")]
        {
            if result.is_some() {
                self.read_hits.fetch_add(1, Ordering::Relaxed);
            } else {
                self.read_misses.fetch_add(1, Ordering::Relaxed);
            }
        }

        result.map(f)
    }

    /// Peeks at a cloned value without marking the entry visited.
    pub fn peek(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.read().peek(key).cloned()
    }

    /// Peeks at a value through `f` without marking the entry visited.
    pub fn peek_with<F, R>(&self, key: &K, f: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        self.inner.read().peek(key).map(f)
    }

    /// Removes a key, returning its value. Takes the write lock.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().remove(key)
    }

    /// Detaches and returns the entry for a key. Takes the write lock.
    pub fn remove_entry(&self, key: &K) -> Option<(K, V)> {
        self.inner.write().remove_entry(key)
    }

    /// Removes multiple keys under one write lock.
    pub fn remove_batch(&self, keys: &[K]) -> Vec<Option<V>> {
        let mut inner = self.inner.write();
        keys.iter().map(|k| inner.remove(k)).collect()
    }

    /// Returns `true` if the key is resident.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.read().contains(key)
    }

    /// Returns the number of resident entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Returns the cache capacity.
    pub fn capacity(&self) -> usize {
        self.inner.read().capacity()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Returns merged metrics (inner write-path + concurrent read-path).
    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> SieveMetrics {
        let mut m = self.inner.read().metrics().clone();
        m.hits += self.read_hits.load(Ordering::Relaxed);
        m.misses += self.read_misses.load(Ordering::Relaxed);
        m
    }

    /// Resets metrics to zero (both inner and read-path counters).
    #[cfg(feature = "metrics")]
    pub fn reset_metrics(&self) {
        self.inner.write().reset_metrics();
        self.read_hits.store(0, Ordering::Relaxed);
        self.read_misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(feature = "concurrency")]
impl<K, V> ConcurrentCache for ConcurrentSieveCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Send + Sync,
{
}
