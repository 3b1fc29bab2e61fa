//! S3-FIFO (Simple, Scalable, Scan-resistant FIFO) cache replacement policy.
//!
//! Three FIFO queues cooperate to keep one-hit wonders from crowding out
//! the working set, with no LRU bookkeeping on the hit path.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        S3FifoCache<K, V> Layout                          │
//! │                                                                          │
//! │   ┌──────────────────────────────────────────────────────────────────┐   │
//! │   │  map: FxHashMap<K, NodePtr>     (resident keys only)             │   │
//! │   └──────────────────────────────────────────────────────────────────┘   │
//! │                                                                          │
//! │   SMALL (admission, cap = ⌊capacity/10⌋)   MAIN (cap = capacity−small)   │
//! │   ┌────────────────────────────┐     ┌────────────────────────────┐      │
//! │   │ head=newest    tail=oldest │     │ head=newest    tail=oldest │      │
//! │   │  [new] ◄──► ... ◄──► [old] │     │  [hot] ◄──► ... ◄──► [old] │      │
//! │   │   ▲             evict/     │     │   ▲            evict or    │      │
//! │   │ insert          promote    │     │ promote        reinsert    │      │
//! │   └────────────────────────────┘     └────────────────────────────┘      │
//! │                                                                          │
//! │   GHOST (keys only, cap = main cap)                                      │
//! │   ┌──────────────────────────────────────────────────────────────────┐   │
//! │   │ Remembers keys evicted from Small; a re-insert of a remembered   │   │
//! │   │ key is admitted straight into Main.                              │   │
//! │   └──────────────────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Flow
//!
//! ```text
//! insert(key, value):
//!   1. while small + main >= capacity:
//!        if main >= main_cap or small is empty: evict-from-main
//!        else:                                  evict-from-small
//!   2. key resident? unlink + free the old node, install a fresh node
//!      at Main's head (the index follows the fresh node)
//!   3. key in ghost? drop the ghost entry, install into Main
//!   4. otherwise install into Small
//!
//! get(key):
//!   index hit: saturating freq += 1 (cap 3), return value
//!   miss:      bump miss counter only
//!
//! evict-from-small (pop oldest):
//!   freq > 0  -> promote: append to Main's head, freq := 0
//!   freq == 0 -> push key into ghost, free node, drop index entry
//!
//! evict-from-main (pop oldest):
//!   freq > 0  -> reinsert at Main's head, freq -= 1
//!   freq == 0 -> free node, drop index entry (no ghost record)
//! ```
//!
//! ## Operations
//!
//! | Operation   | Time   | Notes                                      |
//! |-------------|--------|--------------------------------------------|
//! | `get`       | O(1)   | Saturating frequency bump                  |
//! | `insert`    | O(1)*  | *Amortized, may trigger evictions          |
//! | `contains`  | O(1)   | Index lookup only, no freq update          |
//! | `remove`    | O(1)   | Unlinks from the single owning queue       |
//! | `clear`     | O(n)   | Drains both queues and the ghost           |
//!
//! ## Example Usage
//!
//! ```
//! use sievekit::policy::s3_fifo::S3FifoCache;
//!
//! let mut cache: S3FifoCache<String, String> = S3FifoCache::new(100);
//!
//! cache.insert("page1".to_string(), "content1".to_string());
//! cache.get(&"page1".to_string()); // freq bump
//!
//! // A scan of one-hit wonders drains through Small without displacing
//! // the accessed entry.
//! for i in 0..150 {
//!     cache.insert(format!("scan_{i}"), format!("data_{i}"));
//! }
//! assert_eq!(cache.len(), 100);
//! ```
//!
//! ## Thread Safety
//!
//! - [`S3FifoCache`]: not thread-safe; callers serialize access externally.
//! - [`ConcurrentS3FifoCache`]: RwLock wrapper; `get` runs under the read
//!   lock and bumps the frequency through an atomic counter.
//!
//! ## References
//!
//! - Yang et al., "FIFO queues are all you need for cache eviction",
//!   SOSP 2023

use std::fmt::Debug;
use std::hash::Hash;
use std::ptr::NonNull;
#[cfg(feature = "concurrency")]
use std::sync::Arc;
#[cfg(all(feature = "concurrency", feature = "metrics"))]
use std::sync::atomic::AtomicU64;
use std::sync::atomic::{AtomicU8, Ordering};

#[cfg(feature = "concurrency")]
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::ds::GhostFifo;
use crate::error::ConfigError;
#[cfg(feature = "concurrency")]
use crate::traits::ConcurrentCache;
use crate::traits::{CoreCache, MutableCache, ReadOnlyCache};

/// Maximum frequency value (2 bits, saturating).
const MAX_FREQ: u8 = 3;

/// Small queue's share of the total capacity, as a divisor.
const SMALL_DIVISOR: usize = 10;

/// Performance metrics for S3-FIFO cache operations.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct S3FifoMetrics {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of insertions.
    pub inserts: u64,
    /// Number of replacements (key already resident).
    pub updates: u64,
    /// Number of promotions from Small to Main.
    pub promotions: u64,
    /// Number of Main reinsertions (freq > 0 at eviction).
    pub main_reinserts: u64,
    /// Number of evictions from Small.
    pub small_evictions: u64,
    /// Number of evictions from Main.
    pub main_evictions: u64,
    /// Number of ghost hits (ghost-guided admission into Main).
    pub ghost_hits: u64,
}

#[cfg(feature = "metrics")]
impl std::fmt::Display for S3FifoMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        write!(
            f,
            "S3FifoMetrics {{ hits: {}, misses: {}, hit_rate: {:.2}%, inserts: {}, updates: {}, \
             promotions: {}, main_reinserts: {}, small_evictions: {}, main_evictions: {}, \
             ghost_hits: {} }}",
            self.hits,
            self.misses,
            hit_rate,
            self.inserts,
            self.updates,
            self.promotions,
            self.main_reinserts,
            self.small_evictions,
            self.main_evictions,
            self.ghost_hits
        )
    }
}

/// Which queue a node belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum QueueKind {
    Small,
    Main,
}

/// Internal node storing key, value, links and metadata.
///
/// `freq` uses `AtomicU8` so concurrent readers can bump the counter
/// through a shared reference (read lock), while exclusive-access paths
/// (`&mut self`) use `get_mut()` for zero-overhead non-atomic access.
struct Node<K, V> {
    prev: Option<NonNull<Node<K, V>>>,
    next: Option<NonNull<Node<K, V>>>,
    queue: QueueKind,
    freq: AtomicU8,
    key: K,
    value: V,
}

/// Iterator over cache entries: Small queue first, then Main.
pub struct Iter<'a, K, V> {
    current: Option<NonNull<Node<K, V>>>,
    main_head: Option<NonNull<Node<K, V>>>,
    in_small: bool,
    remaining: usize,
    _marker: std::marker::PhantomData<&'a (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 {
            match self.current {
                Some(node_ptr) => {
                    // SAFETY: the borrow on the cache keeps every node
                    // alive and unmutated for the iterator's lifetime.
                    unsafe {
                        let node = &*node_ptr.as_ptr();
                        self.current = node.next;
                        self.remaining -= 1;
                        return Some((&node.key, &node.value));
                    }
                },
                None if self.in_small => {
                    self.in_small = false;
                    self.current = self.main_head;
                },
                None => return None,
            }
        }
        None
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

/// S3-FIFO cache: Small and Main FIFO queues plus a keys-only ghost queue.
///
/// New keys enter the Small queue; keys that were accessed while in Small
/// are promoted to Main at eviction time instead of being dropped; keys
/// dropped from Small are remembered in the ghost queue so a quick
/// re-insertion lands directly in Main. See the module documentation for
/// the full flow.
///
/// # Type Parameters
///
/// - `K`: Key type, must be `Clone + Eq + Hash`
/// - `V`: Value type
///
/// # Example
///
/// ```
/// use sievekit::policy::s3_fifo::S3FifoCache;
///
/// let mut cache: S3FifoCache<String, String> = S3FifoCache::new(100);
///
/// cache.insert("hot_key".to_string(), "important".to_string());
/// cache.get(&"hot_key".to_string()); // freq bump
///
/// for i in 0..200 {
///     cache.insert(format!("scan_{i}"), "noise".to_string());
/// }
///
/// assert!(cache.contains(&"hot_key".to_string()));
/// ```
pub struct S3FifoCache<K, V> {
    /// Key -> node pointer mapping for resident entries, pre-reserved.
    map: FxHashMap<K, NonNull<Node<K, V>>>,

    /// Small queue (FIFO): head = newest, tail = oldest.
    small_head: Option<NonNull<Node<K, V>>>,
    small_tail: Option<NonNull<Node<K, V>>>,
    small_len: usize,

    /// Small queue share of the capacity: `capacity / 10`, floored.
    small_cap: usize,

    /// Main queue (FIFO): head = newest, tail = oldest.
    main_head: Option<NonNull<Node<K, V>>>,
    main_tail: Option<NonNull<Node<K, V>>>,
    main_len: usize,

    /// Main queue share of the capacity: `capacity - small_cap`.
    main_cap: usize,

    /// Keys recently evicted from Small, bounded by `main_cap`.
    ghost: GhostFifo<K>,

    /// Total cache capacity.
    capacity: usize,

    #[cfg(feature = "metrics")]
    metrics: S3FifoMetrics,
}

// SAFETY: `NonNull<Node<K, V>>` is `!Send`, but the pointers exclusively
// own their heap allocations; moving the cache moves ownership of every
// node, which is safe when K and V are themselves `Send`.
unsafe impl<K, V> Send for S3FifoCache<K, V>
where
    K: Clone + Eq + Hash + Send,
    V: Send,
{
}

// SAFETY: all `&self` methods only read through the node pointers, except
// `get_shared` (`pub(crate)`), which bumps `Node::freq` through an
// `AtomicU8` — an inherently `Sync` type — so concurrent `&self` access is
// data-race-free. Structural mutation requires `&mut self`, which the
// borrow checker or an external lock makes exclusive.
unsafe impl<K, V> Sync for S3FifoCache<K, V>
where
    K: Clone + Eq + Hash + Sync,
    V: Sync,
{
}

impl<K, V> Default for S3FifoCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates a cache with default capacity of 128.
    fn default() -> Self {
        Self::new(128)
    }
}

impl<K, V> S3FifoCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates a new S3-FIFO cache with the specified capacity.
    ///
    /// The Small queue is sized to a tenth of the capacity (floored); Main
    /// takes the rest; the ghost queue is bounded by Main's share. Below
    /// ten entries the Small share is zero and every insert flows through
    /// Small straight toward eviction or promotion.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Use [`try_new`](Self::try_new) to
    /// handle that case without panicking.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::s3_fifo::S3FifoCache;
    ///
    /// let cache: S3FifoCache<String, i32> = S3FifoCache::new(100);
    /// assert_eq!(cache.capacity(), 100);
    /// assert_eq!(cache.small_capacity(), 10);
    /// assert_eq!(cache.main_capacity(), 90);
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self::try_new(capacity).expect("cache capacity must be greater than zero")
    }

    /// Creates a new S3-FIFO cache, rejecting a zero capacity.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::s3_fifo::S3FifoCache;
    ///
    /// assert!(S3FifoCache::<u64, u64>::try_new(16).is_ok());
    /// assert!(S3FifoCache::<u64, u64>::try_new(0).is_err());
    /// ```
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::new("cache capacity must be greater than zero"));
        }
        let small_cap = capacity / SMALL_DIVISOR;
        let main_cap = capacity - small_cap;

        Ok(Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            small_head: None,
            small_tail: None,
            small_len: 0,
            small_cap,
            main_head: None,
            main_tail: None,
            main_len: 0,
            main_cap,
            ghost: GhostFifo::new(main_cap),
            capacity,
            #[cfg(feature = "metrics")]
            metrics: S3FifoMetrics::default(),
        })
    }

    /// Returns the total number of resident entries (ghost keys excluded).
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

    /// Returns `true` if the key is resident. Never touches the frequency.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Returns the number of entries in the Small queue.
    #[inline]
    pub fn small_len(&self) -> usize {
        self.small_len
    }

    /// Returns the Small queue's capacity share.
    #[inline]
    pub fn small_capacity(&self) -> usize {
        self.small_cap
    }

    /// Returns the number of entries in the Main queue.
    #[inline]
    pub fn main_len(&self) -> usize {
        self.main_len
    }

    /// Returns the Main queue's capacity share.
    #[inline]
    pub fn main_capacity(&self) -> usize {
        self.main_cap
    }

    /// Returns the number of keys in the ghost queue.
    #[inline]
    pub fn ghost_len(&self) -> usize {
        self.ghost.len()
    }

    /// Retrieves a value by key without updating its frequency.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::s3_fifo::S3FifoCache;
    ///
    /// let mut cache = S3FifoCache::new(10);
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

    /// Retrieves a value by key, incrementing its frequency (saturating
    /// at 3).
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::s3_fifo::S3FifoCache;
    ///
    /// let mut cache = S3FifoCache::new(10);
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
        // access, so the non-atomic `get_mut` bump is race-free.
        unsafe {
            let node = &mut *node_ptr.as_ptr();
            let freq = node.freq.get_mut();
            if *freq < MAX_FREQ {
                *freq += 1;
            }
            Some(&node.value)
        }
    }

    /// Retrieves a mutable reference to a value, incrementing its
    /// frequency.
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
            let freq = node.freq.get_mut();
            if *freq < MAX_FREQ {
                *freq += 1;
            }
            Some(&mut node.value)
        }
    }

    /// Retrieves a value under shared access, bumping the frequency
    /// atomically.
    ///
    /// A bump lost to a concurrent reader merely under-counts popularity;
    /// it can never corrupt the queues. Metrics are not updated here; the
    /// concurrent wrapper keeps its own atomic counters.
    #[cfg(feature = "concurrency")]
    #[inline]
    pub(crate) fn get_shared(&self, key: &K) -> Option<&V> {
        let &node_ptr = self.map.get(key)?;
        // SAFETY: indexed pointer is live; the bump goes through an
        // `AtomicU8`, so shared-access readers cannot race.
        unsafe {
            let node = &*node_ptr.as_ptr();
            let f = node.freq.load(Ordering::SeqCst);
            if f < MAX_FREQ {
                node.freq.store(f + 1, Ordering::SeqCst);
            }
            Some(&node.value)
        }
    }

    /// Inserts or replaces a key-value pair.
    ///
    /// The eviction step runs first, so residency never exceeds the
    /// capacity. A resident key is then replaced: the old node is unlinked
    /// and freed and a fresh node (frequency 0) is installed at Main's
    /// head. A key remembered by the ghost queue is admitted into Main;
    /// any other key enters Small.
    ///
    /// Because eviction precedes the key lookup, a replacement at full
    /// capacity may evict the very entry being replaced; the install then
    /// takes the not-resident path and typically re-enters through the
    /// ghost queue into Main.
    ///
    /// # Returns
    ///
    /// - `Some(old_value)` if the key was still resident when installed
    /// - `None` if the key was absent (a fresh insertion)
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::s3_fifo::S3FifoCache;
    ///
    /// let mut cache = S3FifoCache::new(10);
    ///
    /// assert_eq!(cache.insert("key", "initial"), None);
    /// assert_eq!(cache.insert("key", "updated"), Some("initial"));
    /// assert_eq!(cache.get(&"key"), Some(&"updated"));
    /// assert_eq!(cache.len(), 1);
    /// ```
    #[inline]
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.evict_if_needed();

        if let Some(&old_ptr) = self.map.get(&key) {
            #[cfg(feature = "metrics")]
            {
                self.metrics.updates += 1;
            }

            // SAFETY: indexed pointer is live; queue kind copied out
            // before detach mutates neighbouring nodes.
            let queue = unsafe { old_ptr.as_ref().queue };
            match queue {
                QueueKind::Small => self.detach_small(old_ptr),
                QueueKind::Main => self.detach_main(old_ptr),
            }
            // SAFETY: detached and about to be unindexed; sole owner.
            let old = unsafe { Box::from_raw(old_ptr.as_ptr()) };

            let node_ptr = Self::alloc_node(key.clone(), value);
            self.map.insert(key, node_ptr);
            self.attach_main_head(node_ptr);
            return Some(old.value);
        }

        #[cfg(feature = "metrics")]
        {
            self.metrics.inserts += 1;
        }

        // Ghost-guided admission: a recently evicted key goes straight to
        // Main instead of re-running the Small gauntlet.
        let admit_to_main = self.ghost.remove(&key);

        #[cfg(feature = "metrics")]
        if admit_to_main {
            self.metrics.ghost_hits += 1;
        }

        let node_ptr = Self::alloc_node(key.clone(), value);
        self.map.insert(key, node_ptr);
        if admit_to_main {
            self.attach_main_head(node_ptr);
        } else {
            self.attach_small_head(node_ptr);
        }

        None
    }

    /// Removes a key, returning its value if it was resident.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::s3_fifo::S3FifoCache;
    ///
    /// let mut cache = S3FifoCache::new(10);
    /// cache.insert("key", 42);
    ///
    /// assert_eq!(cache.remove(&"key"), Some(42));
    /// assert_eq!(cache.remove(&"key"), None);
    /// assert!(cache.is_empty());
    /// ```
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Detaches and returns the entry for a key, removing it from the
    /// index and from the single queue that owns it.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::s3_fifo::S3FifoCache;
    ///
    /// let mut cache = S3FifoCache::new(10);
    /// cache.insert("foo", "bar");
    ///
    /// assert_eq!(cache.remove_entry(&"foo"), Some(("foo", "bar")));
    /// assert_eq!(cache.get(&"foo"), None);
    /// ```
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let node_ptr = self.map.remove(key)?;

        // SAFETY: the pointer was indexed a moment ago, so the node is
        // live; queue kind copied out before detach mutates neighbours.
        let queue = unsafe { node_ptr.as_ref().queue };
        match queue {
            QueueKind::Small => self.detach_small(node_ptr),
            QueueKind::Main => self.detach_main(node_ptr),
        }

        // SAFETY: detached and unindexed; this is the sole owner.
        let node = unsafe { Box::from_raw(node_ptr.as_ptr()) };
        let Node { key, value, .. } = *node;
        Some((key, value))
    }

    /// Removes all entries and forgets all ghost keys, leaving the cache
    /// empty but usable.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::s3_fifo::S3FifoCache;
    ///
    /// let mut cache = S3FifoCache::new(10);
    /// cache.insert("a", 1);
    /// cache.insert("b", 2);
    ///
    /// cache.clear();
    /// assert!(cache.is_empty());
    /// ```
    pub fn clear(&mut self) {
        while self.drop_small_tail() {}
        while self.drop_main_tail() {}
        self.map.clear();
        self.ghost.clear();
    }

    /// Returns an iterator over key-value pairs: Small entries first, then
    /// Main, each newest to oldest.
    ///
    /// Iteration order is an implementation detail, not a contract.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            current: self.small_head,
            main_head: self.main_head,
            in_small: true,
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
    pub fn metrics(&self) -> &S3FifoMetrics {
        &self.metrics
    }

    /// Resets performance metrics to zero.
    #[cfg(feature = "metrics")]
    #[inline]
    pub fn reset_metrics(&mut self) {
        self.metrics = S3FifoMetrics::default();
    }

    /// Validates internal data structure invariants.
    ///
    /// Checks queue length counters against the lists, index/queue
    /// agreement, per-node queue tags, frequency bounds, link integrity,
    /// the capacity bound, the ghost bound, and that no key is both
    /// resident and ghosted.
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
        let total_len = self.small_len + self.main_len;
        if self.map.len() != total_len {
            return Err(format!(
                "map size {} != small_len {} + main_len {}",
                self.map.len(),
                self.small_len,
                self.main_len
            ));
        }
        if total_len > self.capacity {
            return Err(format!(
                "resident entries {} > capacity {}",
                total_len, self.capacity
            ));
        }
        if self.ghost.len() > self.main_cap {
            return Err(format!(
                "ghost holds {} keys > main_cap {}",
                self.ghost.len(),
                self.main_cap
            ));
        }
        for key in self.ghost.iter() {
            if self.map.contains_key(key) {
                return Err(format!("key {:?} is both resident and ghosted", key));
            }
        }

        self.check_queue(self.small_head, self.small_tail, self.small_len, QueueKind::Small)?;
        self.check_queue(self.main_head, self.main_tail, self.main_len, QueueKind::Main)?;
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn check_queue(
        &self,
        head: Option<NonNull<Node<K, V>>>,
        tail: Option<NonNull<Node<K, V>>>,
        expected_len: usize,
        kind: QueueKind,
    ) -> Result<(), String>
    where
        K: Debug,
    {
        if head.is_none() != tail.is_none() {
            return Err(format!(
                "{:?} head/tail inconsistent: head={:?}, tail={:?}",
                kind,
                head.is_some(),
                tail.is_some()
            ));
        }
        if head.is_none() && expected_len != 0 {
            return Err(format!("{:?} queue empty but len = {}", kind, expected_len));
        }

        let mut count = 0usize;
        let mut current = head;
        let mut prev_ptr: Option<NonNull<Node<K, V>>> = None;

        while let Some(node_ptr) = current {
            count += 1;
            if count > expected_len {
                return Err(format!("{:?} queue longer than its counter", kind));
            }

            unsafe {
                let node = &*node_ptr.as_ptr();

                if node.queue != kind {
                    return Err(format!(
                        "node {:?} in {:?} queue tagged {:?}",
                        node.key, kind, node.queue
                    ));
                }
                let freq = node.freq.load(Ordering::Relaxed);
                if freq > MAX_FREQ {
                    return Err(format!(
                        "node {:?} has freq {} > {}",
                        node.key, freq, MAX_FREQ
                    ));
                }
                if node.prev != prev_ptr {
                    return Err(format!(
                        "{:?} queue: node {:?} prev pointer inconsistent",
                        kind, node.key
                    ));
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
                        return Err(format!("queued key {:?} missing from map", node.key));
                    },
                }
                if node.next.is_none() && Some(node_ptr) != tail {
                    return Err(format!(
                        "{:?} queue: last node {:?} does not match tail",
                        kind, node.key
                    ));
                }

                prev_ptr = Some(node_ptr);
                current = node.next;
            }
        }

        if count != expected_len {
            return Err(format!(
                "{:?} queue: counted {} nodes but len = {}",
                kind, count, expected_len
            ));
        }
        Ok(())
    }

    fn alloc_node(key: K, value: V) -> NonNull<Node<K, V>> {
        let node = Box::new(Node {
            prev: None,
            next: None,
            queue: QueueKind::Small,
            freq: AtomicU8::new(0),
            key,
            value,
        });
        // SAFETY: Box::into_raw always returns a non-null pointer.
        unsafe { NonNull::new_unchecked(Box::into_raw(node)) }
    }

    /// Evicts entries until residency drops below the capacity.
    ///
    /// Target selection follows the published algorithm: Main is drained
    /// once it holds its full share or once Small runs dry; otherwise the
    /// pressure lands on Small. Promotions and reinsertions keep the
    /// resident count unchanged, so the loop runs until a real eviction
    /// happens; every pass through Main decrements a frequency counter,
    /// which bounds the loop.
    fn evict_if_needed(&mut self) {
        while self.map.len() >= self.capacity {
            let acted = if self.main_len >= self.main_cap || self.small_len == 0 {
                self.evict_main()
            } else {
                self.evict_small()
            };
            if !acted {
                break;
            }
        }
    }

    /// One eviction step on the Small queue.
    ///
    /// Pops the oldest entry: with a non-zero frequency it is promoted to
    /// Main (frequency reset), otherwise its key is ghosted and the node
    /// freed. Returns `false` if Small is empty.
    fn evict_small(&mut self) -> bool {
        let tail_ptr = match self.small_tail {
            Some(ptr) => ptr,
            None => return false,
        };

        // SAFETY: read the frequency before any detach creates `&mut`
        // references to this or neighbouring nodes.
        let freq = unsafe { tail_ptr.as_ref().freq.load(Ordering::Relaxed) };

        if freq > 0 {
            #[cfg(feature = "metrics")]
            {
                self.metrics.promotions += 1;
            }

            self.detach_small(tail_ptr);
            // SAFETY: detached; fresh exclusive reference, no aliases.
            unsafe {
                let node = &mut *tail_ptr.as_ptr();
                // A promoted entry starts its Main residency cold.
                *node.freq.get_mut() = 0;
            }
            self.attach_main_head(tail_ptr);
        } else {
            #[cfg(feature = "metrics")]
            {
                self.metrics.small_evictions += 1;
            }

            // The tail was Some and nothing mutated the queue since, so
            // pop always succeeds here.
            let node = self.pop_small_tail().expect("small tail vanished");
            self.map.remove(&node.key);
            // Move the key out for ghost recording; the value drops here.
            let Node { key, .. } = *node;
            self.ghost.record(key);
        }

        true
    }

    /// One eviction step on the Main queue.
    ///
    /// Pops the oldest entry: with a non-zero frequency it is reinserted
    /// at Main's head with the frequency decremented, otherwise it is
    /// evicted outright. Main evictions are not ghosted. Returns `false`
    /// if Main is empty.
    fn evict_main(&mut self) -> bool {
        let tail_ptr = match self.main_tail {
            Some(ptr) => ptr,
            None => return false,
        };

        // SAFETY: as in `evict_small`.
        let freq = unsafe { tail_ptr.as_ref().freq.load(Ordering::Relaxed) };

        if freq > 0 {
            #[cfg(feature = "metrics")]
            {
                self.metrics.main_reinserts += 1;
            }

            self.detach_main(tail_ptr);
            // SAFETY: detached; fresh exclusive reference, no aliases.
            unsafe {
                let node = &mut *tail_ptr.as_ptr();
                *node.freq.get_mut() = freq - 1;
            }
            self.attach_main_head(tail_ptr);
        } else {
            #[cfg(feature = "metrics")]
            {
                self.metrics.main_evictions += 1;
            }

            let node = self.pop_main_tail().expect("main tail vanished");
            self.map.remove(&node.key);
        }

        true
    }

    /// Attaches a node at the head of the Small queue.
    #[inline(always)]
    fn attach_small_head(&mut self, mut node_ptr: NonNull<Node<K, V>>) {
        unsafe {
            let node = node_ptr.as_mut();
            node.prev = None;
            node.next = self.small_head;
            node.queue = QueueKind::Small;

            match self.small_head {
                Some(mut h) => h.as_mut().prev = Some(node_ptr),
                None => self.small_tail = Some(node_ptr),
            }

            self.small_head = Some(node_ptr);
            self.small_len += 1;
        }
    }

    /// Attaches a node at the head of the Main queue.
    #[inline(always)]
    fn attach_main_head(&mut self, mut node_ptr: NonNull<Node<K, V>>) {
        unsafe {
            let node = node_ptr.as_mut();
            node.prev = None;
            node.next = self.main_head;
            node.queue = QueueKind::Main;

            match self.main_head {
                Some(mut h) => h.as_mut().prev = Some(node_ptr),
                None => self.main_tail = Some(node_ptr),
            }

            self.main_head = Some(node_ptr);
            self.main_len += 1;
        }
    }

    /// Detaches a node from the Small queue without deallocating it.
    #[inline(always)]
    fn detach_small(&mut self, mut node_ptr: NonNull<Node<K, V>>) {
        unsafe {
            let node = node_ptr.as_mut();

            match node.prev {
                Some(mut p) => p.as_mut().next = node.next,
                None => self.small_head = node.next,
            }

            match node.next {
                Some(mut n) => n.as_mut().prev = node.prev,
                None => self.small_tail = node.prev,
            }

            self.small_len -= 1;
        }
    }

    /// Detaches a node from the Main queue without deallocating it.
    #[inline(always)]
    fn detach_main(&mut self, mut node_ptr: NonNull<Node<K, V>>) {
        unsafe {
            let node = node_ptr.as_mut();

            match node.prev {
                Some(mut p) => p.as_mut().next = node.next,
                None => self.main_head = node.next,
            }

            match node.next {
                Some(mut n) => n.as_mut().prev = node.prev,
                None => self.main_tail = node.prev,
            }

            self.main_len -= 1;
        }
    }

    /// Pops the Small tail (oldest), taking ownership of the node.
    #[inline(always)]
    fn pop_small_tail(&mut self) -> Option<Box<Node<K, V>>> {
        self.small_tail.map(|tail_ptr| unsafe {
            let node = Box::from_raw(tail_ptr.as_ptr());

            self.small_tail = node.prev;
            match self.small_tail {
                Some(mut t) => t.as_mut().next = None,
                None => self.small_head = None,
            }
            self.small_len -= 1;

            node
        })
    }

    /// Pops the Main tail (oldest), taking ownership of the node.
    #[inline(always)]
    fn pop_main_tail(&mut self) -> Option<Box<Node<K, V>>> {
        self.main_tail.map(|tail_ptr| unsafe {
            let node = Box::from_raw(tail_ptr.as_ptr());

            self.main_tail = node.prev;
            match self.main_tail {
                Some(mut t) => t.as_mut().next = None,
                None => self.main_head = None,
            }
            self.main_len -= 1;

            node
        })
    }
}

// Private helpers needed by Drop, without trait bounds.
impl<K, V> S3FifoCache<K, V> {
    /// Pops and deallocates the Small tail.
    fn drop_small_tail(&mut self) -> bool {
        if let Some(tail_ptr) = self.small_tail {
            // SAFETY: tail is live and owned by the cache; no pointer to
            // it remains after this block.
            unsafe {
                let node = Box::from_raw(tail_ptr.as_ptr());
                self.small_tail = node.prev;
                match self.small_tail {
                    Some(mut t) => t.as_mut().next = None,
                    None => self.small_head = None,
                }
                self.small_len -= 1;
            }
            true
        } else {
            false
        }
    }

    /// Pops and deallocates the Main tail.
    fn drop_main_tail(&mut self) -> bool {
        if let Some(tail_ptr) = self.main_tail {
            // SAFETY: as in `drop_small_tail`.
            unsafe {
                let node = Box::from_raw(tail_ptr.as_ptr());
                self.main_tail = node.prev;
                match self.main_tail {
                    Some(mut t) => t.as_mut().next = None,
                    None => self.main_head = None,
                }
                self.main_len -= 1;
            }
            true
        } else {
            false
        }
    }
}

impl<K, V> Drop for S3FifoCache<K, V> {
    fn drop(&mut self) {
        while self.drop_small_tail() {}
        while self.drop_main_tail() {}
    }
}

impl<K, V> FromIterator<(K, V)> for S3FifoCache<K, V>
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

impl<K, V> Extend<(K, V)> for S3FifoCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V> IntoIterator for &'a S3FifoCache<K, V>
where
    K: Clone + Eq + Hash,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V> Debug for S3FifoCache<K, V>
where
    K: Clone + Eq + Hash + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3FifoCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("small_len", &self.small_len)
            .field("main_len", &self.main_len)
            .field("ghost_len", &self.ghost.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> ReadOnlyCache<K, V> for S3FifoCache<K, V>
where
    K: Clone + Eq + Hash,
{
    #[inline]
    fn contains(&self, key: &K) -> bool {
        S3FifoCache::contains(self, key)
    }

    #[inline]
    fn len(&self) -> usize {
        S3FifoCache::len(self)
    }

    #[inline]
    fn capacity(&self) -> usize {
        S3FifoCache::capacity(self)
    }
}

impl<K, V> CoreCache<K, V> for S3FifoCache<K, V>
where
    K: Clone + Eq + Hash,
{
    #[inline]
    fn insert(&mut self, key: K, value: V) -> Option<V> {
        S3FifoCache::insert(self, key, value)
    }

    #[inline]
    fn get(&mut self, key: &K) -> Option<&V> {
        S3FifoCache::get(self, key)
    }

    fn clear(&mut self) {
        S3FifoCache::clear(self);
    }
}

impl<K, V> MutableCache<K, V> for S3FifoCache<K, V>
where
    K: Clone + Eq + Hash,
{
    #[inline]
    fn remove(&mut self, key: &K) -> Option<V> {
        S3FifoCache::remove(self, key)
    }

    #[inline]
    fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        S3FifoCache::remove_entry(self, key)
    }
}

/// Thread-safe S3-FIFO cache wrapper using an RwLock.
///
/// `get` runs under the **read lock**: the frequency bump goes through the
/// per-entry atomic counter, so parallel readers are safe. Structural
/// mutation takes the write lock.
///
/// # Example
///
/// ```
/// use sievekit::policy::s3_fifo::ConcurrentS3FifoCache;
///
/// let cache = ConcurrentS3FifoCache::new(100);
///
/// cache.insert("key", "value");
/// assert!(cache.contains(&"key"));
/// assert_eq!(cache.get(&"key"), Some("value"));
/// ```
#[cfg(feature = "concurrency")]
#[derive(Debug)]
pub struct ConcurrentS3FifoCache<K, V>
where
    K: Clone + Eq + Hash,
{
    inner: Arc<RwLock<S3FifoCache<K, V>>>,

    /// Hit counter for the read-lock `get`/`get_with` path.
    #[cfg(feature = "metrics")]
    read_hits: AtomicU64,

    /// Miss counter for the read-lock `get`/`get_with` path.
    #[cfg(feature = "metrics")]
    read_misses: AtomicU64,
}

#[cfg(feature = "concurrency")]
impl<K, V> Clone for ConcurrentS3FifoCache<K, V>
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
impl<K, V> ConcurrentS3FifoCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates a new concurrent S3-FIFO cache.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::from_inner(S3FifoCache::new(capacity))
    }

    /// Creates a new concurrent S3-FIFO cache, rejecting a zero capacity.
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        S3FifoCache::try_new(capacity).map(Self::from_inner)
    }

    fn from_inner(inner: S3FifoCache<K, V>) -> Self {
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

    /// Gets a cloned value by key, bumping its frequency.
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
    /// The frequency is still bumped. Works for non-`Clone` values.
    ///
    /// # Example
    ///
    /// ```
    /// use sievekit::policy::s3_fifo::ConcurrentS3FifoCache;
    ///
    /// let cache = ConcurrentS3FifoCache::new(10);
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

    /// Peeks at a cloned value without bumping the frequency.
    pub fn peek(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.read().peek(key).cloned()
    }

    /// Peeks at a value through `f` without bumping the frequency.
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

    /// Returns the number of entries in the Small queue.
    pub fn small_len(&self) -> usize {
        self.inner.read().small_len()
    }

    /// Returns the number of entries in the Main queue.
    pub fn main_len(&self) -> usize {
        self.inner.read().main_len()
    }

    /// Returns the number of keys in the ghost queue.
    pub fn ghost_len(&self) -> usize {
        self.inner.read().ghost_len()
    }

    /// Returns merged metrics (inner write-path + concurrent read-path).
    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> S3FifoMetrics {
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
impl<K, V> ConcurrentCache for ConcurrentS3FifoCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Send + Sync,
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    const _: () = {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        fn check() {
            assert_send::<S3FifoCache<String, i32>>();
            assert_sync::<S3FifoCache<String, i32>>();
        }
    };

    // ==============================================
    // Basic Operations
    // ==============================================

    mod basic_operations {
        use super::*;

        #[test]
        fn new_cache_is_empty() {
            let cache: S3FifoCache<&str, i32> = S3FifoCache::new(100);
            assert!(cache.is_empty());
            assert_eq!(cache.len(), 0);
            assert_eq!(cache.capacity(), 100);
            assert_eq!(cache.small_capacity(), 10);
            assert_eq!(cache.main_capacity(), 90);
        }

        #[test]
        fn insert_and_get() {
            let mut cache = S3FifoCache::new(100);
            cache.insert("key1", "value1");

            assert_eq!(cache.len(), 1);
            assert_eq!(cache.get(&"key1"), Some(&"value1"));
        }

        #[test]
        fn get_missing_key_returns_none() {
            let mut cache: S3FifoCache<&str, i32> = S3FifoCache::new(100);
            cache.insert("exists", 42);

            assert_eq!(cache.get(&"missing"), None);
        }

        #[test]
        fn contains_does_not_bump_frequency() {
            let mut cache = S3FifoCache::new(2);
            cache.insert("a", 1);
            cache.insert("b", 2);

            // Probing "a" must not earn it a promotion.
            assert!(cache.contains(&"a"));
            cache.insert("c", 3);

            assert!(!cache.contains(&"a"));
            assert_eq!(cache.len(), 2);
        }

        #[test]
        fn get_mut_updates_value() {
            let mut cache = S3FifoCache::new(10);
            cache.insert("key", 1);
            if let Some(v) = cache.get_mut(&"key") {
                *v = 2;
            }
            assert_eq!(cache.peek(&"key"), Some(&2));
        }

        #[test]
        fn clear_removes_entries_and_ghosts() {
            let mut cache = S3FifoCache::new(2);
            cache.insert("a", 1);
            cache.insert("b", 2);
            cache.insert("c", 3); // ghosts "a"
            assert_eq!(cache.ghost_len(), 1);

            cache.clear();

            assert!(cache.is_empty());
            assert_eq!(cache.small_len(), 0);
            assert_eq!(cache.main_len(), 0);
            assert_eq!(cache.ghost_len(), 0);

            // A cleared ghost no longer steers admission.
            cache.insert("a", 1);
            assert_eq!(cache.main_len(), 0);
            assert_eq!(cache.small_len(), 1);
        }

        #[test]
        #[should_panic(expected = "cache capacity must be greater than zero")]
        fn zero_capacity_panics_at_construction() {
            let _cache: S3FifoCache<&str, &str> = S3FifoCache::new(0);
        }

        #[test]
        fn zero_capacity_try_new_errors() {
            let err = S3FifoCache::<&str, i32>::try_new(0).unwrap_err();
            assert!(err.to_string().contains("capacity"));
        }
    }

    // ==============================================
    // Queue Behavior
    // ==============================================

    mod queue_behavior {
        use super::*;

        #[test]
        fn new_insert_goes_to_small() {
            let mut cache = S3FifoCache::new(100);
            cache.insert("key", "value");

            assert_eq!(cache.small_len(), 1);
            assert_eq!(cache.main_len(), 0);
        }

        #[test]
        fn accessed_item_promoted_on_small_drain() {
            let mut cache: S3FifoCache<String, i32> = S3FifoCache::new(5);

            cache.insert("hot".to_string(), 0);
            cache.get(&"hot".to_string());
            cache.get(&"hot".to_string()); // freq = 2

            for i in 1..10 {
                cache.insert(format!("cold_{i}"), i);
            }

            // "hot" was promoted into Main rather than ghosted.
            assert!(cache.contains(&"hot".to_string()));
            assert!(cache.main_len() >= 1);
        }

        #[test]
        fn one_hit_wonders_are_ghosted_not_promoted() {
            let mut cache = S3FifoCache::new(3);
            cache.insert("x", 1);
            cache.insert("a", 2);
            cache.insert("b", 3);

            // "x" has freq 0: eviction pushes its key into the ghost.
            cache.insert("c", 4);

            assert!(!cache.contains(&"x"));
            assert!(cache.ghost.contains(&"x"));
            assert_eq!(cache.main_len(), 0);
        }

        #[test]
        fn replacement_installs_fresh_node_in_main() {
            let mut cache = S3FifoCache::new(10);
            cache.insert("k", "v1");
            assert_eq!(cache.small_len(), 1);

            let old = cache.insert("k", "v2");

            assert_eq!(old, Some("v1"));
            assert_eq!(cache.len(), 1);
            assert_eq!(cache.small_len(), 0);
            assert_eq!(cache.main_len(), 1);
            assert_eq!(cache.get(&"k"), Some(&"v2"));
        }

        #[test]
        fn main_reinsertion_spares_accessed_entry() {
            let mut cache = S3FifoCache::new(2);

            // Promote "a" and "b"; the Main pass then drops cold "a",
            // leaving "b" resident in Main with "c" in Small.
            cache.insert("a", 1);
            cache.get(&"a");
            cache.insert("b", 2);
            cache.get(&"b");
            cache.insert("c", 3);
            assert!(cache.contains(&"b"));
            assert!(cache.contains(&"c"));

            // Both survivors get accessed; the next drain promotes "c",
            // fills Main, and the Main pass reinserts "b" (freq > 0)
            // while evicting the promoted-cold "c".
            cache.get(&"b");
            cache.get(&"c");
            cache.insert("d", 4);

            assert!(cache.contains(&"b"));
            assert!(!cache.contains(&"c"));
            assert!(cache.contains(&"d"));
            assert_eq!(cache.len(), 2);
            #[cfg(feature = "metrics")]
            assert!(cache.metrics().main_reinserts >= 1);
        }
    }

    // ==============================================
    // Ghost-Guided Admission
    // ==============================================

    mod ghost_behavior {
        use super::*;

        #[test]
        fn evicted_key_recorded_in_ghost() {
            let mut cache = S3FifoCache::new(3);
            cache.insert("a", 1);
            cache.insert("b", 2);
            cache.insert("c", 3);

            cache.insert("d", 4);

            assert_eq!(cache.ghost_len(), 1);
            assert!(cache.ghost.contains(&"a"));
        }

        #[test]
        fn ghost_hit_admits_into_main() {
            let mut cache = S3FifoCache::new(3);
            cache.insert("x", 1);
            cache.insert("a", 2);
            cache.insert("b", 3);
            cache.insert("c", 4); // ghosts "x"
            assert!(cache.ghost.contains(&"x"));

            cache.insert("x", 5);

            assert!(cache.contains(&"x"));
            assert_eq!(cache.main_len(), 1);
            assert!(!cache.ghost.contains(&"x"));
        }

        #[test]
        fn replacement_at_full_capacity_readmits_via_ghost() {
            let mut cache = S3FifoCache::new(1);
            cache.insert("a", 1);

            // Eviction runs before the key is examined, so the old "a" is
            // ghosted first and the install comes back through the ghost
            // path into Main.
            let old = cache.insert("a", 2);

            assert_eq!(old, None);
            assert_eq!(cache.get(&"a"), Some(&2));
            assert_eq!(cache.len(), 1);
            assert_eq!(cache.main_len(), 1);
        }

        #[test]
        fn ghost_is_bounded_by_main_capacity() {
            let mut cache = S3FifoCache::new(4);
            for i in 0..100 {
                cache.insert(i, i);
            }
            assert!(cache.ghost_len() <= cache.main_capacity());
            cache.check_invariants().expect("invariants violated");
        }
    }

    // ==============================================
    // Eviction Behavior
    // ==============================================

    mod eviction_behavior {
        use super::*;

        #[test]
        fn eviction_occurs_at_capacity() {
            let mut cache = S3FifoCache::new(5);
            for i in 0..10 {
                cache.insert(i, i * 10);
            }
            assert_eq!(cache.len(), 5);
        }

        #[test]
        fn exactly_one_eviction_past_capacity() {
            let mut cache = S3FifoCache::new(4);
            for i in 0..4 {
                cache.insert(i, i);
            }
            assert_eq!(cache.len(), 4);

            cache.insert(4, 4);
            assert_eq!(cache.len(), 4);
            let survivors = (0..5).filter(|i| cache.contains(i)).count();
            assert_eq!(survivors, 4);
        }

        #[test]
        fn oldest_unaccessed_small_entry_evicted_first() {
            let mut cache = S3FifoCache::new(5);
            cache.insert("first", 1);
            cache.insert("second", 2);
            cache.insert("third", 3);
            cache.insert("fourth", 4);
            cache.insert("fifth", 5);
            cache.insert("sixth", 6);

            assert!(!cache.contains(&"first"));
            assert_eq!(cache.len(), 5);
        }

        #[test]
        fn accessed_entry_survives_small_drain() {
            // Capacity 3: the Small share is zero, so everything flows
            // through Small under pressure. One access is enough to carry
            // key 1 into Main before the drain reaches it.
            let mut cache = S3FifoCache::new(3);
            assert_eq!(cache.insert(1, "one"), None);
            assert_eq!(cache.insert(2, "two"), None);
            assert_eq!(cache.get(&1), Some(&"one"));
            cache.insert(3, "three");
            cache.insert(4, "four");
            cache.insert(5, "five");
            cache.insert(4, "four");

            assert!(cache.contains(&1));
            assert_eq!(cache.len(), 3);
            cache.check_invariants().expect("invariants violated");
        }

        #[test]
        fn single_capacity() {
            let mut cache = S3FifoCache::new(1);

            cache.insert("a", 1);
            assert!(cache.contains(&"a"));

            cache.insert("b", 2);
            assert!(!cache.contains(&"a"));
            assert!(cache.contains(&"b"));
            assert_eq!(cache.len(), 1);
        }

        #[test]
        fn capacity_maintained_under_churn() {
            let mut cache = S3FifoCache::new(100);
            for i in 0..1000 {
                cache.insert(i, i);
                if i % 7 == 0 {
                    cache.get(&(i / 2));
                }
                assert!(cache.len() <= 100);
            }
            assert_eq!(cache.len(), 100);
            cache.check_invariants().expect("invariants violated");
        }
    }

    // ==============================================
    // Scan Resistance
    // ==============================================

    mod scan_resistance {
        use super::*;

        #[test]
        fn working_set_survives_scan() {
            let mut cache = S3FifoCache::new(100);

            for i in 0..30 {
                let key = format!("working_{i}");
                cache.insert(key.clone(), i);
                cache.get(&key);
                cache.get(&key);
            }

            for i in 0..200 {
                cache.insert(format!("scan_{i}"), i);
            }

            let survivors = (0..30)
                .filter(|i| cache.contains(&format!("working_{i}")))
                .count();
            assert!(
                survivors >= 20,
                "expected most of the working set to survive, got {survivors}"
            );
        }

        #[test]
        fn one_hit_wonders_drain_through_small() {
            let mut cache = S3FifoCache::new(50);

            for i in 0..10 {
                let key = format!("hot_{i}");
                cache.insert(key.clone(), i);
                cache.get(&key);
                cache.get(&key);
            }

            for scan in 0..3 {
                for i in 0..100 {
                    cache.insert(format!("scan_{scan}_{i}"), i);
                }
            }

            let survivors = (0..10)
                .filter(|i| cache.contains(&format!("hot_{i}")))
                .count();
            assert!(
                survivors >= 8,
                "hot entries should survive repeated scans, got {survivors}"
            );
        }
    }

    // ==============================================
    // Removal
    // ==============================================

    mod removal {
        use super::*;

        #[test]
        fn remove_from_small_and_main() {
            let mut cache = S3FifoCache::new(10);
            cache.insert("s", 1); // stays in Small
            cache.insert("m", 2);
            cache.insert("m", 3); // replacement moves "m" into Main

            assert_eq!(cache.remove(&"s"), Some(1));
            assert_eq!(cache.remove(&"m"), Some(3));
            assert!(cache.is_empty());
            assert_eq!(cache.small_len(), 0);
            assert_eq!(cache.main_len(), 0);
        }

        #[test]
        fn remove_entry_returns_key_and_value() {
            let mut cache = S3FifoCache::new(10);
            cache.insert("foo".to_string(), "bar".to_string());

            let (k, v) = cache.remove_entry(&"foo".to_string()).unwrap();
            assert_eq!(k, "foo");
            assert_eq!(v, "bar");
            assert_eq!(cache.get(&"foo".to_string()), None);
        }

        #[test]
        fn remove_missing_key_is_none() {
            let mut cache: S3FifoCache<&str, i32> = S3FifoCache::new(4);
            assert_eq!(cache.remove(&"nope"), None);
            assert_eq!(cache.remove_entry(&"nope"), None);
        }

        #[test]
        fn remove_does_not_touch_ghost() {
            let mut cache = S3FifoCache::new(2);
            cache.insert("a", 1);
            cache.insert("b", 2);
            cache.insert("c", 3); // ghosts "a"
            let ghosts_before = cache.ghost_len();

            cache.remove(&"b");
            assert_eq!(cache.ghost_len(), ghosts_before);
            cache.check_invariants().expect("invariants violated");
        }
    }

    // ==============================================
    // Iteration
    // ==============================================

    mod iteration {
        use super::*;

        #[test]
        fn iter_covers_both_queues() {
            let mut cache = S3FifoCache::new(10);
            cache.insert("a", 1);
            cache.insert("b", 2);
            cache.insert("b", 20); // moves "b" into Main

            let mut items: Vec<_> = cache.iter().map(|(k, v)| (*k, *v)).collect();
            items.sort();
            assert_eq!(items, vec![("a", 1), ("b", 20)]);
            assert_eq!(cache.keys().count(), 2);
            assert_eq!(cache.values().count(), 2);
        }

        #[test]
        fn from_iterator_and_extend() {
            let mut cache: S3FifoCache<_, _> =
                vec![("a", 1), ("b", 2)].into_iter().collect();
            assert_eq!(cache.len(), 2);

            cache.extend(vec![("c", 3)]);
            assert_eq!(cache.len(), 3);
            assert_eq!(cache.peek(&"c"), Some(&3));
        }
    }

    // ==============================================
    // Metrics
    // ==============================================

    #[cfg(feature = "metrics")]
    mod metrics {
        use super::*;

        #[test]
        fn counters_track_operations() {
            let mut cache = S3FifoCache::new(3);
            cache.insert("a", 1);
            cache.insert("b", 2);
            cache.get(&"a");
            cache.get(&"missing");
            cache.insert("c", 3);
            cache.insert("d", 4); // promotes "a", ghosts "b"

            let m = cache.metrics();
            assert_eq!(m.inserts, 4);
            assert_eq!(m.hits, 1);
            assert_eq!(m.misses, 1);
            assert_eq!(m.promotions, 1);
            assert_eq!(m.small_evictions, 1);

            cache.reset_metrics();
            assert_eq!(cache.metrics().hits, 0);
        }

        #[test]
        fn ghost_hits_counted_on_readmission() {
            let mut cache = S3FifoCache::new(2);
            cache.insert("a", 1);
            cache.insert("b", 2);
            cache.insert("c", 3); // ghosts "a"
            cache.insert("a", 4); // ghost hit

            assert_eq!(cache.metrics().ghost_hits, 1);
        }

        #[test]
        fn display_includes_hit_rate() {
            let mut cache = S3FifoCache::new(4);
            cache.insert("a", 1);
            cache.get(&"a");
            let text = cache.metrics().to_string();
            assert!(text.contains("hit_rate"));
        }
    }

    // ==============================================
    // Concurrent Wrapper
    // ==============================================

    #[cfg(feature = "concurrency")]
    mod concurrent_cache {
        use super::*;

        #[test]
        fn concurrent_basic_operations() {
            let cache = ConcurrentS3FifoCache::new(100);

            cache.insert("key".to_string(), "value".to_string());
            assert!(cache.contains(&"key".to_string()));
            assert_eq!(cache.get(&"key".to_string()), Some("value".to_string()));
            assert_eq!(cache.len(), 1);

            cache.clear();
            assert!(cache.is_empty());
        }

        #[test]
        fn shared_variant_string_keys() {
            let cache = ConcurrentS3FifoCache::new(2);
            cache.insert("apple".to_string(), "red".to_string());
            cache.insert("banana".to_string(), "yellow".to_string());

            assert_eq!(cache.get(&"apple".to_string()), Some("red".to_string()));
            assert_eq!(
                cache.get(&"banana".to_string()),
                Some("yellow".to_string())
            );
        }

        #[test]
        fn concurrent_read_bumps_frequency() {
            let cache = ConcurrentS3FifoCache::new(3);
            cache.insert("hot".to_string(), 0);
            cache.get(&"hot".to_string());

            for i in 0..10 {
                cache.insert(format!("cold_{i}"), i);
            }

            // The read-path bump was enough to promote "hot" into Main.
            assert!(cache.contains(&"hot".to_string()));
        }

        #[test]
        fn concurrent_queue_stats() {
            let cache = ConcurrentS3FifoCache::new(100);
            cache.insert("a".to_string(), 1);
            cache.insert("b".to_string(), 2);

            assert_eq!(cache.small_len(), 2);
            assert_eq!(cache.main_len(), 0);
            assert_eq!(cache.ghost_len(), 0);
        }

        #[test]
        fn concurrent_remove_batch() {
            let cache = ConcurrentS3FifoCache::new(10);
            cache.insert("a".to_string(), 1);
            cache.insert("b".to_string(), 2);
            cache.insert("c".to_string(), 3);

            let removed =
                cache.remove_batch(&["a".to_string(), "z".to_string(), "c".to_string()]);
            assert_eq!(removed, vec![Some(1), None, Some(3)]);
            assert_eq!(cache.len(), 1);
        }
    }
}
