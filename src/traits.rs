//! Cache trait hierarchy.
//!
//! Both eviction engines in this crate satisfy the same external contract,
//! split across three traits so that callers can require exactly the
//! capability they need:
//!
//! ```text
//!   ReadOnlyCache<K, V>      contains / len / is_empty / capacity
//!         │
//!         ▼
//!   CoreCache<K, V>          insert / get / clear
//!         │
//!         ▼
//!   MutableCache<K, V>       remove / remove_entry / remove_batch
//!
//!   ConcurrentCache          marker: Send + Sync, for the shared wrappers
//! ```
//!
//! `get` is notionally mutating — it updates policy metadata (the SIEVE
//! visited bit, the S3-FIFO frequency counter) — so it lives on
//! [`CoreCache`] and takes `&mut self`. `contains` never changes policy
//! state and lives on [`ReadOnlyCache`].

/// Read-only cache observations.
///
/// None of these operations change eviction state: probing a key with
/// [`contains`](Self::contains) leaves the visited bit and frequency
/// counter alone.
///
/// # Example
///
/// ```
/// use sievekit::traits::{CoreCache, ReadOnlyCache};
/// use sievekit::policy::sieve::SieveCache;
///
/// let mut cache = SieveCache::new(10);
/// cache.insert("key", 1);
///
/// assert!(cache.contains(&"key"));
/// assert_eq!(cache.len(), 1);
/// assert_eq!(cache.capacity(), 10);
/// ```
pub trait ReadOnlyCache<K, V> {
    /// Returns `true` if the key is resident, without updating access state.
    fn contains(&self, key: &K) -> bool;

    /// Returns the current number of resident entries.
    fn len(&self) -> usize;

    /// Returns `true` if the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the immutable capacity bound fixed at construction.
    fn capacity(&self) -> usize;
}

/// Core cache operations that every policy supports.
///
/// # Example
///
/// ```
/// use sievekit::traits::{CoreCache, ReadOnlyCache};
/// use sievekit::policy::s3_fifo::S3FifoCache;
///
/// fn warm<C: CoreCache<u64, String>>(cache: &mut C, data: &[(u64, String)]) {
///     for (key, value) in data {
///         cache.insert(*key, value.clone());
///     }
/// }
///
/// let mut cache = S3FifoCache::new(100);
/// warm(&mut cache, &[(1, "one".to_string()), (2, "two".to_string())]);
/// assert_eq!(cache.len(), 2);
/// ```
pub trait CoreCache<K, V>: ReadOnlyCache<K, V> {
    /// Inserts a key-value pair, returning the previous value if the key
    /// was resident.
    ///
    /// `None` means the key was absent and this call was an insertion. If
    /// inserting would exceed the capacity, the policy-specific eviction
    /// step runs first.
    fn insert(&mut self, key: K, value: V) -> Option<V>;

    /// Gets a reference to a value by key, updating policy metadata on a
    /// hit.
    ///
    /// Use [`ReadOnlyCache::contains`] to check existence without touching
    /// eviction state.
    fn get(&mut self, key: &K) -> Option<&V>;

    /// Removes all entries, leaving the cache empty but usable.
    fn clear(&mut self);
}

/// Caches that support arbitrary key-based removal.
///
/// # Example
///
/// ```
/// use sievekit::traits::{CoreCache, MutableCache};
/// use sievekit::policy::sieve::SieveCache;
///
/// let mut cache = SieveCache::new(10);
/// cache.insert("foo", "bar");
///
/// assert_eq!(cache.remove_entry(&"foo"), Some(("foo", "bar")));
/// assert_eq!(cache.remove(&"foo"), None);
/// ```
pub trait MutableCache<K, V>: CoreCache<K, V> {
    /// Removes a key, returning its value if it was resident.
    fn remove(&mut self, key: &K) -> Option<V>;

    /// Detaches and returns the full entry for a key, removing it from
    /// both the index and its queue.
    fn remove_entry(&mut self, key: &K) -> Option<(K, V)>;

    /// Removes multiple keys, returning values in input order.
    ///
    /// The default implementation loops over [`remove`](Self::remove).
    fn remove_batch(&mut self, keys: &[K]) -> Vec<Option<V>> {
        keys.iter().map(|k| self.remove(k)).collect()
    }
}

/// Marker trait for caches that are safe to use concurrently.
///
/// Implemented by the `Concurrent*` wrappers; the plain engines require
/// external serialization and do not implement it.
#[cfg(feature = "concurrency")]
pub trait ConcurrentCache: Send + Sync {}
