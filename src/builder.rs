//! Unified cache builder for both eviction policies.
//!
//! Provides a simple API to create caches with either eviction policy
//! behind one concrete type, for callers that pick the policy at runtime.
//!
//! ## Example
//!
//! ```rust
//! use sievekit::builder::{CacheBuilder, CachePolicy};
//!
//! let mut cache = CacheBuilder::new(100).build::<u64, String>(CachePolicy::Sieve);
//! cache.insert(1, "hello".to_string());
//! assert_eq!(cache.get(&1), Some(&"hello".to_string()));
//! ```

use std::hash::Hash;

use crate::policy::s3_fifo::S3FifoCache;
use crate::policy::sieve::SieveCache;

/// Available cache eviction policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// SIEVE: single list, visited bits, scanning hand.
    Sieve,
    /// S3-FIFO: small/main/ghost queues with frequency counters.
    S3Fifo,
}

/// Policy-erased cache that exposes the common contract.
pub struct Cache<K, V>
where
    K: Clone + Eq + Hash,
{
    inner: CacheInner<K, V>,
}

enum CacheInner<K, V>
where
    K: Clone + Eq + Hash,
{
    Sieve(SieveCache<K, V>),
    S3Fifo(S3FifoCache<K, V>),
}

impl<K, V> Cache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Inserts a key-value pair. Returns the previous value if the key was
    /// resident.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match &mut self.inner {
            CacheInner::Sieve(sieve) => sieve.insert(key, value),
            CacheInner::S3Fifo(s3) => s3.insert(key, value),
        }
    }

    /// Gets a reference to a value by key, updating policy metadata.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        match &mut self.inner {
            CacheInner::Sieve(sieve) => sieve.get(key),
            CacheInner::S3Fifo(s3) => s3.get(key),
        }
    }

    /// Gets a reference to a value by key without updating policy metadata.
    pub fn peek(&self, key: &K) -> Option<&V> {
        match &self.inner {
            CacheInner::Sieve(sieve) => sieve.peek(key),
            CacheInner::S3Fifo(s3) => s3.peek(key),
        }
    }

    /// Checks whether a key is resident.
    pub fn contains(&self, key: &K) -> bool {
        match &self.inner {
            CacheInner::Sieve(sieve) => sieve.contains(key),
            CacheInner::S3Fifo(s3) => s3.contains(key),
        }
    }

    /// Removes a key, returning its value if it was resident.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        match &mut self.inner {
            CacheInner::Sieve(sieve) => sieve.remove(key),
            CacheInner::S3Fifo(s3) => s3.remove(key),
        }
    }

    /// Detaches and returns the entry for a key.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        match &mut self.inner {
            CacheInner::Sieve(sieve) => sieve.remove_entry(key),
            CacheInner::S3Fifo(s3) => s3.remove_entry(key),
        }
    }

    /// Returns the number of resident entries.
    pub fn len(&self) -> usize {
        match &self.inner {
            CacheInner::Sieve(sieve) => sieve.len(),
            CacheInner::S3Fifo(s3) => s3.len(),
        }
    }

    /// Returns `true` if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum capacity.
    pub fn capacity(&self) -> usize {
        match &self.inner {
            CacheInner::Sieve(sieve) => sieve.capacity(),
            CacheInner::S3Fifo(s3) => s3.capacity(),
        }
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        match &mut self.inner {
            CacheInner::Sieve(sieve) => sieve.clear(),
            CacheInner::S3Fifo(s3) => s3.clear(),
        }
    }

    /// Returns the policy this cache was built with.
    pub fn policy(&self) -> CachePolicy {
        match &self.inner {
            CacheInner::Sieve(_) => CachePolicy::Sieve,
            CacheInner::S3Fifo(_) => CachePolicy::S3Fifo,
        }
    }
}

/// Builder for creating cache instances.
pub struct CacheBuilder {
    capacity: usize,
}

impl CacheBuilder {
    /// Creates a new cache builder with the specified capacity.
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Builds a cache with the specified policy.
    ///
    /// # Panics
    ///
    /// Panics if the configured capacity is zero.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sievekit::builder::{CacheBuilder, CachePolicy};
    ///
    /// let sieve = CacheBuilder::new(100).build::<u64, String>(CachePolicy::Sieve);
    /// assert_eq!(sieve.policy(), CachePolicy::Sieve);
    ///
    /// let s3 = CacheBuilder::new(100).build::<u64, String>(CachePolicy::S3Fifo);
    /// assert_eq!(s3.capacity(), 100);
    /// ```
    pub fn build<K, V>(self, policy: CachePolicy) -> Cache<K, V>
    where
        K: Clone + Eq + Hash,
    {
        let inner = match policy {
            CachePolicy::Sieve => CacheInner::Sieve(SieveCache::new(self.capacity)),
            CachePolicy::S3Fifo => CacheInner::S3Fifo(S3FifoCache::new(self.capacity)),
        };

        Cache { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_policies_basic_ops() {
        for policy in [CachePolicy::Sieve, CachePolicy::S3Fifo] {
            let mut cache = CacheBuilder::new(10).build::<u64, String>(policy);

            assert_eq!(cache.insert(1, "one".to_string()), None);
            assert_eq!(cache.insert(2, "two".to_string()), None);

            assert_eq!(cache.get(&1), Some(&"one".to_string()));
            assert_eq!(cache.get(&3), None);
            assert_eq!(cache.peek(&2), Some(&"two".to_string()));

            assert!(cache.contains(&1));
            assert!(!cache.contains(&99));

            assert_eq!(cache.len(), 2);
            assert!(!cache.is_empty());
            assert_eq!(cache.capacity(), 10);
            assert_eq!(cache.policy(), policy);

            assert_eq!(cache.insert(1, "ONE".to_string()), Some("one".to_string()));
            assert_eq!(cache.get(&1), Some(&"ONE".to_string()));

            assert_eq!(cache.remove_entry(&2), Some((2, "two".to_string())));
            assert_eq!(cache.remove(&2), None);

            cache.clear();
            assert!(cache.is_empty());
        }
    }

    #[test]
    fn capacity_enforced_for_both_policies() {
        for policy in [CachePolicy::Sieve, CachePolicy::S3Fifo] {
            let mut cache = CacheBuilder::new(2).build::<u64, u64>(policy);

            cache.insert(1, 10);
            cache.insert(2, 20);
            cache.insert(3, 30);

            assert_eq!(cache.len(), 2, "policy {:?}", policy);
            assert!(cache.contains(&3));
        }
    }
}
