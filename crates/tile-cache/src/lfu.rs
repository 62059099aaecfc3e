//! Constant-time least-frequently-used map.
//!
//! Entries are grouped into buckets by access count. Each bucket keeps its
//! keys in recency order, so eviction removes the least recently used key
//! among those with the lowest count.

use std::collections::HashMap;
use std::hash::Hash;

use lru::LruCache;

struct Entry<V> {
    value: V,
    freq: u64,
}

/// Fixed-capacity map with LFU eviction and O(1) average operations.
pub struct LfuCache<K: Hash + Eq + Clone, V> {
    capacity: usize,
    entries: HashMap<K, Entry<V>>,
    buckets: HashMap<u64, LruCache<K, ()>>,
    min_freq: u64,
}

impl<K: Hash + Eq + Clone, V> LfuCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity.min(1 << 16)),
            buckets: HashMap::new(),
            min_freq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up a value and count the access.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.entries.get(key).map(|e| &e.value)
    }

    /// Look up a value without counting the access.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Insert or replace a value.
    ///
    /// Returns the entry evicted to make room, if any. With zero capacity
    /// nothing is stored and the new entry itself is returned.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            self.touch(&key);
            return None;
        }

        if self.capacity == 0 {
            return Some((key, value));
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict()
        } else {
            None
        };

        self.entries.insert(key.clone(), Entry { value, freq: 1 });
        self.buckets
            .entry(1)
            .or_insert_with(LruCache::unbounded)
            .put(key, ());
        self.min_freq = 1;

        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.unlink(key, entry.freq);
        Some(entry.value)
    }

    fn touch(&mut self, key: &K) {
        let freq = match self.entries.get_mut(key) {
            Some(entry) => {
                entry.freq += 1;
                entry.freq - 1
            }
            None => return,
        };

        self.unlink(key, freq);
        if self.min_freq == freq && !self.buckets.contains_key(&freq) {
            self.min_freq = freq + 1;
        }
        self.buckets
            .entry(freq + 1)
            .or_insert_with(LruCache::unbounded)
            .put(key.clone(), ());
    }

    fn unlink(&mut self, key: &K, freq: u64) {
        if let Some(bucket) = self.buckets.get_mut(&freq) {
            bucket.pop(key);
            if bucket.is_empty() {
                self.buckets.remove(&freq);
            }
        }
    }

    fn evict(&mut self) -> Option<(K, V)> {
        let bucket = self.buckets.get_mut(&self.min_freq)?;
        let (key, _) = bucket.pop_lru()?;
        if bucket.is_empty() {
            self.buckets.remove(&self.min_freq);
        }
        let entry = self.entries.remove(&key)?;
        Some((key, entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_one_evicts_previous() {
        let mut cache = LfuCache::new(1);
        assert!(cache.insert("a", 1).is_none());
        assert_eq!(cache.insert("b", 2), Some(("a", 1)));
        assert!(cache.get(&"a").is_none());
        assert_eq!(cache.get(&"b"), Some(&2));
    }

    #[test]
    fn test_evicts_least_frequent() {
        let mut cache = LfuCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");
        cache.get(&"a");
        let evicted = cache.insert("c", 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert!(cache.contains(&"a"));
        assert!(cache.contains(&"c"));
    }

    #[test]
    fn test_ties_broken_by_recency() {
        let mut cache = LfuCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");
        cache.get(&"b");
        // Both at frequency 2, "a" touched least recently.
        assert_eq!(cache.insert("c", 3), Some(("a", 1)));
    }

    #[test]
    fn test_replace_keeps_single_entry() {
        let mut cache = LfuCache::new(2);
        cache.insert("a", 1);
        cache.insert("a", 5);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&"a"), Some(&5));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = LfuCache::new(0);
        assert_eq!(cache.insert("a", 1), Some(("a", 1)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut cache = LfuCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.remove(&"a"), Some(1));
        cache.insert("c", 3);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&"b"));
    }
}
