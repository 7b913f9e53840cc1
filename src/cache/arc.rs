//! Adaptive replacement cache.
//!
//! Four lists: `t1` holds entries seen once recently, `t2` entries seen at
//! least twice, `b1`/`b2` are ghost lists remembering keys recently evicted
//! from `t1`/`t2`. Hits in a ghost list shift the target size `p` of `t1`,
//! so the cache adapts between recency and frequency. A one-off scan only
//! ever touches `t1` and cannot flush the frequently used entries in `t2`.
//!
//! The structure is not thread-safe; callers wrap it in a lock.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Recency-ordered key list with O(log n) removal of arbitrary keys.
#[derive(Debug)]
struct LruList<K> {
    ticks: HashMap<K, u64>,
    order: BTreeMap<u64, K>,
    next_tick: u64,
}

impl<K: Eq + Hash + Clone> LruList<K> {
    fn new() -> Self {
        Self { ticks: HashMap::new(), order: BTreeMap::new(), next_tick: 0 }
    }

    fn len(&self) -> usize {
        self.ticks.len()
    }

    fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    fn contains(&self, key: &K) -> bool {
        self.ticks.contains_key(key)
    }

    /// Insert (or move) `key` to the most-recently-used position.
    fn push_mru(&mut self, key: K) {
        self.remove(&key);
        let tick = self.next_tick;
        self.next_tick += 1;
        self.order.insert(tick, key.clone());
        self.ticks.insert(key, tick);
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.ticks.remove(key) {
            Some(tick) => {
                self.order.remove(&tick);
                true
            }
            None => false,
        }
    }

    fn pop_lru(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }
}

/// Fixed-capacity adaptive replacement cache.
#[derive(Debug)]
pub struct ArcCache<K, V> {
    capacity: usize,
    /// Target size of `t1`.
    p: usize,
    t1: LruList<K>,
    t2: LruList<K>,
    b1: LruList<K>,
    b2: LruList<K>,
    values: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V> ArcCache<K, V> {
    /// Create a cache holding at most `capacity` live entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            p: 0,
            t1: LruList::new(),
            t2: LruList::new(),
            b1: LruList::new(),
            b2: LruList::new(),
            values: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.t1.len() + self.t2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check for a live entry without touching recency or frequency.
    pub fn contains(&self, key: &K) -> bool {
        self.values.contains_key(key)
    }

    /// Look up `key`, promoting it to the frequency list on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.t1.remove(key) {
            self.t2.push_mru(key.clone());
        } else if self.t2.contains(key) {
            self.t2.push_mru(key.clone());
        } else {
            return None;
        }
        self.values.get(key)
    }

    /// Insert or update `key`.
    pub fn put(&mut self, key: K, value: V) {
        // Live entry: a second touch moves it to the frequency list.
        if self.t1.remove(&key) || self.t2.contains(&key) {
            self.t2.push_mru(key.clone());
            self.values.insert(key, value);
            return;
        }

        // Ghost hit in b1: recency was undervalued, grow t1's target.
        if self.b1.contains(&key) {
            let delta = if self.b1.len() >= self.b2.len() {
                1
            } else {
                self.b2.len() / self.b1.len()
            };
            self.p = (self.p + delta).min(self.capacity);
            if self.len() >= self.capacity {
                self.replace(false);
            }
            self.b1.remove(&key);
            self.t2.push_mru(key.clone());
            self.values.insert(key, value);
            return;
        }

        // Ghost hit in b2: frequency was undervalued, shrink t1's target.
        if self.b2.contains(&key) {
            let delta = if self.b2.len() >= self.b1.len() {
                1
            } else {
                self.b1.len() / self.b2.len()
            };
            self.p = self.p.saturating_sub(delta);
            if self.len() >= self.capacity {
                self.replace(true);
            }
            self.b2.remove(&key);
            self.t2.push_mru(key.clone());
            self.values.insert(key, value);
            return;
        }

        // Brand new key.
        if self.len() >= self.capacity {
            self.replace(false);
        }
        if self.b1.len() > self.capacity - self.p {
            self.b1.pop_lru();
        }
        if self.b2.len() > self.p {
            self.b2.pop_lru();
        }
        self.t1.push_mru(key.clone());
        self.values.insert(key, value);
    }

    /// Drop a live entry and any ghost of it.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.t1.remove(key);
        self.t2.remove(key);
        self.b1.remove(key);
        self.b2.remove(key);
        self.values.remove(key)
    }

    /// Evict one live entry into the matching ghost list.
    fn replace(&mut self, in_b2: bool) {
        let t1_len = self.t1.len();
        let from_t1 = !self.t1.is_empty()
            && (t1_len > self.p || (t1_len == self.p && in_b2) || self.t2.is_empty());
        if from_t1 {
            if let Some(evicted) = self.t1.pop_lru() {
                self.values.remove(&evicted);
                self.b1.push_mru(evicted);
            }
        } else if let Some(evicted) = self.t2.pop_lru() {
            self.values.remove(&evicted);
            self.b2.push_mru(evicted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_put_roundtrip() {
        let mut c = ArcCache::new(2);
        c.put("a", 1);
        assert_eq!(c.get(&"a"), Some(&1));
        assert_eq!(c.get(&"b"), None);
        c.put("a", 2);
        assert_eq!(c.get(&"a"), Some(&2));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut c = ArcCache::new(4);
        for i in 0..100 {
            c.put(i, i);
            if i % 3 == 0 {
                c.get(&(i / 2));
            }
            assert!(c.len() <= 4);
        }
    }

    #[test]
    fn overflow_evicts_oldest_single_use_entry() {
        let mut c = ArcCache::new(3);
        c.put(1, "one");
        c.put(2, "two");
        c.put(3, "three");
        c.put(4, "four");
        assert!(!c.contains(&1));
        assert!(c.contains(&4));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn scan_does_not_flush_frequent_entries() {
        let mut c = ArcCache::new(4);
        c.put("hot-a", 0);
        c.put("hot-b", 0);
        // second touch promotes to the frequency list
        assert!(c.get(&"hot-a").is_some());
        assert!(c.get(&"hot-b").is_some());

        for i in 0..50 {
            c.put(Box::leak(format!("scan-{i}").into_boxed_str()) as &str, i);
        }

        assert!(c.contains(&"hot-a"));
        assert!(c.contains(&"hot-b"));
    }

    #[test]
    fn ghost_hit_readmits_into_frequency_list() {
        let mut c = ArcCache::new(2);
        c.put(1, 1);
        c.put(2, 2);
        c.put(3, 3); // evicts 1 into b1
        assert!(!c.contains(&1));
        c.put(1, 10); // ghost hit
        assert_eq!(c.get(&1), Some(&10));
        assert!(c.len() <= 2);
    }

    #[test]
    fn capacity_one_still_works() {
        let mut c = ArcCache::new(1);
        c.put("a", 1);
        assert_eq!(c.get(&"a"), Some(&1));
        c.put("b", 2);
        assert_eq!(c.len(), 1);
        assert!(c.contains(&"b"));
        c.put("a", 3);
        assert_eq!(c.len(), 1);
        assert_eq!(c.get(&"a"), Some(&3));
    }

    #[test]
    fn remove_forgets_entry() {
        let mut c = ArcCache::new(2);
        c.put("a", 1);
        assert_eq!(c.remove(&"a"), Some(1));
        assert!(c.is_empty());
        assert_eq!(c.get(&"a"), None);
    }
}
