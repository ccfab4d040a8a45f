//! Adaptive-replacement document cache
//!
//! Parsing a document on every request would make the store's latency a
//! function of file size, so parsed documents are kept in a bounded cache.
//! The replacement policy is ARC: two resident lists balance recency (T1)
//! and frequency (T2), two ghost lists (B1, B2) remember recently evicted
//! keys, and hits on the ghosts adapt the balance target. The cache is
//! strictly a read-through accelerator; its absence would not change
//! correctness.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics for monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: AtomicU64,
    /// Number of cache misses
    pub misses: AtomicU64,
    /// Number of entries evicted
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}

/// A bounded cache with adaptive balance between recency and frequency.
pub struct ArcCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    stats: CacheStats,
}

struct Inner<K, V> {
    capacity: usize,
    /// Adaptive target size for the recency list T1.
    p: usize,
    /// Resident, seen once recently. Front is least recent.
    t1: VecDeque<K>,
    /// Resident, seen at least twice recently.
    t2: VecDeque<K>,
    /// Ghosts of keys evicted from T1.
    b1: VecDeque<K>,
    /// Ghosts of keys evicted from T2.
    b2: VecDeque<K>,
    values: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V: Clone> ArcCache<K, V> {
    /// Create a cache holding at most `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                capacity,
                p: 0,
                t1: VecDeque::new(),
                t2: VecDeque::new(),
                b1: VecDeque::new(),
                b2: VecDeque::new(),
                values: HashMap::new(),
            }),
            stats: CacheStats::default(),
        }
    }

    /// Look up a key, promoting it to the frequency list on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        if remove_key(&mut inner.t1, key) || remove_key(&mut inner.t2, key) {
            inner.t2.push_back(key.clone());
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return inner.values.get(key).cloned();
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a value, evicting per the ARC policy if at capacity.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        if inner.capacity == 0 {
            return;
        }

        // already resident: refresh the value, promote to T2
        if inner.values.contains_key(&key) {
            remove_key(&mut inner.t1, &key);
            remove_key(&mut inner.t2, &key);
            inner.t2.push_back(key.clone());
            inner.values.insert(key, value);
            return;
        }

        if inner.b1.contains(&key) {
            // recency ghost hit: grow the recency target
            let delta = (inner.b2.len() / inner.b1.len()).max(1);
            inner.p = (inner.p + delta).min(inner.capacity);
            self.replace(&mut inner, &key);
            remove_key(&mut inner.b1, &key);
            inner.t2.push_back(key.clone());
            inner.values.insert(key, value);
            return;
        }

        if inner.b2.contains(&key) {
            // frequency ghost hit: shrink the recency target
            let delta = (inner.b1.len() / inner.b2.len()).max(1);
            inner.p = inner.p.saturating_sub(delta);
            self.replace(&mut inner, &key);
            remove_key(&mut inner.b2, &key);
            inner.t2.push_back(key.clone());
            inner.values.insert(key, value);
            return;
        }

        // brand new key
        let l1 = inner.t1.len() + inner.b1.len();
        if l1 == inner.capacity {
            if inner.t1.len() < inner.capacity {
                inner.b1.pop_front();
                self.replace(&mut inner, &key);
            } else if let Some(old) = inner.t1.pop_front() {
                inner.values.remove(&old);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            let total = l1 + inner.t2.len() + inner.b2.len();
            if total >= inner.capacity {
                if total == 2 * inner.capacity {
                    inner.b2.pop_front();
                }
                self.replace(&mut inner, &key);
            }
        }
        inner.t1.push_back(key.clone());
        inner.values.insert(key, value);
    }

    /// Remove a key from residency and the ghost lists.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        remove_key(&mut inner.t1, key);
        remove_key(&mut inner.t2, key);
        remove_key(&mut inner.b1, key);
        remove_key(&mut inner.b2, key);
        inner.values.remove(key)
    }

    /// Check if a key is resident
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().values.contains_key(key)
    }

    /// The number of resident entries
    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    /// Check if the cache holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Demote one resident entry to a ghost, choosing the list per the
    /// adaptive target.
    fn replace(&self, inner: &mut Inner<K, V>, incoming: &K) {
        let from_t1 = !inner.t1.is_empty()
            && (inner.t1.len() > inner.p
                || (inner.t1.len() == inner.p && inner.b2.contains(incoming)));
        if from_t1 {
            if let Some(old) = inner.t1.pop_front() {
                inner.values.remove(&old);
                inner.b1.push_back(old);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        } else if let Some(old) = inner.t2.pop_front() {
            inner.values.remove(&old);
            inner.b2.push_back(old);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[cfg(test)]
    fn recency_target(&self) -> usize {
        self.inner.lock().p
    }
}

fn remove_key<K: Eq>(list: &mut VecDeque<K>, key: &K) -> bool {
    if let Some(pos) = list.iter().position(|k| k == key) {
        list.remove(pos);
        true
    } else {
        false
    }
}
