use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::{CacheEntry, CacheStats, Clock};

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    stats: CacheStats,
}

/// Capacity-bounded cache evicting the least-recently-accessed key.
///
/// Every read that hits promotes the key. All mutation goes through one lock
/// so eviction always sees the whole cache.
pub struct BoundedLruCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: NonZeroUsize,
    clock: Arc<dyn Clock>,
}

impl<K, V> BoundedLruCache<K, V>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            capacity,
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Get a value and refresh its recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(now);
                let value = entry.value.clone();
                inner.stats.hits += 1;
                Some(value)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Full entry without touching recency or stats.
    pub fn peek_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        self.inner.lock().entries.peek(key).cloned()
    }

    /// Insert or replace; returns the key evicted to make room, if any.
    pub fn insert(&self, key: K, value: V) -> Option<K> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let evicted = match inner.entries.push(key.clone(), CacheEntry::new(value, now, None)) {
            Some((old_key, _)) if old_key != key => Some(old_key),
            _ => None,
        };
        if let Some(old_key) = &evicted {
            inner.stats.evictions += 1;
            debug!(evicted = ?old_key, inserted = ?key, "lru capacity reached, evicted entry");
        }
        inner.stats.entries = inner.entries.len();
        evicted
    }

    pub fn invalidate(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.pop(key).is_some();
        if removed {
            inner.stats.invalidations += 1;
        }
        inner.stats.entries = inner.entries.len();
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }
}
