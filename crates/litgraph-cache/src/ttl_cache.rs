use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::{CacheEntry, CacheStats, Clock};

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    stats: CacheStats,
}

/// Time-bounded cache. Expired entries read as misses and are dropped lazily
/// or by [`TtlCache::purge_expired`].
pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let expired = match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now);
                let value = entry.value.clone();
                inner.stats.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
            inner.stats.expirations += 1;
            inner.stats.entries = inner.entries.len();
        }
        inner.stats.misses += 1;
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let expires_at = self.expiry_from(now);
        let mut inner = self.inner.lock();
        inner
            .entries
            .insert(key, CacheEntry::new(value, now, Some(expires_at)));
        inner.stats.entries = inner.entries.len();
    }

    /// Expiry instant of a live entry.
    pub fn expires_at(&self, key: &K) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.inner
            .lock()
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
    }

    pub fn invalidate(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(key).is_some();
        if removed {
            inner.stats.invalidations += 1;
            inner.stats.entries = inner.entries.len();
        }
        removed
    }

    /// Remove every entry whose key matches; returns how many were dropped.
    pub fn invalidate_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, _| !predicate(k));
        let removed = before - inner.entries.len();
        inner.stats.invalidations += removed as u64;
        inner.stats.entries = inner.entries.len();
        removed
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(removed, "purged expired cache entries");
        }
        inner.stats.expirations += removed as u64;
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
