//! In-memory key/value cache with per-entry time-to-live.
//!
//! Times are epoch milliseconds supplied by the caller, so expiry follows the
//! same [`Clock`](crate::timer::Clock) as the rest of the engine.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: u64,
    ttl_ms: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.inserted_at) >= self.ttl_ms
    }
}

#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn insert(&mut self, key: K, value: V, ttl_ms: u64, now_ms: u64) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now_ms,
                ttl_ms,
            },
        );
    }

    /// Live value for `key`. An expired entry is dropped and reads as absent.
    pub fn get(&mut self, key: &K, now_ms: u64) -> Option<&V> {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(now_ms))
        {
            self.entries.remove(key);
        }
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now_ms));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
