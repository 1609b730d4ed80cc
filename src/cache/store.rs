//! Bounded TTL response cache.
//!
//! Entries carry their own ttl and are purged lazily when a lookup finds
//! them expired. When full, inserting a new key evicts the entry that was
//! inserted first. Lookups do not refresh an entry's position, and
//! overwriting an existing key keeps its original position.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use super::CacheKey;
use crate::telemetry;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

#[derive(Debug)]
struct StoreInner<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    // Insertion order; may briefly contain keys already removed from
    // `entries`, which eviction skips.
    order: VecDeque<CacheKey>,
}

/// In-memory cache of successful responses.
#[derive(Debug)]
pub struct CacheStore<V> {
    inner: Mutex<StoreInner<V>>,
    max_entries: usize,
}

impl<V: Clone> CacheStore<V> {
    /// Create a store holding at most `max_entries` values (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a fresh value, removing the entry if it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();
        let fresh = inner.entries.get(key).map(|entry| entry.is_fresh(now))?;
        if fresh {
            return inner.entries.get(key).map(|entry| entry.value.clone());
        }
        inner.entries.remove(key);
        inner.order.retain(|k| k != key);
        None
    }

    /// Store a value valid for `ttl` from now.
    pub fn insert(&self, key: CacheKey, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            ttl,
        };
        let mut inner = self.lock();
        if let Some(existing) = inner.entries.get_mut(&key) {
            *existing = entry;
            return;
        }
        while inner.entries.len() >= self.max_entries {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if inner.entries.remove(&oldest).is_some() {
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
            }
        }
        inner.entries.insert(key, entry);
        inner.order.push_back(key);
    }

    pub fn remove(&self, key: &CacheKey) -> Option<V> {
        let mut inner = self.lock();
        let removed = inner.entries.remove(key)?;
        inner.order.retain(|k| k != key);
        Some(removed.value)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Number of stored entries, expired ones included until looked up.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }
}
