//! Registry of in-flight calls, used for deduplication.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use futures_util::future::{BoxFuture, Shared};

use super::CacheKey;
use crate::error::CallResult;

/// A call's result future, cloneable so every interested caller can await it.
pub type SharedCall<V> = Shared<BoxFuture<'static, CallResult<V>>>;

struct Entry<V> {
    id: u64,
    call: SharedCall<V>,
}

/// At most one in-flight call per [`CacheKey`].
///
/// Each registration gets an id, so a finished call only removes its own
/// entry and never one registered later under the same key.
pub struct PendingRegistry<V> {
    calls: Mutex<HashMap<CacheKey, Entry<V>>>,
    next_id: AtomicU64,
}

impl<V> Default for PendingRegistry<V> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<V: Clone> PendingRegistry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry<V>>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The in-flight call for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<SharedCall<V>> {
        self.lock().get(key).map(|entry| entry.call.clone())
    }

    /// Return the in-flight call for `key`, registering `make()` if there is none.
    ///
    /// `make` receives the id of the new registration, to be passed back to
    /// [`remove_if`](Self::remove_if) when the call ends. The boolean is
    /// `true` when `make` ran and its call was registered. The check and the
    /// insert happen under one lock, so two callers can never both register.
    pub fn get_or_register<F>(&self, key: CacheKey, make: F) -> (SharedCall<V>, bool)
    where
        F: FnOnce(u64) -> SharedCall<V>,
    {
        let mut calls = self.lock();
        if let Some(existing) = calls.get(&key) {
            return (existing.call.clone(), false);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let call = make(id);
        calls.insert(
            key,
            Entry {
                id,
                call: call.clone(),
            },
        );
        (call, true)
    }

    /// Remove the entry for `key` if it is still registration `id`.
    pub fn remove_if(&self, key: &CacheKey, id: u64) -> bool {
        let mut calls = self.lock();
        if calls.get(key).is_some_and(|entry| entry.id == id) {
            calls.remove(key);
            return true;
        }
        false
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
