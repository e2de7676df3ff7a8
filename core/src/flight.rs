//! Single-flight keys.
//!
//! A key is held for as long as its [`FlightGuard`] lives. A second attempt
//! on a held key is refused immediately instead of queueing, so a
//! double-clicked command cannot reach the ledger twice.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct SingleFlight<K> {
    held: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> SingleFlight<K> {
    pub fn new() -> Self {
        Self {
            held: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Hold `key`, or `None` if it is already held.
    pub fn try_begin(&self, key: K) -> Option<FlightGuard<K>> {
        if !lock(&self.held).insert(key.clone()) {
            return None;
        }
        Some(FlightGuard {
            key,
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        lock(&self.held).contains(key)
    }
}

impl<K: Eq + Hash + Clone> Default for SingleFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases its key on drop, including when the owning future is dropped
/// mid-await.
pub struct FlightGuard<K: Eq + Hash> {
    key: K,
    held: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash> FlightGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for FlightGuard<K> {
    fn drop(&mut self) {
        lock(&self.held).remove(&self.key);
    }
}

fn lock<K>(set: &Mutex<HashSet<K>>) -> MutexGuard<'_, HashSet<K>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}
