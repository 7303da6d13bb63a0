//! In-memory TTL cache with capacity-bounded eviction.
//!
//! Shared by the fetch cache, the robots cache, and the resource store
//! idiom: entries expire on read, and inserts past capacity first drop
//! expired entries, then the entries closest to expiry.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A concurrent map from `K` to `V` where every entry carries a deadline.
///
/// Values are returned by clone, which for byte-carrying values doubles as
/// the deep-copy the fetch cache requires.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Look up an unexpired entry, cloning the value.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone())
    }

    /// Insert an entry. Returns `true` when the key was not already present
    /// (expired entries count as absent).
    pub fn insert(&self, key: K, value: V, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let fresh = entries
            .get(&key)
            .is_none_or(|existing| existing.expires_at <= now);

        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );

        if entries.len() > self.capacity {
            entries.retain(|_, e| e.expires_at > now);
        }
        while entries.len() > self.capacity {
            let Some(victim) = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            entries.remove(&victim);
        }

        fresh
    }

    pub fn remove(&self, key: &K) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(key);
    }

    /// Drop expired entries and return the live count.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.retain(|_, e| e.expires_at > now);
        entries.len()
    }

    /// Snapshot of live entries, unordered.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    pub fn clear(&self) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.clear();
    }
}
