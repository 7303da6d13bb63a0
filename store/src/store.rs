//! The packet store.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use quarry_fetch::cache::TtlCache;
use quarry_types::Packet;

/// Default capacity of the store.
pub const DEFAULT_CAPACITY: usize = 100;

/// Observer for list-changed notifications. The single method is
/// synchronous; implementations needing async delivery should enqueue.
pub trait ListObserver: Send + Sync {
    fn list_changed(&self);
}

/// In-process TTL store keyed by `source_id`.
pub struct ResourceStore {
    entries: TtlCache<String, Packet>,
    ttl: Duration,
    observer: RwLock<Option<Arc<dyn ListObserver>>>,
}

impl ResourceStore {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: TtlCache::new(capacity.max(1)),
            ttl,
            observer: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn with_defaults(ttl: Duration) -> Self {
        Self::new(DEFAULT_CAPACITY, ttl)
    }

    /// Register the list-changed observer, replacing any previous one.
    pub fn set_observer(&self, observer: Arc<dyn ListObserver>) {
        let mut slot = self
            .observer
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(observer);
    }

    /// Store a packet under its source id. Returns whether the entry is
    /// new; new entries fire the list-changed notification.
    pub fn set(&self, packet: &Packet) -> bool {
        let fresh = self
            .entries
            .insert(packet.source_id.clone(), packet.clone(), self.ttl);
        if fresh {
            self.notify();
        }
        fresh
    }

    #[must_use]
    pub fn get(&self, source_id: &str) -> Option<Packet> {
        self.entries.get(&source_id.to_string())
    }

    /// Live packets, newest `retrieved_at` first, ties broken by
    /// `source_id` ascending. Expired entries are pruned on the way.
    #[must_use]
    pub fn list(&self) -> Vec<Packet> {
        self.entries.prune();
        let mut packets: Vec<Packet> = self
            .entries
            .snapshot()
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        packets.sort_by(|a, b| {
            b.retrieved_at
                .cmp(&a.retrieved_at)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        packets
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Best-effort notification; a panicking observer is logged, never
    /// propagated.
    fn notify(&self) {
        let observer = {
            let slot = self
                .observer
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            slot.clone()
        };
        if let Some(observer) = observer {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                observer.list_changed();
            }));
            if result.is_err() {
                tracing::warn!("resource store observer panicked during list_changed");
            }
        }
    }
}
