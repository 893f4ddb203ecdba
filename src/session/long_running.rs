//! Duplicate-submission guard for long-running requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::observability::metrics;

/// Identifies one client's request slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LongRunningKey {
    pub user: String,
    pub remote_host: String,
    pub remote_port: u16,
}

impl LongRunningKey {
    pub fn new(user: impl Into<String>, remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            user: user.into(),
            remote_host: remote_host.into(),
            remote_port,
        }
    }
}

/// Process-wide set of in-flight long-running requests.
///
/// Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct LongRunningRegistry {
    inner: Arc<DashMap<LongRunningKey, Instant>>,
}

impl LongRunningRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if a request with the same key is already in flight.
    pub fn register(&self, key: LongRunningKey) -> bool {
        match self.inner.entry(key) {
            Entry::Occupied(entry) => {
                tracing::debug!(
                    user = %entry.key().user,
                    remote_host = %entry.key().remote_host,
                    remote_port = entry.key().remote_port,
                    in_flight_for = ?entry.get().elapsed(),
                    "Duplicate long-running request rejected"
                );
                metrics::record_long_running_rejected();
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                true
            }
        }
    }

    /// Returns false if the key was not registered.
    pub fn deregister(&self, key: &LongRunningKey) -> bool {
        self.inner.remove(key).is_some()
    }

    /// Register and hand back a guard that deregisters on drop, so error
    /// paths release the slot too.
    pub fn try_acquire(&self, key: LongRunningKey) -> Option<LongRunningGuard> {
        self.register(key.clone()).then(|| LongRunningGuard {
            registry: self.clone(),
            key,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.inner.len()
    }

    /// How long the request under `key` has been running, if registered.
    pub fn running_for(&self, key: &LongRunningKey) -> Option<Duration> {
        self.inner.get(key).map(|started| started.elapsed())
    }
}

/// Holds one registration for its lifetime.
#[derive(Debug)]
pub struct LongRunningGuard {
    registry: LongRunningRegistry,
    key: LongRunningKey,
}

impl LongRunningGuard {
    pub fn key(&self) -> &LongRunningKey {
        &self.key
    }
}

impl Drop for LongRunningGuard {
    fn drop(&mut self) {
        self.registry.deregister(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> LongRunningKey {
        LongRunningKey::new("alice", "10.0.0.7", 51234)
    }

    #[test]
    fn duplicate_register_is_rejected_until_deregistered() {
        let registry = LongRunningRegistry::new();
        assert!(registry.register(key()));
        assert!(!registry.register(key()));
        assert!(registry.deregister(&key()));
        assert!(!registry.deregister(&key()));
        assert!(registry.register(key()));
    }

    #[test]
    fn keys_differ_by_port() {
        let registry = LongRunningRegistry::new();
        assert!(registry.register(key()));
        assert!(registry.register(LongRunningKey::new("alice", "10.0.0.7", 51235)));
        assert_eq!(registry.in_flight(), 2);
    }

    #[test]
    fn guard_releases_on_drop() {
        let registry = LongRunningRegistry::new();
        let guard = registry.try_acquire(key()).unwrap();
        assert!(registry.try_acquire(key()).is_none());
        assert!(registry.running_for(guard.key()).is_some());
        drop(guard);
        assert_eq!(registry.in_flight(), 0);
        assert!(registry.try_acquire(key()).is_some());
    }

    #[test]
    fn concurrent_registration_admits_exactly_one() {
        let registry = LongRunningRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register(key()))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
