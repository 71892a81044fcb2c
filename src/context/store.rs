//! Per-user context store.
//! Bounded LRU keyed by user id with a TTL, so one user's dialogue context
//! never leaks into another's.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use super::ContextSnapshot;

/// Session store injected into the orchestrator.
pub trait ContextStore: Send + Sync {
    /// Snapshot for `user_id`, or the empty snapshot.
    fn load(&self, user_id: &str) -> ContextSnapshot;
    fn save(&self, user_id: &str, snapshot: ContextSnapshot);
    fn clear(&self, user_id: &str);
}

struct StoreEntry {
    snapshot: ContextSnapshot,
    inserted_at: Instant,
}

pub struct InMemoryContextStore {
    inner: Mutex<LruCache<String, StoreEntry>>,
    ttl: Duration,
}

impl InMemoryContextStore {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }
}

impl Default for InMemoryContextStore {
    /// 1024 users, one hour.
    fn default() -> Self {
        Self::new(1024, Duration::from_secs(3600))
    }
}

impl ContextStore for InMemoryContextStore {
    fn load(&self, user_id: &str) -> ContextSnapshot {
        let mut cache = self.inner.lock();
        if let Some(entry) = cache.get(user_id) {
            if entry.inserted_at.elapsed() < self.ttl {
                return entry.snapshot.clone();
            }
            cache.pop(user_id);
        }
        ContextSnapshot::default()
    }

    fn save(&self, user_id: &str, snapshot: ContextSnapshot) {
        self.inner.lock().put(
            user_id.to_string(),
            StoreEntry {
                snapshot,
                inserted_at: Instant::now(),
            },
        );
    }

    fn clear(&self, user_id: &str) {
        self.inner.lock().pop(user_id);
    }
}
