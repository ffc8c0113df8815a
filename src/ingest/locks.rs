use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries whose lock is no longer held are pruned once the map grows past this.
const PRUNE_THRESHOLD: usize = 1024;

/// Per-key async mutual exclusion.
///
/// Writers of the same key queue behind each other, writers of different keys
/// proceed in parallel. The map only holds weak references, so a key's mutex
/// disappears once nobody holds or waits on it.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<String, Weak<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = map.get(key).and_then(Weak::upgrade) {
            return existing;
        }

        if map.len() >= PRUNE_THRESHOLD {
            map.retain(|_, weak| weak.strong_count() > 0);
        }

        let mutex = Arc::new(AsyncMutex::new(()));
        map.insert(key.to_string(), Arc::downgrade(&mutex));
        mutex
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.mutex_for(key).lock_owned().await
    }

    /// Locks every distinct key in sorted order.
    /// Callers that always go through here cannot deadlock on each other.
    pub async fn lock_all<'a, I>(&self, keys: I) -> Vec<OwnedMutexGuard<()>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut keys: Vec<&str> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of keys currently tracked, including stale ones not yet pruned.
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
