//! Per-key async mutexes.
//!
//! Mutations of one workflow are serialised in-process by locking its id; mutations of
//! different workflows proceed in parallel. Keys hash onto a fixed set of shards so
//! unrelated keys rarely contend on the registry itself.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

const DEFAULT_SHARDS: usize = 16;

type Shard = Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

/// Held for the duration of one mutation; releases the key on drop.
pub struct KeyGuard {
    key: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    pub fn key(&self) -> Uuid {
        self.key
    }
}

#[derive(Clone)]
pub struct KeyedLocks {
    shards: Vec<Shard>,
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shards(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count)
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self { shards }
    }

    fn shard(&self, key: &Uuid) -> &Shard {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Wait until `key` is free, then hold it until the guard is dropped.
    #[tracing::instrument(skip(self), level = "trace")]
    pub async fn lock(&self, key: Uuid) -> KeyGuard {
        let entry = {
            let mut entries = self.shard(&key).lock().await;
            // Entries nobody else references are idle; drop them so the map stays small
            entries.retain(|k, m| *k == key || Arc::strong_count(m) > 1);
            entries
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = entry.lock_owned().await;
        KeyGuard { key, _guard: guard }
    }

    /// Number of keys currently tracked (held or awaited, plus idle ones not yet pruned).
    pub async fn tracked_keys(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().await.len();
        }
        total
    }
}
