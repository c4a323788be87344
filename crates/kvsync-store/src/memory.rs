//! In-memory KV store.

use crate::stamp::WriteStamp;
use async_trait::async_trait;
use kvsync_core::effects::{KvEntry, KvStore};
use kvsync_core::SyncResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Volatile KV store with tombstone semantics.
///
/// Used by tests and by sites that accept losing local state on restart.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, KvEntry>>,
    stamp: WriteStamp,
}

impl MemoryKvStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry verbatim, bypassing write stamping.
    ///
    /// Lets callers seed entries with chosen write timestamps.
    pub fn insert_entry(&self, key: impl Into<String>, entry: KvEntry) {
        self.stamp.observe(entry.write_ts);
        self.entries.write().insert(key.into(), entry);
    }

    /// Copy of every entry, keyed and sorted by key
    pub fn snapshot(&self) -> BTreeMap<String, KvEntry> {
        self.entries.read().clone()
    }

    /// Live value as text, `None` for absent or tombstoned keys
    pub fn value_of(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .get(key)
            .filter(|e| !e.tombstone)
            .and_then(KvEntry::value_lossy)
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn put(&self, key: &str, value: &[u8]) -> SyncResult<()> {
        let entry = KvEntry::live(value.to_vec(), self.stamp.next());
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> SyncResult<Option<KvEntry>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        let entry = KvEntry::tombstone(self.stamp.next());
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn keys(&self) -> SyncResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
