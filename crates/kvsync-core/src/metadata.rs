//! Per-key version metadata.
//!
//! Records, for every `(bucket, key)`, the version of the last operation this
//! site accepted. Conflicts are decided against this record instead of
//! re-reading the KV store. The store keeps no history and is not persisted:
//! after a restart every key starts with no incumbent.

use crate::lww;
use crate::operation::Version;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Read/write access to the per-key winner metadata.
pub trait VersionMetadataStore: Send + Sync {
    /// Version currently recorded for the key
    fn get(&self, bucket: &str, key: &str) -> Option<Version>;

    /// Record `version` for the key unconditionally
    fn set(&self, bucket: &str, key: &str, version: Version);

    /// Record `candidate` only if it beats the current incumbent.
    ///
    /// Returns true when the record changed. The compare and the write happen
    /// under one lock.
    fn set_if_newer(&self, bucket: &str, key: &str, candidate: Version) -> bool;

    /// Snapshot of every recorded version in a bucket
    fn all(&self, bucket: &str) -> HashMap<String, Version>;
}

/// In-memory metadata store.
///
/// Structure: `data[bucket][key] = Version`.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    data: RwLock<HashMap<String, HashMap<String, Version>>>,
}

impl InMemoryMetadataStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys recorded across all buckets
    pub fn len(&self) -> usize {
        self.data.read().values().map(HashMap::len).sum()
    }

    /// Whether no key has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VersionMetadataStore for InMemoryMetadataStore {
    fn get(&self, bucket: &str, key: &str) -> Option<Version> {
        self.data
            .read()
            .get(bucket)
            .and_then(|keys| keys.get(key))
            .cloned()
    }

    fn set(&self, bucket: &str, key: &str, version: Version) {
        self.data
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), version);
    }

    fn set_if_newer(&self, bucket: &str, key: &str, candidate: Version) -> bool {
        let mut data = self.data.write();
        let keys = data.entry(bucket.to_string()).or_default();
        if !lww::wins(&candidate, keys.get(key)) {
            return false;
        }
        keys.insert(key.to_string(), candidate);
        true
    }

    fn all(&self, bucket: &str) -> HashMap<String, Version> {
        self.data.read().get(bucket).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::NodeId;

    fn v(ts: u64, node: &str) -> Version {
        Version::new(ts, NodeId::from(node), false)
    }

    #[test]
    fn unknown_key_has_no_version() {
        let store = InMemoryMetadataStore::new();
        assert!(store.get("config", "missing").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn set_overwrites_and_buckets_are_isolated() {
        let store = InMemoryMetadataStore::new();
        store.set("config", "k", v(1, "a"));
        store.set("config", "k", v(2, "a"));
        store.set("other", "k", v(9, "b"));

        assert_eq!(store.get("config", "k"), Some(v(2, "a")));
        assert_eq!(store.get("other", "k"), Some(v(9, "b")));
        assert_eq!(store.all("config").len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn set_if_newer_keeps_winner() {
        let store = InMemoryMetadataStore::new();
        assert!(store.set_if_newer("config", "k", v(5, "a")));
        assert!(!store.set_if_newer("config", "k", v(4, "z")));
        assert!(!store.set_if_newer("config", "k", v(5, "a")));
        assert!(store.set_if_newer("config", "k", v(5, "b")));
        assert_eq!(store.get("config", "k"), Some(v(5, "b")));
    }
}
