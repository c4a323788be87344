//! Key-value store effect.
//!
//! The store is a log-backed collaborator: deletes write tombstones instead of
//! removing keys, so `keys()` still lists deleted keys and reconciliation can
//! propagate deletions.

use crate::clock::Timestamp;
use crate::errors::SyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Latest record stored under a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    /// Stored bytes; `None` for tombstones
    pub value: Option<Vec<u8>>,
    /// True if the latest record is a delete
    pub tombstone: bool,
    /// Time the record was written, in milliseconds
    pub write_ts: Timestamp,
}

impl KvEntry {
    /// Entry holding a value
    pub fn live(value: impl Into<Vec<u8>>, write_ts: Timestamp) -> Self {
        Self {
            value: Some(value.into()),
            tombstone: false,
            write_ts,
        }
    }

    /// Tombstone entry
    pub fn tombstone(write_ts: Timestamp) -> Self {
        Self {
            value: None,
            tombstone: true,
            write_ts,
        }
    }

    /// Whether two entries hold the same content, ignoring write time.
    pub fn same_content(&self, other: &KvEntry) -> bool {
        self.tombstone == other.tombstone && self.value == other.value
    }

    /// Value as UTF-8 text, lossy
    pub fn value_lossy(&self) -> Option<String> {
        self.value
            .as_deref()
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }
}

/// Storage effects for one bucket.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Write a value
    async fn put(&self, key: &str, value: &[u8]) -> SyncResult<()>;

    /// Latest entry for a key, tombstones included
    async fn get(&self, key: &str) -> SyncResult<Option<KvEntry>>;

    /// Write a tombstone
    async fn delete(&self, key: &str) -> SyncResult<()>;

    /// Every known key, tombstoned ones included
    async fn keys(&self) -> SyncResult<Vec<String>>;

    /// Release underlying resources
    async fn close(&self) -> SyncResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_ignores_write_time() {
        assert!(KvEntry::live("x", 1).same_content(&KvEntry::live("x", 9)));
        assert!(KvEntry::tombstone(1).same_content(&KvEntry::tombstone(2)));
        assert!(!KvEntry::live("x", 1).same_content(&KvEntry::live("y", 1)));
        assert!(!KvEntry::live("", 1).same_content(&KvEntry::tombstone(1)));
    }
}
