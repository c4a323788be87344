//! Log-backed KV store.
//!
//! Every put and delete appends one JSON line to the log file:
//!
//! ```text
//! {"key":"k1","value":[120],"tombstone":false,"ts":1700000000001}
//! {"key":"k1","tombstone":true,"ts":1700000000002}
//! ```
//!
//! On open the log is replayed into an in-memory index where the last record
//! per key wins. Tombstones stay in the index so `keys()` lists deleted keys.
//! A torn final line left by a crash mid-append is ignored; corruption
//! anywhere else fails the open.

use crate::stamp::WriteStamp;
use async_lock::Mutex;
use async_trait::async_trait;
use kvsync_core::effects::{KvEntry, KvStore};
use kvsync_core::{SyncError, SyncResult, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogRecord {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Vec<u8>>,
    tombstone: bool,
    ts: Timestamp,
}

impl LogRecord {
    fn into_entry(self) -> (String, KvEntry) {
        let entry = KvEntry {
            value: self.value,
            tombstone: self.tombstone,
            write_ts: self.ts,
        };
        (self.key, entry)
    }

    fn from_entry(key: &str, entry: &KvEntry) -> Self {
        Self {
            key: key.to_string(),
            value: entry.value.clone(),
            tombstone: entry.tombstone,
            ts: entry.write_ts,
        }
    }
}

/// Append-only, file-backed KV store for one bucket.
#[derive(Debug)]
pub struct LogKvStore {
    path: PathBuf,
    index: RwLock<BTreeMap<String, KvEntry>>,
    file: Mutex<File>,
    stamp: WriteStamp,
}

impl LogKvStore {
    /// Open (or create) the log at `path` and replay it.
    pub async fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let index = replay(&path).await?;
        let stamp = WriteStamp::new();
        if let Some(max) = index.values().map(|e| e.write_ts).max() {
            stamp.observe(max);
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        tracing::info!(path = %path.display(), keys = index.len(), "Opened KV log");

        Ok(Self {
            path,
            index: RwLock::new(index),
            file: Mutex::new(file),
            stamp,
        })
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the log with only the latest record per key.
    ///
    /// Tombstones are kept; they still outrank older puts during merges.
    pub async fn compact(&self) -> SyncResult<()> {
        let mut file = self.file.lock().await;
        let snapshot = self.index.read().clone();

        let tmp = self.path.with_extension("compact");
        let mut buf = Vec::new();
        for (key, entry) in &snapshot {
            serde_json::to_writer(&mut buf, &LogRecord::from_entry(key, entry))?;
            buf.push(b'\n');
        }
        fs::write(&tmp, &buf).await?;
        fs::rename(&tmp, &self.path).await?;

        *file = OpenOptions::new().append(true).open(&self.path).await?;
        tracing::debug!(path = %self.path.display(), keys = snapshot.len(), "Compacted KV log");
        Ok(())
    }

    async fn append(&self, key: &str, entry: KvEntry) -> SyncResult<()> {
        let mut line = serde_json::to_vec(&LogRecord::from_entry(key, &entry))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| SyncError::storage(format!("append to {}: {e}", self.path.display())))?;
        file.sync_data()
            .await
            .map_err(|e| SyncError::storage(format!("sync {}: {e}", self.path.display())))?;

        // Index only after the record is durable.
        self.index.write().insert(key.to_string(), entry);
        Ok(())
    }
}

async fn replay(path: &Path) -> SyncResult<BTreeMap<String, KvEntry>> {
    let mut index = BTreeMap::new();
    let contents = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(index),
        Err(e) => return Err(e.into()),
    };

    let lines: Vec<&[u8]> = contents
        .split(|b| *b == b'\n')
        .filter(|l| !l.is_empty())
        .collect();
    let last = lines.len().saturating_sub(1);

    for (n, line) in lines.iter().enumerate() {
        match serde_json::from_slice::<LogRecord>(line) {
            Ok(record) => {
                let (key, entry) = record.into_entry();
                index.insert(key, entry);
            }
            Err(e) if n == last && !contents.ends_with(b"\n") => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring torn final log record");
            }
            Err(e) => {
                return Err(SyncError::storage(format!(
                    "corrupt record at {}:{}: {e}",
                    path.display(),
                    n + 1
                )))
            }
        }
    }
    Ok(index)
}

#[async_trait]
impl KvStore for LogKvStore {
    async fn put(&self, key: &str, value: &[u8]) -> SyncResult<()> {
        self.append(key, KvEntry::live(value.to_vec(), self.stamp.next()))
            .await
    }

    async fn get(&self, key: &str) -> SyncResult<Option<KvEntry>> {
        Ok(self.index.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        self.append(key, KvEntry::tombstone(self.stamp.next())).await
    }

    async fn keys(&self) -> SyncResult<Vec<String>> {
        Ok(self.index.read().keys().cloned().collect())
    }

    async fn close(&self) -> SyncResult<()> {
        let file = self.file.lock().await;
        file.sync_all().await?;
        Ok(())
    }
}
