//! Per-key critical sections.
//!
//! The gateway, the consumer and the reconciliation engine all run
//! read-metadata, write-KV, write-metadata sequences. Holding the key's guard
//! across the whole sequence keeps a local write and a concurrently arriving
//! remote operation for the same key from losing an update. Different keys
//! never contend.

use async_lock::{Mutex, MutexGuardArc};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Table size above which idle entries are pruned on the next lock.
const PRUNE_THRESHOLD: usize = 1024;

/// Guard held for the duration of one key's critical section.
pub type KeyGuard = MutexGuardArc<()>;

/// Table of async mutexes keyed by `(bucket, key)`.
#[derive(Debug, Default)]
pub struct KeyLocks {
    table: SyncMutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl KeyLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the critical section for a key.
    pub async fn lock(&self, bucket: &str, key: &str) -> KeyGuard {
        let mutex = {
            let mut table = self.table.lock();
            if table.len() > PRUNE_THRESHOLD {
                table.retain(|_, m| Arc::strong_count(m) > 1);
            }
            Arc::clone(
                table
                    .entry((bucket.to_string(), key.to_string()))
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        mutex.lock_arc().await
    }

    /// Number of keys currently tracked
    pub fn tracked(&self) -> usize {
        self.table.lock().len()
    }
}
