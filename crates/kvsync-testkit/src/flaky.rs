//! Failure-injecting store wrapper.

use async_trait::async_trait;
use kvsync_core::effects::{KvEntry, KvStore};
use kvsync_core::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Wraps a store and fails selected calls with storage errors.
///
/// ```rust
/// use kvsync_store::MemoryKvStore;
/// use kvsync_testkit::FlakyKvStore;
///
/// let store = FlakyKvStore::new(MemoryKvStore::new());
/// store.fail_key("k2");
/// ```
#[derive(Debug)]
pub struct FlakyKvStore<S> {
    inner: S,
    write_failure: Mutex<Option<SyncError>>,
    fail_listing: AtomicBool,
    failing: Mutex<HashSet<String>>,
    writes: AtomicU64,
}

impl<S: KvStore> FlakyKvStore<S> {
    /// Wrap `inner`; nothing fails until configured
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            write_failure: Mutex::new(None),
            fail_listing: AtomicBool::new(false),
            failing: Mutex::new(HashSet::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail every put and delete with a storage error
    pub fn fail_writes(&self, fail: bool) {
        *self.write_failure.lock() = fail.then(|| SyncError::storage("injected write failure"));
    }

    /// Fail every put and delete with `error`
    pub fn fail_writes_with(&self, error: SyncError) {
        *self.write_failure.lock() = Some(error);
    }

    /// Fail key enumeration
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Fail every call touching `key`
    pub fn fail_key(&self, key: impl Into<String>) {
        self.failing.lock().insert(key.into());
    }

    /// Stop failing calls touching `key`
    pub fn heal_key(&self, key: &str) {
        self.failing.lock().remove(key);
    }

    /// Successful puts and deletes so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_key(&self, key: &str) -> SyncResult<()> {
        if self.failing.lock().contains(key) {
            return Err(SyncError::storage(format!("injected failure for key {key}")));
        }
        Ok(())
    }

    fn check_write(&self, key: &str) -> SyncResult<()> {
        if let Some(error) = self.write_failure.lock().clone() {
            return Err(error);
        }
        self.check_key(key)
    }
}

#[async_trait]
impl<S: KvStore> KvStore for FlakyKvStore<S> {
    async fn put(&self, key: &str, value: &[u8]) -> SyncResult<()> {
        self.check_write(key)?;
        self.inner.put(key, value).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> SyncResult<Option<KvEntry>> {
        self.check_key(key)?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        self.check_write(key)?;
        self.inner.delete(key).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn keys(&self) -> SyncResult<Vec<String>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(SyncError::storage("injected listing failure"));
        }
        self.inner.keys().await
    }

    async fn close(&self) -> SyncResult<()> {
        self.inner.close().await
    }
}
