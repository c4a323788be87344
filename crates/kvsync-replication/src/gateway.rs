//! Local write path.

use crate::apply::apply_to_store;
use async_trait::async_trait;
use kvsync_core::effects::{LocalWrites, ReplicationChannel, WriteOutcome};
use kvsync_core::wire::encode_operation;
use kvsync_core::{OpKind, Operation, Replica, SyncResult};
use std::fmt;
use std::sync::Arc;

/// Sole entry point for mutating the local bucket.
///
/// Each call, under the key's lock:
/// 1. stamps the write with `clock.tick()`
/// 2. applies it to the local store
/// 3. records its version in the metadata store
/// 4. publishes the encoded operation
///
/// A store failure aborts the write before anything is recorded or
/// published. A publish failure does not: the write stands and
/// reconciliation carries it to peers later.
pub struct LocalWriteGateway {
    replica: Replica,
    channel: Arc<dyn ReplicationChannel>,
    subject: String,
}

impl LocalWriteGateway {
    /// Gateway publishing on `subject`
    pub fn new(
        replica: Replica,
        channel: Arc<dyn ReplicationChannel>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            replica,
            channel,
            subject: subject.into(),
        }
    }

    /// Replica this gateway writes to
    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Write `value` under `key`
    pub async fn put(&self, key: &str, value: &str) -> SyncResult<WriteOutcome> {
        self.write(
            key,
            OpKind::Put {
                value: value.to_string(),
            },
        )
        .await
    }

    /// Delete `key`, leaving a tombstone
    pub async fn delete(&self, key: &str) -> SyncResult<WriteOutcome> {
        self.write(key, OpKind::Delete).await
    }

    async fn write(&self, key: &str, kind: OpKind) -> SyncResult<WriteOutcome> {
        let replica = &self.replica;
        let _guard = replica.locks.lock(&replica.bucket, key).await;

        let op = Operation {
            kind,
            bucket: replica.bucket.clone(),
            key: key.to_string(),
            timestamp: replica.clock.tick(),
            origin: replica.node.clone(),
        };

        if let Err(e) = apply_to_store(replica.store.as_ref(), &op).await {
            tracing::warn!(key, error = %e, "Local write failed");
            return Err(e);
        }

        let version = op.version();
        replica.metadata.set(&op.bucket, key, version.clone());

        let published = match self.publish(&op).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    key,
                    ts = op.timestamp,
                    error = %e,
                    "Publish failed, write will reach peers through reconciliation"
                );
                false
            }
        };

        tracing::debug!(
            key,
            ts = op.timestamp,
            tombstone = version.tombstone,
            published,
            "Local write"
        );
        Ok(WriteOutcome { version, published })
    }

    async fn publish(&self, op: &Operation) -> SyncResult<()> {
        let payload = encode_operation(op)?;
        self.channel.publish(&self.subject, payload).await
    }
}

impl fmt::Debug for LocalWriteGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWriteGateway")
            .field("replica", &self.replica)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LocalWrites for LocalWriteGateway {
    async fn put(&self, key: &str, value: &str) -> SyncResult<WriteOutcome> {
        LocalWriteGateway::put(self, key, value).await
    }

    async fn delete(&self, key: &str) -> SyncResult<WriteOutcome> {
        LocalWriteGateway::delete(self, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvsync_core::effects::{KvStore, SubscribeOptions};
    use kvsync_core::wire::decode_operation;
    use kvsync_core::{LogicalClock, NodeId};
    use kvsync_store::MemoryKvStore;
    use kvsync_testkit::FlakyKvStore;
    use kvsync_transport::MemoryBus;

    const SUBJECT: &str = "rep.kv.ops";

    fn gateway(store: Arc<dyn KvStore>, bus: &MemoryBus) -> LocalWriteGateway {
        let replica = Replica::new("config", NodeId::new("site-a"), store)
            .with_clock(LogicalClock::new(100));
        LocalWriteGateway::new(replica, Arc::new(bus.clone()), SUBJECT)
    }

    #[tokio::test]
    async fn put_applies_records_and_publishes() {
        let bus = MemoryBus::new();
        let store = Arc::new(MemoryKvStore::new());
        let gw = gateway(store.clone(), &bus);
        let mut sub = bus
            .subscribe(SUBJECT, SubscribeOptions::fire_and_forget("observer"))
            .await
            .unwrap();

        let outcome = gw.put("k", "v").await.unwrap();

        assert!(outcome.published);
        assert_eq!(outcome.version.timestamp, 101);
        assert_eq!(store.value_of("k").as_deref(), Some("v"));
        assert_eq!(
            gw.replica().metadata.get("config", "k"),
            Some(outcome.version.clone())
        );

        let op = decode_operation(sub.next().await.unwrap().payload()).unwrap();
        assert_eq!(op, Operation::put("config", "k", "v", 101, NodeId::new("site-a")));
    }

    #[tokio::test]
    async fn delete_publishes_tombstone() {
        let bus = MemoryBus::new();
        let store = Arc::new(MemoryKvStore::new());
        let gw = gateway(store.clone(), &bus);
        let mut sub = bus
            .subscribe(SUBJECT, SubscribeOptions::fire_and_forget("observer"))
            .await
            .unwrap();

        gw.put("k", "v").await.unwrap();
        let outcome = gw.delete("k").await.unwrap();

        assert!(outcome.version.tombstone);
        assert!(store.get("k").await.unwrap().unwrap().tombstone);
        sub.next().await.unwrap();
        let op = decode_operation(sub.next().await.unwrap().payload()).unwrap();
        assert!(op.kind.is_delete());
        assert_eq!(op.timestamp, 102);
    }

    #[tokio::test]
    async fn store_failure_publishes_nothing() {
        let bus = MemoryBus::new();
        let store = Arc::new(FlakyKvStore::new(MemoryKvStore::new()));
        store.fail_writes(true);
        let gw = gateway(store.clone(), &bus);

        let err = gw.put("k", "v").await.unwrap_err();

        assert!(matches!(err, kvsync_core::SyncError::Storage { .. }));
        assert_eq!(bus.published(), 0);
        assert_eq!(gw.replica().metadata.get("config", "k"), None);
    }

    #[tokio::test]
    async fn publish_failure_keeps_the_write() {
        let bus = MemoryBus::new();
        bus.set_offline(true);
        let store = Arc::new(MemoryKvStore::new());
        let gw = gateway(store.clone(), &bus);

        let outcome = gw.put("k", "v").await.unwrap();

        assert!(!outcome.published);
        assert_eq!(store.value_of("k").as_deref(), Some("v"));
        assert!(gw.replica().metadata.get("config", "k").is_some());
    }
}
