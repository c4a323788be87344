//! kvsync core prelude.
//!
//! Curated re-exports for the replication and anti-entropy crates.

pub use crate::effects::{
    Delivery, DeliveryMode, KvEntry, KvStore, LocalWrites, ReplicationChannel, SubscribeOptions,
    Subscription, WriteOutcome,
};
pub use crate::{
    InMemoryMetadataStore, KeyLocks, LogicalClock, NodeId, OpKind, Operation, Replica,
    SyncConfig, SyncError, SyncResult, Timestamp, Version, VersionMetadataStore,
};
