//! Local write effect.
//!
//! Implemented by the local write gateway. Transports that accept operator
//! writes forward them here so every local mutation produces an operation.

use crate::errors::SyncResult;
use crate::operation::Version;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of an accepted local write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// Version recorded for the key
    pub version: Version,
    /// False if the operation could not be published; reconciliation will
    /// carry the write to peers instead
    pub published: bool,
}

/// Sanctioned entry point for local mutations.
#[async_trait]
pub trait LocalWrites: Send + Sync {
    /// Write a value locally and replicate it
    async fn put(&self, key: &str, value: &str) -> SyncResult<WriteOutcome>;

    /// Delete a key locally and replicate the tombstone
    async fn delete(&self, key: &str) -> SyncResult<WriteOutcome>;
}
