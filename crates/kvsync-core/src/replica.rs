//! Per-site state shared by every writer of a bucket.

use crate::clock::LogicalClock;
use crate::effects::KvStore;
use crate::identifiers::NodeId;
use crate::locks::KeyLocks;
use crate::metadata::{InMemoryMetadataStore, VersionMetadataStore};
use std::fmt;
use std::sync::Arc;

/// One site's replica of one bucket.
///
/// The local write gateway, the replication consumer and the reconciliation
/// engine of a site all hold clones of the same `Replica`, so they share one
/// clock, one metadata store and one lock table.
#[derive(Clone)]
pub struct Replica {
    /// Bucket this replica holds
    pub bucket: String,
    /// Identity of this site
    pub node: NodeId,
    /// Site clock
    pub clock: Arc<LogicalClock>,
    /// Last accepted version per key
    pub metadata: Arc<dyn VersionMetadataStore>,
    /// Per-key critical sections
    pub locks: Arc<KeyLocks>,
    /// Local store
    pub store: Arc<dyn KvStore>,
}

impl Replica {
    /// Replica with a wall-clock seeded clock and empty metadata
    pub fn new(bucket: impl Into<String>, node: NodeId, store: Arc<dyn KvStore>) -> Self {
        Self {
            bucket: bucket.into(),
            node,
            clock: Arc::new(LogicalClock::from_wall_clock()),
            metadata: Arc::new(InMemoryMetadataStore::new()),
            locks: Arc::new(KeyLocks::new()),
            store,
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: LogicalClock) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

impl fmt::Debug for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replica")
            .field("bucket", &self.bucket)
            .field("node", &self.node)
            .field("clock", &self.clock.now())
            .finish_non_exhaustive()
    }
}
