//! Operation and replica builders.

use kvsync_core::effects::KvStore;
use kvsync_core::{LogicalClock, NodeId, Operation, Replica, Timestamp};
use std::sync::Arc;

/// Bucket used throughout the test suites
pub const TEST_BUCKET: &str = "config";

/// Subject used throughout the test suites
pub const TEST_SUBJECT: &str = "rep.kv.ops";

/// Put in [`TEST_BUCKET`]
pub fn put_op(key: &str, value: &str, ts: Timestamp, origin: &str) -> Operation {
    Operation::put(TEST_BUCKET, key, value, ts, NodeId::new(origin))
}

/// Delete in [`TEST_BUCKET`]
pub fn delete_op(key: &str, ts: Timestamp, origin: &str) -> Operation {
    Operation::delete(TEST_BUCKET, key, ts, NodeId::new(origin))
}

/// Replica of [`TEST_BUCKET`] with a clock starting at `clock_start`
pub fn test_replica(node: &str, store: Arc<dyn KvStore>, clock_start: Timestamp) -> Replica {
    Replica::new(TEST_BUCKET, NodeId::new(node), store).with_clock(LogicalClock::new(clock_start))
}
