//! Property test strategies for kvsync types
//!
//! Key, origin and timestamp spaces are kept small so generated streams
//! collide often: same keys, same timestamps, same origins.

use crate::fixtures::{delete_op, put_op};
use kvsync_core::Operation;
use proptest::prelude::*;

// Re-export proptest for convenience
pub use proptest;

/// Put or delete over a handful of keys
pub fn arb_operation() -> impl Strategy<Value = Operation> {
    let key = prop::sample::select(vec!["k1", "k2", "k3"]);
    let origin = prop::sample::select(vec!["site-a", "site-c", "site-d"]);
    (key, origin, 1u64..16, prop::option::of("[a-z]{0,3}")).prop_map(
        |(key, origin, ts, value)| match value {
            Some(value) => put_op(key, &value, ts, origin),
            None => delete_op(key, ts, origin),
        },
    )
}

/// Stream of operations with distinct (origin, timestamp) pairs.
///
/// A site never stamps two operations with the same timestamp, so streams
/// that violate this do not occur in practice.
pub fn arb_operation_stream(max_len: usize) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(arb_operation(), 0..max_len).prop_map(|ops| {
        let mut seen = std::collections::HashSet::new();
        ops.into_iter()
            .filter(|op| seen.insert((op.origin.clone(), op.timestamp)))
            .collect()
    })
}
