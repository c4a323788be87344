//! Effect traits for the collaborators the replication engine consumes.
//!
//! - `KvStore`: log-backed key-value storage with tombstones
//! - `ReplicationChannel`: publish/subscribe with optional acknowledgement
//! - `LocalWrites`: the local write entry point

pub mod channel;
pub mod kv;
pub mod writes;

pub use channel::{
    Acknowledger, Delivery, DeliveryMode, ReplicationChannel, Settlement, SubscribeOptions,
    Subscription,
};
pub use kv::{KvEntry, KvStore};
pub use writes::{LocalWrites, WriteOutcome};
