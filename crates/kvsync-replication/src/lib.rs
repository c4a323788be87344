#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # kvsync replication
//!
//! Operation streaming between sites.
//!
//! - `LocalWriteGateway`: the only sanctioned way to mutate the local
//!   bucket. Every write becomes an [`Operation`](kvsync_core::Operation)
//!   applied locally, recorded in the metadata store and published.
//! - `ReplicationConsumer`: applies operations published by other sites when
//!   they win against the recorded version, and settles each delivery.
//!
//! Both take the per-key lock of the key they touch, so a local write and a
//! remote apply of the same key never interleave.

mod apply;
pub mod consumer;
pub mod gateway;

pub use consumer::{ConsumeOutcome, ConsumerStats, ReplicationConsumer, SkipReason};
pub use gateway::LocalWriteGateway;
