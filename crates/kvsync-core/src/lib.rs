#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # kvsync core
//!
//! Conflict-resolution building blocks for LWW replication of a key-value
//! bucket across independent sites:
//! - `LogicalClock`: scalar Lamport clock
//! - `Operation` / `Version`: replicated mutations and their ordering metadata
//! - `lww`: the single decision rule used by every component
//! - `VersionMetadataStore`: per-key record of the last accepted version
//! - `KeyLocks`: per-key critical sections shared by all writers
//! - `Replica`: per-site state shared by every writer
//! - `effects`: traits for the KV store, the replication channel and local writes
//!
//! ## Design Principles
//!
//! - **Order-independent**: the same set of operations converges to the same
//!   value in any arrival order, with any duplication
//! - **Scalar metadata**: a timestamp plus a node identifier, no vector clocks
//! - **Pure resolution**: `lww` has no side effects, so every site decides a
//!   conflict the same way independently

pub mod clock;
pub mod config;
pub mod effects;
pub mod errors;
pub mod identifiers;
pub mod locks;
pub mod lww;
pub mod metadata;
pub mod operation;
pub mod prelude;
pub mod replica;
pub mod wire;

pub use clock::{LogicalClock, Timestamp};
pub use config::SyncConfig;
pub use errors::{SyncError, SyncResult};
pub use identifiers::NodeId;
pub use locks::{KeyGuard, KeyLocks};
pub use lww::Winner;
pub use metadata::{InMemoryMetadataStore, VersionMetadataStore};
pub use operation::{OpKind, Operation, Version};
pub use replica::Replica;
