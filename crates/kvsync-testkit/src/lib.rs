//! kvsync testing infrastructure
//!
//! Shared helpers for the replication, anti-entropy and agent test suites:
//! - `flaky`: a store wrapper that fails on demand
//! - `fixtures`: operation and replica builders
//! - `strategies`: proptest strategies for versions and operation streams
//! - `assertions`: convergence checks across stores
//!
//! ```toml
//! [dev-dependencies]
//! kvsync-testkit = { workspace = true }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod assertions;
pub mod fixtures;
pub mod flaky;
pub mod strategies;

pub use assertions::*;
pub use fixtures::*;
pub use flaky::FlakyKvStore;
