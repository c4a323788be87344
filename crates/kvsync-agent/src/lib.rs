#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # kvsync agent
//!
//! Runs one replicating site: the log-backed store, the peer server, the
//! replication consumer and the reconciliation ticker, all bound to one
//! shutdown signal.

pub mod config;
pub mod runtime;
pub mod task_registry;

pub use config::{AgentConfig, ConfigOverrides};
pub use runtime::SiteRuntime;
pub use task_registry::TaskRegistry;
