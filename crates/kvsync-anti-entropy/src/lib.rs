#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # kvsync anti-entropy
//!
//! Periodic full-state reconciliation between this site's store and one
//! peer's store. It is the backstop for everything streaming can lose:
//! dropped fire-and-forget messages, publish failures, writes made while a
//! site was down.
//!
//! ## Design Principles
//!
//! - **Pure planning**: `pure::plan_key` decides what to do with one key from
//!   the two entries alone, using the same LWW rule as the consumer
//! - **Idempotent**: a side already holding the winning content is never
//!   rewritten, so a converged pair produces no writes
//! - **Isolated failures**: a failing key is counted and skipped; the rest of
//!   the cycle proceeds

pub mod engine;
pub mod pure;
pub mod scheduler;

pub use engine::{KeyResult, ReconcileReport, ReconciliationEngine};
pub use pure::{plan_key, KeyPlan};
