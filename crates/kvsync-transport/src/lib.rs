#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # kvsync transport
//!
//! Concrete [`ReplicationChannel`](kvsync_core::effects::ReplicationChannel)
//! implementations:
//! - `MemoryBus`: in-process broker with fire-and-forget and durable,
//!   acknowledged subscriptions
//! - `tcp`: peer server, publishing channel and remote store client

pub mod memory;
pub mod tcp;

pub use memory::MemoryBus;
pub use tcp::{PeerClient, PeerServer, RemoteKvStore, ServerHandlers, TcpChannel};
