//! TCP transport between sites.
//!
//! Every site runs one [`PeerServer`]. Peers use it to publish operations
//! ([`TcpChannel`]), to read and write the site's store during
//! reconciliation ([`RemoteKvStore`]) and to submit operator writes
//! ([`PeerClient::put`], [`PeerClient::delete`]).

mod channel;
mod client;
pub mod frame;
mod server;

pub use channel::TcpChannel;
pub use client::{PeerClient, RemoteKvStore, CONNECT_TIMEOUT, REQUEST_TIMEOUT};
pub use server::{PeerServer, ServerHandlers, REMOTE_SIDE};
