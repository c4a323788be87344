//! Replication channel over peer connections.

use super::client::PeerClient;
use crate::memory::MemoryBus;
use async_trait::async_trait;
use futures::future::join_all;
use kvsync_core::effects::{ReplicationChannel, SubscribeOptions, Subscription};
use kvsync_core::SyncResult;

/// [`ReplicationChannel`] that pushes operations to remote sites.
///
/// Publishing sends the payload to every configured peer, whose server hands
/// it to its own local bus. Subscriptions attach to this site's local bus,
/// which is fed by the local [`PeerServer`](super::PeerServer). A site never
/// receives its own publishes back.
#[derive(Debug)]
pub struct TcpChannel {
    bus: MemoryBus,
    peers: Vec<PeerClient>,
}

impl TcpChannel {
    /// Channel publishing to `peers` and subscribing on `bus`
    pub fn new<I, S>(bus: MemoryBus, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bus,
            peers: peers.into_iter().map(PeerClient::new).collect(),
        }
    }

    /// Addresses publishes are sent to
    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.peers.iter().map(PeerClient::address)
    }
}

#[async_trait]
impl ReplicationChannel for TcpChannel {
    /// Fails if any peer could not be reached; the others still receive the
    /// payload.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> SyncResult<()> {
        let sends = self
            .peers
            .iter()
            .map(|peer| peer.publish(subject, payload.clone()));
        let results = join_all(sends).await;

        let mut first_error = None;
        for (peer, result) in self.peers.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(peer = %peer.address(), subject, error = %e, "Publish to peer failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn subscribe(
        &self,
        subject: &str,
        options: SubscribeOptions,
    ) -> SyncResult<Subscription> {
        self.bus.subscribe(subject, options).await
    }

    async fn close(&self) -> SyncResult<()> {
        for peer in &self.peers {
            peer.close().await?;
        }
        self.bus.close().await
    }
}
