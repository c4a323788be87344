//! Server side of the peer protocol.

use super::frame::{read_frame, write_frame, Request, Response};
use kvsync_core::effects::{KvStore, LocalWrites, ReplicationChannel};
use kvsync_core::{Replica, SyncError, SyncResult, Version};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Suffix of the synthetic origin recorded for writes made by a peer's
/// reconciliation
pub const REMOTE_SIDE: &str = "remote";

/// Collaborators a site exposes to its peers.
#[derive(Clone)]
pub struct ServerHandlers {
    /// Receives operations published by peers
    pub inbound: Arc<dyn ReplicationChannel>,
    /// Replica whose store is read and written by peers' reconciliation
    pub replica: Replica,
    /// Gateway for operator writes; `None` rejects them
    pub writes: Option<Arc<dyn LocalWrites>>,
}

impl ServerHandlers {
    async fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::Ping => Ok(Response::Pong),
            Request::Publish { subject, payload } => self
                .inbound
                .publish(&subject, payload)
                .await
                .map(|()| Response::Ack),
            Request::KvGet { key } => self
                .replica
                .store
                .get(&key)
                .await
                .map(|entry| Response::Entry { entry }),
            Request::KvPut { key, value } => self
                .remote_write(&key, Some(&value))
                .await
                .map(|()| Response::Ack),
            Request::KvDelete { key } => self
                .remote_write(&key, None)
                .await
                .map(|()| Response::Ack),
            Request::KvKeys => self
                .replica
                .store
                .keys()
                .await
                .map(|keys| Response::Keys { keys }),
            Request::Put { key, value } => match &self.writes {
                Some(writes) => writes
                    .put(&key, &value)
                    .await
                    .map(|outcome| Response::Written { outcome }),
                None => Err(SyncError::config("site does not accept local writes")),
            },
            Request::Delete { key } => match &self.writes {
                Some(writes) => writes
                    .delete(&key)
                    .await
                    .map(|outcome| Response::Written { outcome }),
                None => Err(SyncError::config("site does not accept local writes")),
            },
        };
        result.unwrap_or_else(|e| Response::error(&e))
    }

    /// Store write requested by a peer's reconciliation.
    ///
    /// Runs under the key's lock like every other writer of the replica, and
    /// records the written entry's version so older operations still in
    /// flight lose against it.
    async fn remote_write(&self, key: &str, value: Option<&[u8]>) -> SyncResult<()> {
        let replica = &self.replica;
        let _guard = replica.locks.lock(&replica.bucket, key).await;

        match value {
            Some(value) => replica.store.put(key, value).await?,
            None => replica.store.delete(key).await?,
        }

        if let Some(entry) = replica.store.get(key).await? {
            replica.clock.observe(entry.write_ts);
            let version = Version::new(
                entry.write_ts,
                replica.node.synthetic(REMOTE_SIDE),
                entry.tombstone,
            );
            replica.metadata.set_if_newer(&replica.bucket, key, version);
        }
        tracing::debug!(key, tombstone = value.is_none(), "Applied write from peer");
        Ok(())
    }
}

/// Listener answering peer requests for one site.
pub struct PeerServer {
    listener: TcpListener,
    handlers: Arc<ServerHandlers>,
}

impl PeerServer {
    /// Bind the listener
    pub async fn bind(address: &str, handlers: ServerHandlers) -> SyncResult<Self> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| SyncError::transport(format!("bind {address}: {e}")))?;
        Ok(Self {
            listener,
            handlers: Arc::new(handlers),
        })
    }

    /// Address actually bound, useful after binding port 0
    pub fn local_addr(&self) -> SyncResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| SyncError::transport(e.to_string()))
    }

    /// Accept connections until `shutdown` turns true.
    ///
    /// Open connections are told to stop and awaited before returning.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> SyncResult<()> {
        let address = self.local_addr()?;
        tracing::info!(%address, "Peer server listening");

        let mut connections = JoinSet::new();
        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            Arc::clone(&self.handlers),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => tracing::warn!(error = %e, "Accept failed"),
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        tracing::info!(%address, open = connections.len(), "Peer server stopping");
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handlers: Arc<ServerHandlers>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, error = %e, "Could not disable Nagle");
    }
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    tracing::debug!(%peer, "Peer connected");

    while !*shutdown.borrow() {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = read_frame::<_, Request>(&mut reader) => frame,
        };

        match frame {
            Ok(Some(request)) => {
                let response = handlers.handle(request).await;
                if let Err(e) = write_frame(&mut writer, &response).await {
                    tracing::debug!(%peer, error = %e, "Reply failed");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Closing connection after bad frame");
                // Best effort; the connection is dropped either way.
                let _ = write_frame(&mut writer, &Response::error(&e)).await;
                break;
            }
        }
    }
    tracing::debug!(%peer, "Peer disconnected");
}
