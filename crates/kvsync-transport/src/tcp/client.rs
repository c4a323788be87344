//! Client side of the peer protocol.

use super::frame::{read_frame, write_frame, Request, Response};
use async_lock::Mutex;
use async_trait::async_trait;
use kvsync_core::effects::{KvEntry, KvStore, WriteOutcome};
use kvsync_core::{SyncError, SyncResult};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Time allowed to establish a connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Time allowed for one request/response exchange
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn exchange(&mut self, request: &Request) -> SyncResult<Response> {
        write_frame(&mut self.writer, request).await?;
        read_frame(&mut self.reader)
            .await?
            .ok_or_else(|| SyncError::transport("connection closed by peer"))
    }
}

/// Lazily connected client for one peer.
///
/// Requests are serialized over a single cached connection. A failed or
/// timed-out exchange drops the connection; the next request reconnects.
#[derive(Debug)]
pub struct PeerClient {
    address: String,
    conn: Mutex<Option<Connection>>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl PeerClient {
    /// Client for the peer listening on `address`; nothing is dialed yet.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            conn: Mutex::new(None),
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Override the request timeout
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Peer address
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> SyncResult<Connection> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| SyncError::peer_unreachable(&self.address))?
            .map_err(|e| {
                tracing::debug!(peer = %self.address, error = %e, "Connect failed");
                SyncError::peer_unreachable(&self.address)
            })?;
        stream
            .set_nodelay(true)
            .map_err(|e| SyncError::transport(e.to_string()))?;

        tracing::debug!(peer = %self.address, "Connected to peer");
        let (reader, writer) = stream.into_split();
        Ok(Connection {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Send one request and wait for its response.
    ///
    /// `Response::Error` is turned back into a [`SyncError`].
    pub async fn request(&self, request: &Request) -> SyncResult<Response> {
        let mut slot = self.conn.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.connect().await?,
        };

        let exchanged = timeout(self.request_timeout, conn.exchange(request))
            .await
            .unwrap_or_else(|_| {
                Err(SyncError::transport(format!(
                    "request to {} timed out",
                    self.address
                )))
            });

        match exchanged {
            Ok(Response::Error { code, message }) => {
                *slot = Some(conn);
                Err(Response::remote_error(&code, message))
            }
            Ok(response) => {
                *slot = Some(conn);
                Ok(response)
            }
            Err(e) => {
                tracing::debug!(peer = %self.address, error = %e, "Dropping peer connection");
                Err(e)
            }
        }
    }

    fn unexpected(&self, response: Response) -> SyncError {
        SyncError::transport(format!(
            "unexpected response from {}: {response:?}",
            self.address
        ))
    }

    /// Check the peer is reachable
    pub async fn ping(&self) -> SyncResult<()> {
        match self.request(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(self.unexpected(other)),
        }
    }

    /// Deliver a payload to the peer's local subscribers
    pub async fn publish(&self, subject: &str, payload: Vec<u8>) -> SyncResult<()> {
        let request = Request::Publish {
            subject: subject.to_string(),
            payload,
        };
        match self.request(&request).await? {
            Response::Ack => Ok(()),
            other => Err(self.unexpected(other)),
        }
    }

    /// Local write on the peer, replicated by its gateway
    pub async fn put(&self, key: &str, value: &str) -> SyncResult<WriteOutcome> {
        let request = Request::Put {
            key: key.to_string(),
            value: value.to_string(),
        };
        match self.request(&request).await? {
            Response::Written { outcome } => Ok(outcome),
            other => Err(self.unexpected(other)),
        }
    }

    /// Local delete on the peer, replicated by its gateway
    pub async fn delete(&self, key: &str) -> SyncResult<WriteOutcome> {
        let request = Request::Delete {
            key: key.to_string(),
        };
        match self.request(&request).await? {
            Response::Written { outcome } => Ok(outcome),
            other => Err(self.unexpected(other)),
        }
    }

    /// Drop the cached connection
    pub async fn close(&self) -> SyncResult<()> {
        if let Some(mut conn) = self.conn.lock().await.take() {
            // Peer may already be gone.
            let _ = conn.writer.shutdown().await;
        }
        Ok(())
    }
}

/// [`KvStore`] served by a peer's store.
///
/// Writes skip the peer's gateway, so they are not republished. The peer
/// applies them under its key lock and records their version.
#[derive(Debug)]
pub struct RemoteKvStore {
    client: PeerClient,
}

impl RemoteKvStore {
    /// Store backed by the peer at `address`
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            client: PeerClient::new(address),
        }
    }

    /// Peer address
    pub fn address(&self) -> &str {
        self.client.address()
    }
}

#[async_trait]
impl KvStore for RemoteKvStore {
    async fn put(&self, key: &str, value: &[u8]) -> SyncResult<()> {
        let request = Request::KvPut {
            key: key.to_string(),
            value: value.to_vec(),
        };
        match self.client.request(&request).await? {
            Response::Ack => Ok(()),
            other => Err(self.client.unexpected(other)),
        }
    }

    async fn get(&self, key: &str) -> SyncResult<Option<KvEntry>> {
        let request = Request::KvGet {
            key: key.to_string(),
        };
        match self.client.request(&request).await? {
            Response::Entry { entry } => Ok(entry),
            other => Err(self.client.unexpected(other)),
        }
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        let request = Request::KvDelete {
            key: key.to_string(),
        };
        match self.client.request(&request).await? {
            Response::Ack => Ok(()),
            other => Err(self.client.unexpected(other)),
        }
    }

    async fn keys(&self) -> SyncResult<Vec<String>> {
        match self.client.request(&Request::KvKeys).await? {
            Response::Keys { keys } => Ok(keys),
            other => Err(self.client.unexpected(other)),
        }
    }

    async fn close(&self) -> SyncResult<()> {
        self.client.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn unreachable_peer_is_reported() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = PeerClient::new(&address);
        let err = client.ping().await.unwrap_err();
        assert_eq!(err, SyncError::peer_unreachable(address));
    }

    #[tokio::test]
    async fn silent_peer_times_out_and_drops_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let held = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let client = PeerClient::new(&address).with_request_timeout(Duration::from_millis(100));
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
        assert!(err.is_retryable());
        assert!(client.conn.lock().await.is_none());

        held.abort();
    }
}
