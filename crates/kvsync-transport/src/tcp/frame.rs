//! Peer protocol frames.
//!
//! Each frame is a 4-byte big-endian length followed by a JSON body. A client
//! sends one [`Request`] and waits for exactly one [`Response`].

use kvsync_core::effects::{KvEntry, WriteOutcome};
use kvsync_core::{SyncError, SyncResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Client to server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Liveness check
    Ping,
    /// Deliver a payload to the server's local subscribers
    Publish {
        /// Subject to publish on
        subject: String,
        /// Encoded operation
        payload: Vec<u8>,
    },
    /// Read one entry from the server's store
    KvGet {
        /// Key to read
        key: String,
    },
    /// Write raw bytes to the server's store without publishing them
    KvPut {
        /// Key to write
        key: String,
        /// Bytes to store
        value: Vec<u8>,
    },
    /// Write a tombstone to the server's store without publishing it
    KvDelete {
        /// Key to delete
        key: String,
    },
    /// List every key in the server's store
    KvKeys,
    /// Local write through the server's gateway
    Put {
        /// Key to write
        key: String,
        /// Value to write
        value: String,
    },
    /// Local delete through the server's gateway
    Delete {
        /// Key to delete
        key: String,
    },
}

/// Server to client messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Answer to `Ping`
    Pong,
    /// Request carried out
    Ack,
    /// Answer to `KvGet`
    Entry {
        /// Stored entry, if any
        entry: Option<KvEntry>,
    },
    /// Answer to `KvKeys`
    Keys {
        /// Every key, tombstoned ones included
        keys: Vec<String>,
    },
    /// Answer to `Put` and `Delete`
    Written {
        /// Version recorded by the gateway
        outcome: WriteOutcome,
    },
    /// Request failed on the server
    Error {
        /// `SyncError::code` of the failure
        code: String,
        /// Human-readable detail
        message: String,
    },
}

impl Response {
    /// Error response carrying a [`SyncError`]
    pub fn error(err: &SyncError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.detail().to_string(),
        }
    }

    /// Rebuild the server-side error on the client.
    pub fn remote_error(code: &str, message: String) -> SyncError {
        match code {
            "storage" => SyncError::storage(message),
            "decode" => SyncError::decode(message),
            "config" => SyncError::config(message),
            "shutdown" => SyncError::shutdown(message),
            "peer_unreachable" => SyncError::peer_unreachable(message),
            _ => SyncError::transport(message),
        }
    }
}

/// Write one frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> SyncResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(SyncError::transport(format!(
            "frame too large: {} > {MAX_FRAME_LEN}",
            body.len()
        )));
    }
    let len = (body.len() as u32).to_be_bytes();

    writer.write_all(&len).await.map_err(io_error)?;
    writer.write_all(&body).await.map_err(io_error)?;
    writer.flush().await.map_err(io_error)?;
    Ok(())
}

/// Read one frame; `None` if the stream ended cleanly before a frame began.
pub async fn read_frame<R, T>(reader: &mut R) -> SyncResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(io_error(e)),
    }

    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(SyncError::decode(format!(
            "frame too large: {len} > {MAX_FRAME_LEN}"
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(io_error)?;
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| SyncError::decode(format!("invalid frame: {e}")))
}

fn io_error(err: std::io::Error) -> SyncError {
    SyncError::transport(err.to_string())
}
