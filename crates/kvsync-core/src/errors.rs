//! Unified error type for kvsync.
//!
//! Every fallible operation in the library crates returns [`SyncError`]. The
//! variants follow the failure taxonomy of the replication engine: transport,
//! decode, storage (apply) and configuration.

use serde::{Deserialize, Serialize};

/// Unified error type for all kvsync operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum SyncError {
    /// KV store read or write failed
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Connect, publish or subscribe failed
    #[error("Transport error: {message}")]
    Transport {
        /// Error message describing the transport failure
        message: String,
    },

    /// A peer endpoint could not be reached
    #[error("Peer unreachable: {address}")]
    PeerUnreachable {
        /// Address of the unreachable peer
        address: String,
    },

    /// An operation payload could not be decoded
    #[error("Decode error: {message}")]
    Decode {
        /// Error message describing the malformed payload
        message: String,
    },

    /// Serialization of an outgoing payload failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message describing the invalid setting
        message: String,
    },

    /// The component has been shut down
    #[error("Shut down: {message}")]
    Shutdown {
        /// What was shut down
        message: String,
    },
}

impl SyncError {
    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a peer unreachable error
    pub fn peer_unreachable(address: impl Into<String>) -> Self {
        Self::PeerUnreachable {
            address: address.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a shutdown error
    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown {
            message: message.into(),
        }
    }

    /// Stable short code, used as a structured logging field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Storage { .. } => "storage",
            Self::Transport { .. } => "transport",
            Self::PeerUnreachable { .. } => "peer_unreachable",
            Self::Decode { .. } => "decode",
            Self::Serialization { .. } => "serialization",
            Self::Config { .. } => "config",
            Self::Shutdown { .. } => "shutdown",
        }
    }

    /// Message or address carried by the error, without the kind prefix
    pub fn detail(&self) -> &str {
        match self {
            Self::Storage { message }
            | Self::Transport { message }
            | Self::Decode { message }
            | Self::Serialization { message }
            | Self::Config { message }
            | Self::Shutdown { message } => message,
            Self::PeerUnreachable { address } => address,
        }
    }

    /// Whether retrying the same input can succeed.
    ///
    /// Decode and configuration errors are permanent: a malformed payload
    /// never decodes on redelivery.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Transport { .. } | Self::PeerUnreachable { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}

/// Standard result type for kvsync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;
