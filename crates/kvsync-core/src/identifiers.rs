//! Site identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator reserved for synthetic identifiers minted by reconciliation.
pub const SYNTHETIC_SEPARATOR: char = '#';

/// Identifier of a site (node) participating in replication.
///
/// Ordering is byte-wise lexicographic over the underlying string; the LWW
/// tie-break depends on every site agreeing on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap a node identifier without validation.
    ///
    /// Wire payloads are accepted as-is; only configured identifiers go
    /// through [`NodeId::parse`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a configured node identifier.
    ///
    /// Rejects empty identifiers and identifiers containing
    /// [`SYNTHETIC_SEPARATOR`], which would collide with reconciliation tags.
    pub fn parse(id: impl Into<String>) -> Result<Self, crate::SyncError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::SyncError::config("node id must not be empty"));
        }
        if id.contains(SYNTHETIC_SEPARATOR) {
            return Err(crate::SyncError::config(format!(
                "node id '{id}' must not contain '{SYNTHETIC_SEPARATOR}'"
            )));
        }
        Ok(Self(id))
    }

    /// Site-scoped synthetic identifier, e.g. `site-a#peer`.
    pub fn synthetic(&self, side: &str) -> Self {
        Self(format!("{}{SYNTHETIC_SEPARATOR}{side}", self.0))
    }

    /// Whether this identifier was minted by [`NodeId::synthetic`].
    pub fn is_synthetic(&self) -> bool {
        self.0.contains(SYNTHETIC_SEPARATOR)
    }

    /// Get the identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}
