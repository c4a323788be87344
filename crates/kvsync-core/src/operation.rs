//! Replicated operations and their ordering metadata.

use crate::clock::Timestamp;
use crate::identifiers::NodeId;
use serde::{Deserialize, Serialize};

/// The mutation carried by an [`Operation`].
///
/// A put always carries a value (possibly empty); a delete never does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// Write `value` under the key
    Put {
        /// Value written by the put
        value: String,
    },
    /// Write a tombstone under the key
    Delete,
}

impl OpKind {
    /// Whether this kind writes a tombstone
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete)
    }

    /// Value carried by a put
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Put { value } => Some(value),
            Self::Delete => None,
        }
    }
}

/// Immutable fact describing one mutation of one key.
///
/// Produced once at the originating site and consumed unchanged everywhere
/// else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Put or delete
    pub kind: OpKind,
    /// Bucket (namespace) the key lives in
    pub bucket: String,
    /// Key being mutated
    pub key: String,
    /// Logical timestamp assigned by the origin
    pub timestamp: Timestamp,
    /// Site that produced the operation
    pub origin: NodeId,
}

impl Operation {
    /// Build a put operation
    pub fn put(
        bucket: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        timestamp: Timestamp,
        origin: NodeId,
    ) -> Self {
        Self {
            kind: OpKind::Put {
                value: value.into(),
            },
            bucket: bucket.into(),
            key: key.into(),
            timestamp,
            origin,
        }
    }

    /// Build a delete operation
    pub fn delete(
        bucket: impl Into<String>,
        key: impl Into<String>,
        timestamp: Timestamp,
        origin: NodeId,
    ) -> Self {
        Self {
            kind: OpKind::Delete,
            bucket: bucket.into(),
            key: key.into(),
            timestamp,
            origin,
        }
    }

    /// Ordering metadata of this operation
    pub fn version(&self) -> Version {
        Version {
            timestamp: self.timestamp,
            origin: self.origin.clone(),
            tombstone: self.kind.is_delete(),
        }
    }
}

/// Ordering summary of an operation, compared without carrying the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Logical timestamp
    pub timestamp: Timestamp,
    /// Site that produced the version
    pub origin: NodeId,
    /// True if the version is a delete
    pub tombstone: bool,
}

impl Version {
    /// Create a version
    pub fn new(timestamp: Timestamp, origin: NodeId, tombstone: bool) -> Self {
        Self {
            timestamp,
            origin,
            tombstone,
        }
    }
}

impl From<&Operation> for Version {
    fn from(op: &Operation) -> Self {
        op.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_marks_deletes_as_tombstones() {
        let put = Operation::put("config", "k", "v", 7, NodeId::from("site-a"));
        let del = Operation::delete("config", "k", 8, NodeId::from("site-a"));

        assert!(!put.version().tombstone);
        assert!(del.version().tombstone);
        assert_eq!(del.version().timestamp, 8);
        assert_eq!(del.version().origin, NodeId::from("site-a"));
    }

    #[test]
    fn empty_put_value_is_still_a_value() {
        let put = Operation::put("config", "k", "", 1, NodeId::from("site-a"));
        assert_eq!(put.kind.value(), Some(""));
        assert_eq!(OpKind::Delete.value(), None);
    }
}
