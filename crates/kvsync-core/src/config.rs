//! Site configuration.
//!
//! Loaded by the agent (TOML file plus CLI overrides) and handed to the core
//! as a plain struct.

use crate::errors::{SyncError, SyncResult};
use crate::identifiers::NodeId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of one replicating site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Address the local transport listens on
    pub local_address: String,
    /// Peer site used for reconciliation; none disables reconciliation
    pub peer_address: Option<String>,
    /// Addresses operations are published to; empty means `peer_address`
    pub replication_peers: Vec<String>,
    /// Bucket (namespace) being replicated
    pub bucket: String,
    /// This site's node identifier
    pub node_id: String,
    /// Subject operations are published on
    pub subject: String,
    /// Use a durable, acknowledged subscription
    pub durable: bool,
    /// Reconciliation period in milliseconds; 0 disables it
    pub reconcile_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_address: "127.0.0.1:4222".to_string(),
            peer_address: None,
            replication_peers: Vec::new(),
            bucket: "config".to_string(),
            node_id: "site-a".to_string(),
            subject: "rep.kv.ops".to_string(),
            durable: false,
            reconcile_interval_ms: 60_000,
        }
    }
}

impl SyncConfig {
    /// Check that every field is usable.
    pub fn validate(&self) -> SyncResult<()> {
        NodeId::parse(self.node_id.as_str())?;
        if self.bucket.trim().is_empty() {
            return Err(SyncError::config("bucket must not be empty"));
        }
        if self.subject.trim().is_empty() {
            return Err(SyncError::config("subject must not be empty"));
        }
        if self.local_address.trim().is_empty() {
            return Err(SyncError::config("local address must not be empty"));
        }
        if let Some(peer) = &self.peer_address {
            if peer == &self.local_address {
                return Err(SyncError::config(format!(
                    "peer address {peer} is the local address"
                )));
            }
        }
        Ok(())
    }

    /// Validated node identifier
    pub fn node(&self) -> SyncResult<NodeId> {
        NodeId::parse(self.node_id.as_str())
    }

    /// Reconciliation period, if reconciliation is enabled.
    ///
    /// Requires both a peer address and a non-zero interval.
    pub fn reconcile_interval(&self) -> Option<Duration> {
        match (&self.peer_address, self.reconcile_interval_ms) {
            (Some(_), ms) if ms > 0 => Some(Duration::from_millis(ms)),
            _ => None,
        }
    }

    /// Addresses the replication channel publishes to
    pub fn publish_targets(&self) -> Vec<String> {
        if self.replication_peers.is_empty() {
            self.peer_address.iter().cloned().collect()
        } else {
            self.replication_peers.clone()
        }
    }

    /// Durable consumer name for this site
    pub fn consumer_name(&self) -> String {
        format!("rep-kv-{}", self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_reconcile_is_off_without_peer() {
        let config = SyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.reconcile_interval(), None);
        assert!(config.publish_targets().is_empty());
        assert_eq!(config.consumer_name(), "rep-kv-site-a");
    }

    #[test]
    fn zero_interval_disables_reconciliation() {
        let config = SyncConfig {
            peer_address: Some("127.0.0.1:5222".into()),
            reconcile_interval_ms: 0,
            ..SyncConfig::default()
        };
        assert_eq!(config.reconcile_interval(), None);

        let config = SyncConfig {
            reconcile_interval_ms: 250,
            ..config
        };
        assert_eq!(config.reconcile_interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn publish_targets_fall_back_to_peer() {
        let mut config = SyncConfig {
            peer_address: Some("10.0.0.2:4222".into()),
            ..SyncConfig::default()
        };
        assert_eq!(config.publish_targets(), vec!["10.0.0.2:4222".to_string()]);

        config.replication_peers = vec!["10.0.0.3:4222".into(), "10.0.0.4:4222".into()];
        assert_eq!(config.publish_targets().len(), 2);
    }

    #[test]
    fn rejects_invalid_fields() {
        let bad = [
            SyncConfig {
                node_id: String::new(),
                ..SyncConfig::default()
            },
            SyncConfig {
                node_id: "site#a".into(),
                ..SyncConfig::default()
            },
            SyncConfig {
                bucket: " ".into(),
                ..SyncConfig::default()
            },
            SyncConfig {
                peer_address: Some("127.0.0.1:4222".into()),
                ..SyncConfig::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"node_id":"site-b"}"#).unwrap();
        assert_eq!(config.node_id, "site-b");
        assert_eq!(config.bucket, "config");
        assert_eq!(config.reconcile_interval_ms, 60_000);
    }
}
