//! Agent configuration: a TOML file plus command-line overrides.
//!
//! ```toml
//! node_id = "site-b"
//! local_address = "0.0.0.0:4223"
//! peer_address = "10.0.0.1:4222"
//! durable = true
//! data_dir = "/var/lib/kvsync"
//! ```

use kvsync_core::{SyncConfig, SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything a site needs to start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Replication settings
    #[serde(flatten)]
    pub sync: SyncConfig,
    /// Directory holding the bucket log; in-memory store when absent
    pub data_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Read a TOML config file
    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::config(format!("read {}: {e}", path.display())))?;
        Self::parse(&text)
            .map_err(|e| SyncError::config(format!("{}: {}", path.display(), e.detail())))
    }

    /// Parse TOML config text
    pub fn parse(text: &str) -> SyncResult<Self> {
        toml::from_str(text).map_err(|e| SyncError::config(e.to_string()))
    }

    /// Load `path` if given, otherwise start from defaults
    pub fn load_or_default(path: Option<&Path>) -> SyncResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Log file of the configured bucket
    pub fn log_path(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.log", self.sync.bucket)))
    }

    /// Validate the replication settings
    pub fn validate(&self) -> SyncResult<()> {
        self.sync.validate()
    }
}

/// Values given on the command line; each set field replaces the file value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Listen address
    pub local_address: Option<String>,
    /// Reconciliation peer
    pub peer_address: Option<String>,
    /// Publish targets
    pub replication_peers: Vec<String>,
    /// Bucket
    pub bucket: Option<String>,
    /// Node identifier
    pub node_id: Option<String>,
    /// Subject
    pub subject: Option<String>,
    /// Force a durable subscription
    pub durable: bool,
    /// Reconciliation period in milliseconds
    pub reconcile_interval_ms: Option<u64>,
    /// Data directory
    pub data_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Apply the overrides to `config`
    pub fn apply(self, config: &mut AgentConfig) {
        let sync = &mut config.sync;
        if let Some(v) = self.local_address {
            sync.local_address = v;
        }
        if let Some(v) = self.peer_address {
            sync.peer_address = Some(v);
        }
        if !self.replication_peers.is_empty() {
            sync.replication_peers = self.replication_peers;
        }
        if let Some(v) = self.bucket {
            sync.bucket = v;
        }
        if let Some(v) = self.node_id {
            sync.node_id = v;
        }
        if let Some(v) = self.subject {
            sync.subject = v;
        }
        if self.durable {
            sync.durable = true;
        }
        if let Some(v) = self.reconcile_interval_ms {
            sync.reconcile_interval_ms = v;
        }
        if let Some(v) = self.data_dir {
            config.data_dir = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_toml_fills_sync_settings() {
        let config = AgentConfig::parse(
            r#"
            node_id = "site-b"
            peer_address = "10.0.0.1:4222"
            durable = true
            data_dir = "/tmp/kvsync"
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.node_id, "site-b");
        assert_eq!(config.sync.peer_address.as_deref(), Some("10.0.0.1:4222"));
        assert!(config.sync.durable);
        assert_eq!(config.sync.bucket, "config");
        assert_eq!(
            config.log_path(),
            Some(PathBuf::from("/tmp/kvsync/config.log"))
        );
    }

    #[test]
    fn overrides_win_over_file_values() {
        let mut config = AgentConfig::parse(r#"node_id = "site-b""#).unwrap();
        ConfigOverrides {
            node_id: Some("site-c".into()),
            reconcile_interval_ms: Some(0),
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.sync.node_id, "site-c");
        assert_eq!(config.sync.reconcile_interval_ms, 0);
        assert!(!config.sync.durable);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = AgentConfig::parse("node_id = ").unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = AgentConfig::load(Path::new("/nonexistent/kvsync.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/kvsync.toml"));
    }
}
