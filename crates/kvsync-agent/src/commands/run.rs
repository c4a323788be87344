//! `kvsyncd run`

use anyhow::{Context, Result};
use clap::Args;
use kvsync_agent::{AgentConfig, ConfigOverrides, SiteRuntime};
use std::path::{Path, PathBuf};
use tracing::info;

/// Options that override the config file
#[derive(Args)]
pub struct RunArgs {
    /// Address to listen on for peers
    #[arg(long)]
    pub local_address: Option<String>,

    /// Peer used for reconciliation
    #[arg(long)]
    pub peer_address: Option<String>,

    /// Publish operations to this address (repeatable)
    #[arg(long = "replicate-to")]
    pub replication_peers: Vec<String>,

    /// Bucket to replicate
    #[arg(long)]
    pub bucket: Option<String>,

    /// Node identifier of this site
    #[arg(long)]
    pub node_id: Option<String>,

    /// Subject operations are published on
    #[arg(long)]
    pub subject: Option<String>,

    /// Use an acknowledged, redelivering subscription
    #[arg(long)]
    pub durable: bool,

    /// Reconciliation period in milliseconds, 0 to disable
    #[arg(long)]
    pub reconcile_interval_ms: Option<u64>,

    /// Directory for the bucket log
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

impl From<RunArgs> for ConfigOverrides {
    fn from(args: RunArgs) -> Self {
        Self {
            local_address: args.local_address,
            peer_address: args.peer_address,
            replication_peers: args.replication_peers,
            bucket: args.bucket,
            node_id: args.node_id,
            subject: args.subject,
            durable: args.durable,
            reconcile_interval_ms: args.reconcile_interval_ms,
            data_dir: args.data_dir,
        }
    }
}

/// Start a site and keep it running until Ctrl+C or SIGTERM.
pub async fn handle_run(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = AgentConfig::load_or_default(config_path).context("Failed to load config")?;
    ConfigOverrides::from(args).apply(&mut config);

    let site = SiteRuntime::start(config)
        .await
        .context("Failed to start site")?;
    info!(address = %site.local_addr(), "Running. Press Ctrl+C to stop.");

    wait_for_shutdown().await?;
    info!("Shutdown signal received, stopping site...");

    site.shutdown().await.context("Failed to stop site cleanly")?;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => result.context("Failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    Ok(())
}
