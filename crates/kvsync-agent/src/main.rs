//! kvsyncd: replicating key-value site daemon.
//!
//! `kvsyncd run` starts a site. `put`, `delete` and `dump` talk to a running
//! site over its peer port.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{
    dump,
    run::{self, RunArgs},
    write,
};

#[derive(Parser)]
#[command(name = "kvsyncd")]
#[command(about = "Last-writer-wins replication of a key-value bucket", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a site until interrupted
    Run(RunArgs),

    /// Write a key through a running site
    Put {
        /// Key to write
        key: String,
        /// Value to store
        value: String,
        /// Peer address of the site
        #[arg(short, long, default_value = "127.0.0.1:4222")]
        site: String,
    },

    /// Delete a key through a running site
    Delete {
        /// Key to delete
        key: String,
        /// Peer address of the site
        #[arg(short, long, default_value = "127.0.0.1:4222")]
        site: String,
    },

    /// Print every key held by a running site
    Dump {
        /// Peer address of the site
        #[arg(short, long, default_value = "127.0.0.1:4222")]
        site: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run(args) => run::handle_run(args, cli.config.as_deref()).await?,
        Commands::Put { key, value, site } => write::handle_put(&site, &key, &value).await?,
        Commands::Delete { key, site } => write::handle_delete(&site, &key).await?,
        Commands::Dump { site } => dump::handle_dump(&site).await?,
    }

    Ok(())
}
