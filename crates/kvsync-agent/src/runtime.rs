//! Site runtime: builds every component from an [`AgentConfig`] and runs
//! the background tasks.

use crate::config::AgentConfig;
use crate::task_registry::{TaskRegistry, DEFAULT_GRACE};
use kvsync_anti_entropy::ReconciliationEngine;
use kvsync_core::effects::{KvStore, ReplicationChannel, SubscribeOptions};
use kvsync_core::{Replica, SyncResult};
use kvsync_replication::{LocalWriteGateway, ReplicationConsumer};
use kvsync_store::{LogKvStore, MemoryKvStore};
use kvsync_transport::{MemoryBus, PeerServer, RemoteKvStore, ServerHandlers, TcpChannel};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// A running site.
///
/// Owns the peer server, the replication consumer and, when a peer is
/// configured, the reconciliation ticker. Local writes go through
/// [`gateway`](Self::gateway).
pub struct SiteRuntime {
    config: AgentConfig,
    address: SocketAddr,
    replica: Replica,
    gateway: Arc<LocalWriteGateway>,
    channel: Arc<TcpChannel>,
    engine: Option<ReconciliationEngine>,
    tasks: TaskRegistry,
}

impl SiteRuntime {
    /// Validate `config`, open the store, bind the server and spawn tasks.
    pub async fn start(config: AgentConfig) -> SyncResult<Self> {
        config.validate()?;
        let sync = &config.sync;
        let node = sync.node()?;

        let store: Arc<dyn KvStore> = match config.log_path() {
            Some(path) => Arc::new(LogKvStore::open(path).await?),
            None => {
                tracing::warn!("No data directory configured, using a volatile store");
                Arc::new(MemoryKvStore::new())
            }
        };
        let replica = Replica::new(sync.bucket.clone(), node, store);

        let bus = MemoryBus::new();
        let channel = Arc::new(TcpChannel::new(bus.clone(), sync.publish_targets()));
        let gateway = Arc::new(LocalWriteGateway::new(
            replica.clone(),
            channel.clone(),
            sync.subject.clone(),
        ));

        let server = PeerServer::bind(
            &sync.local_address,
            ServerHandlers {
                inbound: Arc::new(bus),
                replica: replica.clone(),
                writes: Some(gateway.clone()),
            },
        )
        .await?;
        let address = server.local_addr()?;

        let options = if sync.durable {
            SubscribeOptions::durable(sync.consumer_name())
        } else {
            SubscribeOptions::fire_and_forget(sync.consumer_name())
        };
        let consumer = ReplicationConsumer::new(replica.clone(), sync.subject.clone(), options);
        let subscription = consumer.subscribe(channel.as_ref()).await?;

        let tasks = TaskRegistry::new();
        let shutdown = tasks.shutdown_signal();
        tasks.spawn("peer-server", async move {
            if let Err(e) = server.serve(shutdown).await {
                tracing::error!(error = %e, "Peer server failed");
            }
        });

        let shutdown = tasks.shutdown_signal();
        tasks.spawn("replication-consumer", async move {
            consumer.run(subscription, shutdown).await;
        });

        let engine = match (&sync.peer_address, sync.reconcile_interval()) {
            (Some(peer), Some(period)) => {
                let engine =
                    ReconciliationEngine::new(replica.clone(), Arc::new(RemoteKvStore::new(peer)));
                let ticker = engine.clone();
                let shutdown = tasks.shutdown_signal();
                tasks.spawn("reconciliation", async move {
                    ticker.run_periodic(period, shutdown).await;
                });
                Some(engine)
            }
            _ => {
                tracing::info!("Reconciliation disabled");
                None
            }
        };

        tracing::info!(
            node = %replica.node,
            bucket = %replica.bucket,
            %address,
            peers = ?sync.publish_targets(),
            durable = sync.durable,
            "Site started"
        );

        Ok(Self {
            config,
            address,
            replica,
            gateway,
            channel,
            engine,
            tasks,
        })
    }

    /// Address the peer server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Effective configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Local replica state
    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Local write entry point
    pub fn gateway(&self) -> &Arc<LocalWriteGateway> {
        &self.gateway
    }

    /// Reconciliation engine, if a peer is configured
    pub fn engine(&self) -> Option<&ReconciliationEngine> {
        self.engine.as_ref()
    }

    /// Stop with the default grace period
    pub async fn shutdown(self) -> SyncResult<()> {
        self.shutdown_within(DEFAULT_GRACE).await
    }

    /// Stop every task, then close the channel, peer handle and store.
    pub async fn shutdown_within(self, grace: Duration) -> SyncResult<()> {
        tracing::info!(node = %self.replica.node, "Site stopping");
        self.tasks.shutdown(grace).await;

        self.channel.close().await?;
        if let Some(engine) = &self.engine {
            engine.close().await?;
        }
        self.replica.store.close().await?;
        tracing::info!(node = %self.replica.node, "Site stopped");
        Ok(())
    }
}

impl fmt::Debug for SiteRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteRuntime")
            .field("node", &self.replica.node)
            .field("address", &self.address)
            .field("reconciling", &self.engine.is_some())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
