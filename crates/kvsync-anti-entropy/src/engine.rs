//! Reconciliation cycle.

use crate::pure::{plan_key, KeyPlan};
use kvsync_core::effects::{KvEntry, KvStore};
use kvsync_core::{Replica, SyncResult};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Counters for one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Keys present on either side
    pub examined: usize,
    /// Keys written to the peer
    pub pushed: usize,
    /// Keys written locally
    pub pulled: usize,
    /// Keys needing no write
    pub converged: usize,
    /// Keys skipped after an error
    pub failed: usize,
}

/// What reconciling one key did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResult {
    /// Nothing written
    Converged,
    /// Local entry copied to the peer
    Pushed,
    /// Peer entry copied locally
    Pulled,
}

/// Converges this site's store with one peer's store.
///
/// Holds long-lived handles to both stores; [`close`](Self::close) releases
/// the peer handle on shutdown.
#[derive(Clone)]
pub struct ReconciliationEngine {
    replica: Replica,
    peer: Arc<dyn KvStore>,
}

impl ReconciliationEngine {
    /// Engine reconciling `replica` against `peer`
    pub fn new(replica: Replica, peer: Arc<dyn KvStore>) -> Self {
        Self { replica, peer }
    }

    /// Local replica
    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Run one full pass over the union of both sides' keys.
    ///
    /// Fails only if either side's keys cannot be listed. Per-key failures
    /// are logged and counted in the report.
    pub async fn run_cycle(&self) -> SyncResult<ReconcileReport> {
        let mut keys: BTreeSet<String> = self.replica.store.keys().await?.into_iter().collect();
        keys.extend(self.peer.keys().await?);

        let mut report = ReconcileReport::default();
        for key in &keys {
            report.examined += 1;
            match self.reconcile_key(key).await {
                Ok(KeyResult::Converged) => report.converged += 1,
                Ok(KeyResult::Pushed) => report.pushed += 1,
                Ok(KeyResult::Pulled) => report.pulled += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Reconciliation skipped key");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            pushed = report.pushed,
            pulled = report.pulled,
            converged = report.converged,
            failed = report.failed,
            "Reconciliation cycle complete"
        );
        Ok(report)
    }

    /// Converge a single key.
    ///
    /// Runs under the key's local lock so local writes and remote applies of
    /// the key wait for it.
    pub async fn reconcile_key(&self, key: &str) -> SyncResult<KeyResult> {
        let replica = &self.replica;
        let _guard = replica.locks.lock(&replica.bucket, key).await;

        let local = replica.store.get(key).await?;
        let peer = self.peer.get(key).await?;

        for entry in [&local, &peer].into_iter().flatten() {
            replica.clock.observe(entry.write_ts);
        }

        match plan_key(&replica.node, local.as_ref(), peer.as_ref()) {
            KeyPlan::Absent | KeyPlan::Converged => Ok(KeyResult::Converged),
            KeyPlan::Push(entry) => {
                write_entry(self.peer.as_ref(), key, &entry).await?;
                tracing::debug!(key, tombstone = entry.tombstone, "Pushed key to peer");
                Ok(KeyResult::Pushed)
            }
            KeyPlan::Pull { entry, winner } => {
                write_entry(replica.store.as_ref(), key, &entry).await?;
                replica.metadata.set_if_newer(&replica.bucket, key, winner);
                tracing::debug!(key, tombstone = entry.tombstone, "Pulled key from peer");
                Ok(KeyResult::Pulled)
            }
        }
    }

    /// Release the peer handle
    pub async fn close(&self) -> SyncResult<()> {
        self.peer.close().await
    }
}

impl fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("replica", &self.replica)
            .finish_non_exhaustive()
    }
}

async fn write_entry(store: &dyn KvStore, key: &str, entry: &KvEntry) -> SyncResult<()> {
    if entry.tombstone {
        store.delete(key).await
    } else {
        store
            .put(key, entry.value.as_deref().unwrap_or_default())
            .await
    }
}
