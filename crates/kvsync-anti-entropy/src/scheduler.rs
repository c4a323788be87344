//! Periodic reconciliation.

use crate::engine::ReconciliationEngine;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

impl ReconciliationEngine {
    /// Run a cycle every `period` until `shutdown` turns true.
    ///
    /// The first cycle runs one period after start. A cycle that overruns
    /// the period delays the next one instead of queueing catch-up cycles.
    /// Failed cycles are logged and retried on the next tick. Returns the
    /// number of cycles run.
    pub async fn run_periodic(&self, period: Duration, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            node = %self.replica().node,
            period_ms = period.as_millis() as u64,
            "Reconciliation scheduled"
        );

        let mut cycles = 0;
        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    cycles += 1;
                    if let Err(e) = self.run_cycle().await {
                        tracing::warn!(error = %e, cycle = cycles, "Reconciliation cycle failed");
                    }
                }
            }
        }

        tracing::info!(cycles, "Reconciliation stopped");
        cycles
    }
}
