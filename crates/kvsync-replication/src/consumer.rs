//! Remote operation apply path.
//!
//! Each delivery moves through:
//!
//! ```text
//! Received -> Decoded -> Filtered -> Resolved -> Applied | Skipped -> Acked
//!                |                                  |
//!                +-> Rejected                       +-> any failure: Nacked
//! ```
//!
//! Applying is idempotent: an operation already applied carries the version
//! now recorded for its key, and an identical version never wins, so a
//! redelivered or duplicated operation is skipped.

use crate::apply::apply_to_store;
use kvsync_core::effects::{Delivery, ReplicationChannel, SubscribeOptions, Subscription};
use kvsync_core::wire::decode_operation;
use kvsync_core::{lww, Operation, Replica, SyncResult, Version};
use tokio::sync::watch;

/// Why an operation was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Published by this site
    OwnEcho,
    /// Targets a bucket this site does not replicate
    ForeignBucket,
    /// Same version as the one already recorded
    Duplicate,
    /// Loses against the recorded version
    Stale,
}

/// Result of handling one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Written to the store and recorded
    Applied(Version),
    /// Left the store untouched
    Skipped(SkipReason),
}

/// Delivery counters of one consumer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Operations applied
    pub applied: u64,
    /// Operations filtered or resolved away
    pub skipped: u64,
    /// Undecodable deliveries rejected
    pub rejected: u64,
    /// Deliveries left unacknowledged after an apply failure
    pub failed: u64,
}

/// Applies operations published by other sites.
#[derive(Debug, Clone)]
pub struct ReplicationConsumer {
    replica: Replica,
    subject: String,
    options: SubscribeOptions,
}

impl ReplicationConsumer {
    /// Consumer for `subject` subscribing with `options`
    pub fn new(replica: Replica, subject: impl Into<String>, options: SubscribeOptions) -> Self {
        Self {
            replica,
            subject: subject.into(),
            options,
        }
    }

    /// Replica this consumer applies to
    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Open this consumer's subscription on `channel`
    pub async fn subscribe(&self, channel: &dyn ReplicationChannel) -> SyncResult<Subscription> {
        channel.subscribe(&self.subject, self.options.clone()).await
    }

    /// Decode a payload and handle the operation it carries.
    pub async fn handle_payload(&self, payload: &[u8]) -> SyncResult<ConsumeOutcome> {
        let op = decode_operation(payload)?;
        self.handle_operation(&op).await
    }

    /// Filter, resolve and conditionally apply one operation.
    ///
    /// On a store failure the metadata store is left untouched, so the same
    /// operation still wins when it is redelivered.
    pub async fn handle_operation(&self, op: &Operation) -> SyncResult<ConsumeOutcome> {
        let replica = &self.replica;
        if op.origin == replica.node {
            return Ok(ConsumeOutcome::Skipped(SkipReason::OwnEcho));
        }
        if op.bucket != replica.bucket {
            return Ok(ConsumeOutcome::Skipped(SkipReason::ForeignBucket));
        }

        replica.clock.observe(op.timestamp);

        let _guard = replica.locks.lock(&replica.bucket, &op.key).await;
        let candidate = op.version();
        let incumbent = replica.metadata.get(&op.bucket, &op.key);

        if !lww::wins(&candidate, incumbent.as_ref()) {
            let reason = if incumbent.as_ref() == Some(&candidate) {
                SkipReason::Duplicate
            } else {
                SkipReason::Stale
            };
            return Ok(ConsumeOutcome::Skipped(reason));
        }

        apply_to_store(replica.store.as_ref(), op).await?;
        replica.metadata.set(&op.bucket, &op.key, candidate.clone());
        Ok(ConsumeOutcome::Applied(candidate))
    }

    /// Handle one delivery and settle it.
    ///
    /// Applied and skipped operations are acknowledged and undecodable
    /// payloads are rejected. Any failure after decoding leaves the delivery
    /// unacknowledged for redelivery, whatever the error kind.
    pub async fn process(&self, delivery: Delivery, stats: &mut ConsumerStats) {
        let op = match decode_operation(delivery.payload()) {
            Ok(op) => op,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting undecodable operation");
                stats.rejected += 1;
                delivery.reject();
                return;
            }
        };

        match self.handle_operation(&op).await {
            Ok(ConsumeOutcome::Applied(version)) => {
                tracing::debug!(
                    key = %op.key,
                    origin = %version.origin,
                    ts = version.timestamp,
                    tombstone = version.tombstone,
                    "Applied remote operation"
                );
                stats.applied += 1;
                delivery.ack();
            }
            Ok(ConsumeOutcome::Skipped(reason)) => {
                tracing::trace!(key = %op.key, ?reason, "Skipped remote operation");
                stats.skipped += 1;
                delivery.ack();
            }
            Err(e) => {
                tracing::warn!(
                    key = %op.key,
                    error = %e,
                    attempt = delivery.attempt(),
                    "Apply failed, leaving operation unacknowledged"
                );
                stats.failed += 1;
                delivery.nack();
            }
        }
    }

    /// Process deliveries until the subscription closes or `shutdown` turns
    /// true. A delivery already being processed is finished first.
    pub async fn run(
        &self,
        mut subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) -> ConsumerStats {
        let mut stats = ConsumerStats::default();
        tracing::info!(
            subject = %subscription.subject(),
            node = %self.replica.node,
            mode = ?self.options.mode,
            "Replication consumer started"
        );

        while !*shutdown.borrow() {
            let delivery = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = subscription.next() => match next {
                    Some(delivery) => delivery,
                    None => {
                        tracing::info!("Subscription closed");
                        break;
                    }
                },
            };
            self.process(delivery, &mut stats).await;
        }

        tracing::info!(
            applied = stats.applied,
            skipped = stats.skipped,
            rejected = stats.rejected,
            failed = stats.failed,
            "Replication consumer stopped"
        );
        stats
    }
}
