//! Replication channel effect.
//!
//! A publish/subscribe primitive carrying serialized operations between sites.
//! Subscribers receive [`Delivery`] values that must be settled: acknowledged,
//! rejected (terminal), or dropped. A dropped delivery counts as a negative
//! acknowledgement; durable subscriptions redeliver it.

use crate::errors::SyncResult;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// How a subscription treats unacknowledged messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Messages are delivered once; settlement is ignored
    #[default]
    FireAndForget,
    /// Negatively acknowledged messages are redelivered
    Durable,
}

/// Parameters for [`ReplicationChannel::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Delivery mode
    pub mode: DeliveryMode,
    /// Consumer name; durable transports key their cursor on it
    pub consumer: String,
}

impl SubscribeOptions {
    /// Fire-and-forget subscription
    pub fn fire_and_forget(consumer: impl Into<String>) -> Self {
        Self {
            mode: DeliveryMode::FireAndForget,
            consumer: consumer.into(),
        }
    }

    /// Durable, acknowledged subscription
    pub fn durable(consumer: impl Into<String>) -> Self {
        Self {
            mode: DeliveryMode::Durable,
            consumer: consumer.into(),
        }
    }
}

/// Final state of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Processed; never deliver again
    Ack,
    /// Permanently undeliverable; never deliver again
    Reject,
    /// Not processed; deliver again if the subscription is durable
    Nack,
}

/// Transport-side hook invoked exactly once per delivery.
pub trait Acknowledger: Send {
    /// Report how the delivery was settled
    fn settle(self: Box<Self>, settlement: Settlement);
}

/// One received message.
pub struct Delivery {
    payload: Vec<u8>,
    attempt: u32,
    acker: Option<Box<dyn Acknowledger>>,
}

impl Delivery {
    /// Create a delivery; `attempt` starts at 1.
    pub fn new(payload: Vec<u8>, attempt: u32, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            payload,
            attempt,
            acker: Some(acker),
        }
    }

    /// Delivery that needs no settlement
    pub fn unacknowledged(payload: Vec<u8>) -> Self {
        Self {
            payload,
            attempt: 1,
            acker: None,
        }
    }

    /// Raw message bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// How many times this message has been delivered, including this one
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Acknowledge successful processing
    pub fn ack(self) {
        self.settle(Settlement::Ack);
    }

    /// Reject as permanently undeliverable
    pub fn reject(self) {
        self.settle(Settlement::Reject);
    }

    /// Negatively acknowledge; durable subscriptions redeliver
    pub fn nack(self) {
        self.settle(Settlement::Nack);
    }

    fn settle(mut self, settlement: Settlement) {
        if let Some(acker) = self.acker.take() {
            acker.settle(settlement);
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(acker) = self.acker.take() {
            acker.settle(Settlement::Nack);
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("len", &self.payload.len())
            .field("attempt", &self.attempt)
            .field("settled", &self.acker.is_none())
            .finish()
    }
}

/// Receiving half of a subscription.
#[derive(Debug)]
pub struct Subscription {
    subject: String,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    /// Wrap a delivery receiver
    pub fn new(subject: impl Into<String>, rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            subject: subject.into(),
            rx,
        }
    }

    /// Subject this subscription listens on
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Next delivery; `None` once the transport closed the subscription
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Next delivery if one is already queued
    pub fn try_next(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

/// Publish/subscribe effects.
#[async_trait]
pub trait ReplicationChannel: Send + Sync {
    /// Publish a payload on a subject
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> SyncResult<()>;

    /// Subscribe to a subject
    async fn subscribe(&self, subject: &str, options: SubscribeOptions)
        -> SyncResult<Subscription>;

    /// Close underlying connections
    async fn close(&self) -> SyncResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<Settlement>>>);

    impl Acknowledger for Recorder {
        fn settle(self: Box<Self>, settlement: Settlement) {
            self.0.lock().unwrap().push(settlement);
        }
    }

    fn delivery(log: &Arc<Mutex<Vec<Settlement>>>) -> Delivery {
        Delivery::new(b"x".to_vec(), 1, Box::new(Recorder(Arc::clone(log))))
    }

    #[test]
    fn each_delivery_settles_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        delivery(&log).ack();
        delivery(&log).reject();
        delivery(&log).nack();
        drop(delivery(&log));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Settlement::Ack,
                Settlement::Reject,
                Settlement::Nack,
                Settlement::Nack
            ]
        );
    }

    #[test]
    fn unacknowledged_delivery_settles_silently() {
        let d = Delivery::unacknowledged(b"x".to_vec());
        assert_eq!(d.payload(), b"x");
        d.ack();
    }
}
