//! In-process publish/subscribe bus.
//!
//! Serves as the local broker of every site: tests publish and subscribe on
//! it directly, and the TCP server feeds operations received from peers into
//! it.
//!
//! - Fire-and-forget subscribers receive messages published while they are
//!   subscribed; settlement is ignored.
//! - Durable subscribers are keyed by `(subject, consumer)`. Messages stay
//!   retained until every durable consumer of the subject has acknowledged or
//!   rejected them. A negatively acknowledged message is redelivered after
//!   the retry delay. A consumer name seen for the first time starts at the
//!   end of the stream; resubscribing with a known name resumes from where
//!   the previous subscription left off, pending messages first.

use async_trait::async_trait;
use kvsync_core::effects::{
    Acknowledger, Delivery, DeliveryMode, ReplicationChannel, Settlement, SubscribeOptions,
    Subscription,
};
use kvsync_core::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

/// Delay before a negatively acknowledged message is redelivered.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

type ConsumerKey = (String, String);

#[derive(Debug, Default)]
struct Stream {
    base: u64,
    messages: VecDeque<Arc<[u8]>>,
}

impl Stream {
    fn end(&self) -> u64 {
        self.base + self.messages.len() as u64
    }

    fn get(&self, seq: u64) -> Option<Arc<[u8]>> {
        let offset = usize::try_from(seq.checked_sub(self.base)?).ok()?;
        self.messages.get(offset).cloned()
    }

    fn push(&mut self, message: Arc<[u8]>) -> u64 {
        self.messages.push_back(message);
        self.end() - 1
    }

    fn trim_below(&mut self, low: u64) {
        while self.base < low && self.messages.pop_front().is_some() {
            self.base += 1;
        }
    }
}

#[derive(Debug)]
struct DurableConsumer {
    next_seq: u64,
    /// Delivered but unsettled sequence numbers, with their attempt count
    pending: BTreeMap<u64, u32>,
    tx: Option<mpsc::UnboundedSender<Delivery>>,
}

#[derive(Debug, Default)]
struct BusState {
    offline: bool,
    published: u64,
    streams: HashMap<String, Stream>,
    ephemeral: HashMap<String, Vec<mpsc::UnboundedSender<Delivery>>>,
    durable: HashMap<ConsumerKey, DurableConsumer>,
}

impl BusState {
    fn has_durable(&self, subject: &str) -> bool {
        self.durable.keys().any(|(s, _)| s == subject)
    }

    fn durable_keys(&self, subject: &str) -> Vec<ConsumerKey> {
        self.durable
            .keys()
            .filter(|(s, _)| s == subject)
            .cloned()
            .collect()
    }

    /// Drop retained messages every durable consumer has settled.
    fn trim(&mut self, subject: &str) {
        let low = self
            .durable
            .iter()
            .filter(|((s, _), _)| s == subject)
            .map(|(_, c)| c.pending.keys().next().copied().unwrap_or(c.next_seq))
            .min();
        if let (Some(low), Some(stream)) = (low, self.streams.get_mut(subject)) {
            stream.trim_below(low);
        }
    }
}

/// In-process broker implementing [`ReplicationChannel`].
#[derive(Debug, Clone)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
    retry_delay: Duration,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Override the redelivery delay
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Make publishes fail, simulating a transport outage
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Number of successful publishes
    pub fn published(&self) -> u64 {
        self.state.lock().published
    }

    /// Unsettled deliveries of a durable consumer
    pub fn pending(&self, subject: &str, consumer: &str) -> usize {
        self.state
            .lock()
            .durable
            .get(&(subject.to_string(), consumer.to_string()))
            .map_or(0, |c| c.pending.len())
    }

    /// Messages retained for durable consumers of a subject
    pub fn retained(&self, subject: &str) -> usize {
        self.state
            .lock()
            .streams
            .get(subject)
            .map_or(0, |s| s.messages.len())
    }

    fn ack_handle(&self) -> AckHandle {
        AckHandle {
            state: Arc::downgrade(&self.state),
            retry_delay: self.retry_delay,
        }
    }
}

/// What the acknowledger needs to reach back into the bus.
#[derive(Debug, Clone)]
struct AckHandle {
    state: Weak<Mutex<BusState>>,
    retry_delay: Duration,
}

impl AckHandle {
    /// Send message `seq` to the consumer's live subscription.
    ///
    /// Returns a delivery that could not be sent; the caller must drop it
    /// after releasing the lock, since dropping settles it.
    fn dispatch(&self, state: &mut BusState, key: &ConsumerKey, seq: u64) -> Option<Delivery> {
        let payload = state.streams.get(&key.0)?.get(seq)?;
        let consumer = state.durable.get_mut(key)?;
        let tx = consumer.tx.as_ref()?;

        let attempt = {
            let attempts = consumer.pending.entry(seq).or_insert(0);
            *attempts += 1;
            *attempts
        };
        consumer.next_seq = consumer.next_seq.max(seq + 1);

        let acker = BusAcker {
            handle: self.clone(),
            key: key.clone(),
            seq,
        };
        match tx.send(Delivery::new(payload.to_vec(), attempt, Box::new(acker))) {
            Ok(()) => None,
            Err(mpsc::error::SendError(orphan)) => {
                consumer.tx = None;
                Some(orphan)
            }
        }
    }

    fn redeliver(&self, key: &ConsumerKey, seq: u64) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let orphan = {
            let mut state = state.lock();
            let still_pending = state
                .durable
                .get(key)
                .is_some_and(|c| c.pending.contains_key(&seq));
            if still_pending {
                self.dispatch(&mut state, key, seq)
            } else {
                None
            }
        };
        drop(orphan);
    }
}

struct BusAcker {
    handle: AckHandle,
    key: ConsumerKey,
    seq: u64,
}

impl Acknowledger for BusAcker {
    fn settle(self: Box<Self>, settlement: Settlement) {
        match settlement {
            Settlement::Ack | Settlement::Reject => {
                let Some(state) = self.handle.state.upgrade() else {
                    return;
                };
                let mut state = state.lock();
                if let Some(consumer) = state.durable.get_mut(&self.key) {
                    consumer.pending.remove(&self.seq);
                }
                state.trim(&self.key.0);
            }
            Settlement::Nack => {
                let BusAcker { handle, key, seq } = *self;
                match tokio::runtime::Handle::try_current() {
                    Ok(runtime) if !handle.retry_delay.is_zero() => {
                        runtime.spawn(async move {
                            tokio::time::sleep(handle.retry_delay).await;
                            handle.redeliver(&key, seq);
                        });
                    }
                    _ => handle.redeliver(&key, seq),
                }
            }
        }
    }
}

#[async_trait]
impl ReplicationChannel for MemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> SyncResult<()> {
        let handle = self.ack_handle();
        let orphans = {
            let mut state = self.state.lock();
            if state.offline {
                return Err(SyncError::transport("bus is offline"));
            }
            state.published += 1;

            if let Some(subscribers) = state.ephemeral.get_mut(subject) {
                subscribers.retain(|tx| tx.send(Delivery::unacknowledged(payload.clone())).is_ok());
            }

            if !state.has_durable(subject) {
                return Ok(());
            }
            let seq = state
                .streams
                .entry(subject.to_string())
                .or_default()
                .push(Arc::from(payload));
            state
                .durable_keys(subject)
                .iter()
                .filter_map(|key| handle.dispatch(&mut state, key, seq))
                .collect::<Vec<_>>()
        };
        drop(orphans);
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        options: SubscribeOptions,
    ) -> SyncResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();

        match options.mode {
            DeliveryMode::FireAndForget => {
                self.state
                    .lock()
                    .ephemeral
                    .entry(subject.to_string())
                    .or_default()
                    .push(tx);
            }
            DeliveryMode::Durable => {
                let handle = self.ack_handle();
                let key = (subject.to_string(), options.consumer.clone());
                let orphans = {
                    let mut state = self.state.lock();
                    let end = state.streams.entry(subject.to_string()).or_default().end();
                    let consumer = state
                        .durable
                        .entry(key.clone())
                        .or_insert_with(|| DurableConsumer {
                            next_seq: end,
                            pending: BTreeMap::new(),
                            tx: None,
                        });
                    consumer.tx = Some(tx);

                    let backlog: Vec<u64> = consumer
                        .pending
                        .keys()
                        .copied()
                        .chain(consumer.next_seq..end)
                        .collect();
                    tracing::debug!(
                        subject,
                        consumer = %options.consumer,
                        backlog = backlog.len(),
                        "Durable consumer attached"
                    );
                    backlog
                        .into_iter()
                        .filter_map(|seq| handle.dispatch(&mut state, &key, seq))
                        .collect::<Vec<_>>()
                };
                drop(orphans);
            }
        }

        Ok(Subscription::new(subject, rx))
    }

    async fn close(&self) -> SyncResult<()> {
        let mut state = self.state.lock();
        state.ephemeral.clear();
        for consumer in state.durable.values_mut() {
            consumer.tx = None;
        }
        Ok(())
    }
}
