//! # Chorus Memory Broker
//!
//! In-memory implementation of the broker channel contracts.
//!
//! Uses per-topic append-only offsets and an unbounded queue per
//! consumer. Suitable for single-process operation and tests;
//! distributed deployments plug a real broker client in behind the same
//! traits (e.g., Kafka, Redis streams).
//!
//! ## Fault Injection
//!
//! Tests drive the bus's failure paths deterministically:
//! - [`fail_next_produces`](MemoryBroker::fail_next_produces) makes the
//!   next N sends fail with a transient produce error.
//! - [`force_ack_status`](MemoryBroker::force_ack_status) overrides the
//!   acknowledgment status of subsequent sends.
//! - [`fail_next_receives`](MemoryBroker::fail_next_receives) makes the
//!   next N receives fail with a transient consume error.
//! - [`inject`](MemoryBroker::inject) drops a message straight into a
//!   topic without a producer channel.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use async_trait::async_trait;
use chorus_types::{
    Broker, BrokerConfig, BrokerError, BrokerMessage, ConsumerChannel, Envelope,
    PersistenceStatus, ProduceAck, ProducerChannel,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One registered consume channel: its topic filter plus the queue that
/// feeds it.
struct ConsumerSlot {
    id: u64,
    topics: Vec<String>,
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

#[derive(Default)]
struct FaultPlan {
    fail_produces: u32,
    fail_receives: u32,
    ack_status: Option<PersistenceStatus>,
}

struct BrokerInner {
    /// Next offset per topic.
    offsets: Mutex<HashMap<String, u64>>,
    consumers: Mutex<Vec<ConsumerSlot>>,
    faults: Mutex<FaultPlan>,
    next_consumer_id: AtomicU64,
    producers_opened: AtomicU64,
    consumers_opened: AtomicU64,
    produce_calls: AtomicU64,
    messages_produced: AtomicU64,
}

impl BrokerInner {
    /// Append to the topic log and fan out to the consumers subscribed
    /// to the topic right now. Disconnected consumers are dropped.
    fn deliver(&self, topic: &str, envelope: Envelope) -> u64 {
        let offset = {
            let mut offsets = self.offsets.lock();
            let slot = offsets.entry(topic.to_string()).or_insert(0);
            let offset = *slot;
            *slot += 1;
            offset
        };
        let message = BrokerMessage {
            topic: topic.to_string(),
            key: envelope.key,
            value: envelope.value,
            offset,
        };
        let mut consumers = self.consumers.lock();
        consumers.retain(|slot| {
            if !slot.topics.iter().any(|subscribed| subscribed == topic) {
                return true;
            }
            slot.tx.send(message.clone()).is_ok()
        });
        offset
    }
}

/// In-memory broker for single-process use and tests.
///
/// Cloning is cheap; every clone shares the same topics, consumers, and
/// fault plan.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                offsets: Mutex::new(HashMap::new()),
                consumers: Mutex::new(Vec::new()),
                faults: Mutex::new(FaultPlan::default()),
                next_consumer_id: AtomicU64::new(0),
                producers_opened: AtomicU64::new(0),
                consumers_opened: AtomicU64::new(0),
                produce_calls: AtomicU64::new(0),
                messages_produced: AtomicU64::new(0),
            }),
        }
    }

    /// Fail the next `count` produce calls with a transient error.
    pub fn fail_next_produces(&self, count: u32) {
        self.inner.faults.lock().fail_produces = count;
    }

    /// Fail the next `count` receive calls with a transient error.
    pub fn fail_next_receives(&self, count: u32) {
        self.inner.faults.lock().fail_receives = count;
    }

    /// Force the given acknowledgment status on subsequent produces.
    pub fn force_ack_status(&self, status: PersistenceStatus) {
        self.inner.faults.lock().ack_status = Some(status);
    }

    /// Restore normal acknowledgment behavior.
    pub fn clear_ack_status(&self) {
        self.inner.faults.lock().ack_status = None;
    }

    /// Drop a message straight into a topic, bypassing producer channels
    /// and fault injection. Returns the assigned offset.
    pub fn inject(&self, topic: &str, envelope: Envelope) -> u64 {
        self.inner.deliver(topic, envelope)
    }

    /// Drop every consumer registration, closing their channels.
    pub fn disconnect_consumers(&self) {
        self.inner.consumers.lock().clear();
    }

    /// Produce channels opened so far.
    #[must_use]
    pub fn producers_opened(&self) -> u64 {
        self.inner.producers_opened.load(Ordering::Relaxed)
    }

    /// Consume channels opened so far.
    #[must_use]
    pub fn consumers_opened(&self) -> u64 {
        self.inner.consumers_opened.load(Ordering::Relaxed)
    }

    /// Produce calls attempted, including injected failures.
    #[must_use]
    pub fn produce_calls(&self) -> u64 {
        self.inner.produce_calls.load(Ordering::Relaxed)
    }

    /// Messages durably appended to a topic log.
    #[must_use]
    pub fn messages_produced(&self) -> u64 {
        self.inner.messages_produced.load(Ordering::Relaxed)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn open_producer(
        &self,
        _config: &BrokerConfig,
    ) -> Result<Arc<dyn ProducerChannel>, BrokerError> {
        self.inner.producers_opened.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MemoryProducer {
            inner: self.inner.clone(),
        }))
    }

    async fn open_consumer(
        &self,
        _config: &BrokerConfig,
    ) -> Result<Box<dyn ConsumerChannel>, BrokerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_consumer_id.fetch_add(1, Ordering::Relaxed);
        self.inner.consumers.lock().push(ConsumerSlot {
            id,
            topics: Vec::new(),
            tx,
        });
        self.inner.consumers_opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryConsumer {
            inner: self.inner.clone(),
            id,
            rx,
        }))
    }
}

/// Produce channel into a [`MemoryBroker`].
pub struct MemoryProducer {
    inner: Arc<BrokerInner>,
}

#[async_trait]
impl ProducerChannel for MemoryProducer {
    async fn send(&self, topic: &str, envelope: Envelope) -> Result<ProduceAck, BrokerError> {
        self.inner.produce_calls.fetch_add(1, Ordering::Relaxed);
        {
            let mut faults = self.inner.faults.lock();
            if faults.fail_produces > 0 {
                faults.fail_produces -= 1;
                return Err(BrokerError::Produce(
                    "injected transient produce failure".into(),
                ));
            }
            match faults.ack_status {
                Some(PersistenceStatus::NotPersisted) => {
                    return Ok(ProduceAck::not_persisted("injected: message not persisted"));
                }
                Some(PersistenceStatus::Error) => {
                    return Ok(ProduceAck::error("injected broker error"));
                }
                Some(PersistenceStatus::Persisted) | None => {}
            }
        }
        self.inner.messages_produced.fetch_add(1, Ordering::Relaxed);
        let offset = self.inner.deliver(topic, envelope);
        Ok(ProduceAck::persisted(offset))
    }
}

/// Consume channel out of a [`MemoryBroker`].
pub struct MemoryConsumer {
    inner: Arc<BrokerInner>,
    id: u64,
    rx: mpsc::UnboundedReceiver<BrokerMessage>,
}

#[async_trait]
impl ConsumerChannel for MemoryConsumer {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BrokerError> {
        let mut consumers = self.inner.consumers.lock();
        let Some(slot) = consumers.iter_mut().find(|slot| slot.id == self.id) else {
            return Err(BrokerError::Closed);
        };
        slot.topics = topics.to_vec();
        Ok(())
    }

    async fn receive(&mut self) -> Result<BrokerMessage, BrokerError> {
        {
            let mut faults = self.inner.faults.lock();
            if faults.fail_receives > 0 {
                faults.fail_receives -= 1;
                return Err(BrokerError::Consume(
                    "injected transient consume failure".into(),
                ));
            }
        }
        match self.rx.recv().await {
            Some(message) => Ok(message),
            None => Err(BrokerError::Closed),
        }
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        self.inner
            .consumers
            .lock()
            .retain(|slot| slot.id != self.id);
    }
}
