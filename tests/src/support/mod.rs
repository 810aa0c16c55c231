//! Shared fixtures for the integration suite: event types, handlers,
//! and polling helpers.

use async_trait::async_trait;
use chorus_bus::{EventBus, LoopState};
use chorus_types::{Event, EventHandler, HandlerError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

/// Install a fmt subscriber honoring `RUST_LOG`, once per process.
///
/// Lets a failing flow be rerun with `RUST_LOG=chorus_bus=debug` to see
/// the retry and loop transitions.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        tracing::debug!("tracing initialized for chorus-tests");
    });
}

/// Order placement event used across the suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
    pub total_cents: u64,
    pub note: String,
}

impl Event for OrderCreated {
    const TOPIC: &'static str = "OrderCreated";
}

impl OrderCreated {
    pub fn sample(order_id: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            total_cents: 4_999,
            note: "gift wrap".to_string(),
        }
    }
}

/// Second event type, for multi-topic scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSettled {
    pub payment_id: String,
    pub order_id: String,
}

impl Event for PaymentSettled {
    const TOPIC: &'static str = "PaymentSettled";
}

/// Records every event it receives, under an explicit name so several
/// instances can share a topic.
pub struct RecordingHandler<E> {
    name: &'static str,
    received: Mutex<Vec<E>>,
}

impl<E> RecordingHandler<E> {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<E>
    where
        E: Clone,
    {
        self.received.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }
}

#[async_trait]
impl<E: Event> EventHandler<E> for RecordingHandler<E> {
    async fn handle(&self, event: E) -> Result<(), HandlerError> {
        self.received.lock().push(event);
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Fails every invocation, counting the attempts.
pub struct FailingHandler {
    name: &'static str,
    invocations: AtomicUsize,
}

impl FailingHandler {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            invocations: AtomicUsize::new(0),
        })
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: Event> EventHandler<E> for FailingHandler {
    async fn handle(&self, _event: E) -> Result<(), HandlerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::new("handler exploded"))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Appends its label to a shared log, for asserting invocation order.
pub struct SequenceHandler {
    label: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl SequenceHandler {
    pub fn new(label: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
        Arc::new(Self { label, log })
    }
}

#[async_trait]
impl<E: Event> EventHandler<E> for SequenceHandler {
    async fn handle(&self, _event: E) -> Result<(), HandlerError> {
        self.log.lock().push(self.label);
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

/// Poll until `predicate` holds or two seconds pass.
pub async fn wait_until(predicate: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    predicate()
}

/// Poll until the bus's consume loop reaches `want` or two seconds pass.
pub async fn wait_for_loop_state(bus: &EventBus, want: LoopState) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if bus.loop_state().await == want {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bus.loop_state().await == want
}
