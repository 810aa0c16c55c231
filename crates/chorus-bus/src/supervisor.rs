//! # Consume Loop Supervisor
//!
//! Owns the lifecycle of the single background consume loop. Start and
//! stop serialize on one mutex, so at most one loop is ever alive per bus
//! instance and the two transitions can never interleave.

use crate::dispatcher::Dispatcher;
use crate::registry::SubscriptionRegistry;
use chorus_types::{Broker, BrokerConfig, BrokerError, ConsumerChannel};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle states of the consume loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No loop is alive.
    Stopped,
    /// A consumer channel is being opened and subscribed.
    Starting,
    /// The background loop is reading from the broker.
    Running,
    /// An explicit stop is cancelling and joining the loop.
    Stopping,
}

struct LoopHandle {
    state: LoopState,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl LoopHandle {
    fn reset(&mut self) {
        self.state = LoopState::Stopped;
        self.cancel = None;
        self.task = None;
    }
}

struct LoopShared {
    handle: Mutex<LoopHandle>,
    starts: AtomicU64,
}

/// Supervisor owning at most one live consume loop.
///
/// Both bus construction and a successful publish call
/// [`ensure_running`](Self::ensure_running); the loop stops itself when
/// the registry empties and is stopped explicitly on shutdown.
pub struct ConsumeLoopSupervisor {
    broker: Arc<dyn Broker>,
    config: BrokerConfig,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<Dispatcher>,
    shared: Arc<LoopShared>,
}

impl ConsumeLoopSupervisor {
    /// Create a supervisor in the `Stopped` state.
    #[must_use]
    pub fn new(
        broker: Arc<dyn Broker>,
        config: BrokerConfig,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(registry.clone()));
        Self {
            broker,
            config,
            registry,
            dispatcher,
            shared: Arc::new(LoopShared {
                handle: Mutex::new(LoopHandle {
                    state: LoopState::Stopped,
                    cancel: None,
                    task: None,
                }),
                starts: AtomicU64::new(0),
            }),
        }
    }

    /// Start the consume loop if none is alive.
    ///
    /// Returns `Ok(true)` when a loop was started. No-op while a loop is
    /// already starting or running, and while the registry is empty (an
    /// empty registry and a stopped loop is the steady state). The topic
    /// set is snapshotted here; topics registered later are invisible
    /// until the next start.
    pub async fn ensure_running(&self) -> Result<bool, BrokerError> {
        let mut handle = self.shared.handle.lock().await;
        match handle.state {
            LoopState::Starting | LoopState::Stopping => return Ok(false),
            LoopState::Running => {
                // A loop that stopped itself may not have swung the state
                // back yet; only a finished task is eligible for restart.
                if handle.task.as_ref().is_some_and(|task| !task.is_finished()) {
                    return Ok(false);
                }
                handle.reset();
            }
            LoopState::Stopped => {}
        }

        let emptied = self.registry.emptied();
        if self.registry.is_empty() {
            return Ok(false);
        }

        handle.state = LoopState::Starting;
        let topics = self.registry.active_topics();

        let mut consumer = match self.broker.open_consumer(&self.config).await {
            Ok(consumer) => consumer,
            Err(err) => {
                error!(error = %err, "failed to open consumer channel");
                handle.reset();
                return Err(err);
            }
        };
        if let Err(err) = consumer.subscribe(&topics).await {
            error!(error = %err, "failed to subscribe consumer channel");
            handle.reset();
            return Err(err);
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(consume_loop(
            consumer,
            self.dispatcher.clone(),
            emptied,
            cancel.clone(),
            self.shared.clone(),
        ));
        handle.cancel = Some(cancel);
        handle.task = Some(task);
        handle.state = LoopState::Running;
        self.shared.starts.fetch_add(1, Ordering::Relaxed);
        info!(?topics, "consume loop started");
        Ok(true)
    }

    /// Cancel the running loop and wait for it to exit. Idempotent.
    pub async fn stop(&self) {
        let (cancel, task) = {
            let mut handle = self.shared.handle.lock().await;
            if handle.state != LoopState::Running {
                return;
            }
            handle.state = LoopState::Stopping;
            (handle.cancel.take(), handle.task.take())
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "consume loop task join failed");
            }
        }
        self.shared.handle.lock().await.reset();
        debug!("consume loop stopped");
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LoopState {
        self.shared.handle.lock().await.state
    }

    /// Number of loop starts over the supervisor's lifetime.
    #[must_use]
    pub fn starts(&self) -> u64 {
        self.shared.starts.load(Ordering::Relaxed)
    }
}

/// The background loop body.
///
/// Exits on cancellation, on the registry emptying, or on the broker
/// closing the channel. Every other consume failure is logged and
/// absorbed. Messages are dispatched one at a time, in delivery order.
async fn consume_loop(
    mut consumer: Box<dyn ConsumerChannel>,
    dispatcher: Arc<Dispatcher>,
    mut emptied: watch::Receiver<bool>,
    cancel: CancellationToken,
    shared: Arc<LoopShared>,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("consume loop cancellation requested");
                break;
            }
            changed = emptied.changed() => {
                if changed.is_err() || *emptied.borrow_and_update() {
                    info!("subscription registry emptied; consume loop shutting down");
                    break;
                }
            }
            received = consumer.receive() => match received {
                Ok(message) => dispatcher.dispatch(&message).await,
                Err(BrokerError::Closed) => {
                    warn!("broker closed the consume channel; consume loop shutting down");
                    break;
                }
                Err(err) => {
                    error!(error = %err, "transient consume failure; loop continues");
                }
            },
        }
    }
    // Release the consumer before the state swings back, so a restart
    // never sees two live channels.
    drop(consumer);
    let mut handle = shared.handle.lock().await;
    if handle.state == LoopState::Running {
        handle.reset();
    }
}
