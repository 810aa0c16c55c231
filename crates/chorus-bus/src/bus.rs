//! # Event Bus
//!
//! The facade application code talks to: register typed handlers, publish
//! typed events, and let the supervisor manage the background consume
//! loop.

use crate::config::{BusConfig, ConfigError};
use crate::publisher::{EventPublisher, PublishError};
use crate::registry::{SubscribeError, SubscriptionRegistry};
use crate::retry::RetryPolicy;
use crate::supervisor::{ConsumeLoopSupervisor, LoopState};
use chorus_types::{Broker, BrokerError, Event, EventHandler};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Errors from bus construction.
#[derive(Debug, Error)]
pub enum BusError {
    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The producer channel could not be opened.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// In-process event bus over an external message broker.
///
/// One instance owns one produce channel, one subscription registry, and
/// at most one background consume loop.
pub struct EventBus {
    registry: Arc<SubscriptionRegistry>,
    publisher: EventPublisher,
    supervisor: ConsumeLoopSupervisor,
}

impl EventBus {
    /// Validate the configuration, open the produce channel, and
    /// assemble the bus.
    ///
    /// The consume loop starts lazily: construction calls
    /// [`ensure_running`](ConsumeLoopSupervisor::ensure_running), which
    /// is a no-op until at least one subscription exists.
    pub async fn connect(broker: Arc<dyn Broker>, config: BusConfig) -> Result<Self, BusError> {
        config.validate()?;
        let producer = broker.open_producer(&config.broker).await?;
        let registry = Arc::new(SubscriptionRegistry::new());
        let publisher = EventPublisher::new(
            producer,
            RetryPolicy::new(config.retry.max_attempts, config.retry.backoff),
        );
        let supervisor =
            ConsumeLoopSupervisor::new(broker, config.broker, registry.clone());
        let bus = Self {
            registry,
            publisher,
            supervisor,
        };
        if let Err(err) = bus.supervisor.ensure_running().await {
            error!(error = %err, "consume loop did not start at construction");
        }
        info!("event bus connected");
        Ok(bus)
    }

    /// Register a handler for `E`.
    ///
    /// Rejects topic collisions between distinct event types and
    /// duplicate handler registrations. A topic subscribed after the
    /// consume loop has started is not read until the loop next
    /// restarts.
    pub fn subscribe<E: Event>(
        &self,
        handler: Arc<dyn EventHandler<E>>,
    ) -> Result<(), SubscribeError> {
        self.registry.add(handler)
    }

    /// Remove a handler registration for `E`.
    ///
    /// Returns whether anything was removed. Removing the last
    /// subscription signals the consume loop to shut down.
    pub fn unsubscribe<E: Event>(&self, handler_name: &str) -> bool {
        self.registry.remove::<E>(handler_name)
    }

    /// Publish one event; `true` means the broker durably persisted it.
    pub async fn publish<E: Event>(&self, event: &E) -> Result<bool, PublishError> {
        self.publish_with_cancel(event, &CancellationToken::new())
            .await
    }

    /// Publish with a caller-supplied cancellation signal.
    ///
    /// Cancellation surfaces as [`PublishError::Cancelled`] rather than
    /// a broker-status outcome. The first successful publish after the
    /// loop stopped revives consumption.
    pub async fn publish_with_cancel<E: Event>(
        &self,
        event: &E,
        cancel: &CancellationToken,
    ) -> Result<bool, PublishError> {
        let persisted = self.publisher.publish(event, cancel).await?;
        if persisted {
            if let Err(err) = self.supervisor.ensure_running().await {
                error!(error = %err, "consume loop restart after publish failed");
            }
        }
        Ok(persisted)
    }

    /// Dispose the bus: cancel the consume loop, release the consumer,
    /// and clear the registry. Idempotent.
    pub async fn shutdown(&self) {
        self.supervisor.stop().await;
        self.registry.clear();
        info!("event bus shut down");
    }

    /// Current consume loop state.
    pub async fn loop_state(&self) -> LoopState {
        self.supervisor.state().await
    }

    /// Number of consume loop starts over the bus lifetime.
    #[must_use]
    pub fn loop_starts(&self) -> u64 {
        self.supervisor.starts()
    }

    /// Total publish calls accepted.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.publisher.events_published()
    }

    /// Read access to the subscription registry.
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }
}
