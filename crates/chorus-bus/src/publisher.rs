//! # Event Publisher
//!
//! Serializes typed events and submits them to the broker through the
//! retry policy.

use crate::retry::{RetryError, RetryPolicy};
use chorus_types::{Envelope, Event, PersistenceStatus, ProducerChannel};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Publish failures that propagate to the caller as errors.
///
/// Broker-status failures do not appear here; they are reported through
/// the `Ok(false)` return of [`EventPublisher::publish`].
#[derive(Debug, Error)]
pub enum PublishError {
    /// The caller-supplied cancellation signal fired while the publish
    /// was in flight.
    #[error("publish cancelled")]
    Cancelled,

    /// The event could not be JSON-encoded. Happens before submission
    /// and is never retried.
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Publishing side of the bus.
///
/// Holds the produce channel opened at bus construction and reuses it
/// for every publish.
pub struct EventPublisher {
    producer: Arc<dyn ProducerChannel>,
    retry: RetryPolicy,
    events_published: AtomicU64,
}

impl EventPublisher {
    /// Create a publisher over an open produce channel.
    #[must_use]
    pub fn new(producer: Arc<dyn ProducerChannel>, retry: RetryPolicy) -> Self {
        Self {
            producer,
            retry,
            events_published: AtomicU64::new(0),
        }
    }

    /// Publish one event and report whether the broker durably persisted
    /// it.
    ///
    /// Transient produce failures are retried per the policy; any other
    /// broker outcome is reported as `Ok(false)` with an error log.
    /// Cancellation surfaces as [`PublishError::Cancelled`], distinct
    /// from every broker-status outcome.
    pub async fn publish<E: Event>(
        &self,
        event: &E,
        cancel: &CancellationToken,
    ) -> Result<bool, PublishError> {
        let payload = serde_json::to_string(event)?;
        let envelope = Envelope::new(payload);
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let outcome = self
            .retry
            .run(cancel, || self.producer.send(E::TOPIC, envelope.clone()))
            .await;

        match outcome {
            Ok(ack) => match ack.status {
                PersistenceStatus::Persisted => {
                    debug!(
                        topic = E::TOPIC,
                        key = %envelope.key,
                        offset = ack.offset,
                        "event persisted"
                    );
                    Ok(true)
                }
                PersistenceStatus::NotPersisted | PersistenceStatus::Error => {
                    error!(
                        topic = E::TOPIC,
                        key = %envelope.key,
                        status = ?ack.status,
                        detail = ack.detail.as_deref().unwrap_or("unknown"),
                        "event not persisted"
                    );
                    Ok(false)
                }
            },
            Err(RetryError::Cancelled) => Err(PublishError::Cancelled),
            Err(RetryError::Failed(err)) => {
                error!(
                    topic = E::TOPIC,
                    key = %envelope.key,
                    error = %err,
                    "publish failed after retries"
                );
                Ok(false)
            }
        }
    }

    /// Total publish calls accepted by this publisher.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
