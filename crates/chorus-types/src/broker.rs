//! # Broker Channel Contracts
//!
//! Trait boundary between the bus and the external message-broker client.
//! The bus never names a concrete client; durability, partitioning, offset
//! management, and consumer-group mechanics all live behind these traits.

use crate::envelope::{BrokerMessage, Envelope};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Broker connection parameters, passed verbatim to channel `open` calls.
///
/// The bus treats this as opaque settings; only the broker implementation
/// interprets the fields.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Bootstrap broker addresses.
    pub brokers: Vec<String>,
    /// Consumer group identity for the consume channel.
    pub group_id: String,
    /// Client identity reported to the broker.
    pub client_id: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            group_id: "chorus".to_string(),
            client_id: "chorus-bus".to_string(),
        }
    }
}

/// Errors raised by broker channels.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Transient produce failure: the broker rejected or timed out the
    /// send. The only category the retry policy retries.
    #[error("produce failed: {0}")]
    Produce(String),

    /// Transient consume failure, distinct from cancellation.
    #[error("consume failed: {0}")]
    Consume(String),

    /// A channel could not be opened.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// The broker closed the channel.
    #[error("broker channel closed")]
    Closed,
}

impl BrokerError {
    /// Whether this failure is in the transient produce category that is
    /// eligible for retry.
    #[must_use]
    pub fn is_transient_produce(&self) -> bool {
        matches!(self, Self::Produce(_))
    }
}

/// Broker acknowledgment status for a produced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceStatus {
    /// The message is durably committed to the broker log.
    Persisted,
    /// The broker accepted the call but did not durably persist the
    /// message.
    NotPersisted,
    /// The broker reported an error for the send.
    Error,
}

/// Acknowledgment returned by a produce call.
#[derive(Debug, Clone)]
pub struct ProduceAck {
    /// Persistence status of the message.
    pub status: PersistenceStatus,
    /// Broker-assigned offset, present when the message was persisted.
    pub offset: Option<u64>,
    /// Failure detail for non-persisted statuses.
    pub detail: Option<String>,
}

impl ProduceAck {
    /// Acknowledgment for a durably persisted message.
    #[must_use]
    pub fn persisted(offset: u64) -> Self {
        Self {
            status: PersistenceStatus::Persisted,
            offset: Some(offset),
            detail: None,
        }
    }

    /// Acknowledgment for a message the broker accepted but did not
    /// durably persist.
    #[must_use]
    pub fn not_persisted(detail: impl Into<String>) -> Self {
        Self {
            status: PersistenceStatus::NotPersisted,
            offset: None,
            detail: Some(detail.into()),
        }
    }

    /// Acknowledgment for a send the broker errored on.
    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: PersistenceStatus::Error,
            offset: None,
            detail: Some(detail.into()),
        }
    }

    /// Whether the message is durably persisted.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.status == PersistenceStatus::Persisted
    }
}

/// Produce side of a broker client.
#[async_trait]
pub trait ProducerChannel: Send + Sync {
    /// Send one envelope to a topic and return the broker acknowledgment.
    ///
    /// Transient send failures are reported as [`BrokerError::Produce`].
    async fn send(&self, topic: &str, envelope: Envelope) -> Result<ProduceAck, BrokerError>;
}

/// Consume side of a broker client.
///
/// One channel per consume loop instance; dropping the channel releases
/// the broker resource.
#[async_trait]
pub trait ConsumerChannel: Send + Sync {
    /// Subscribe the channel to the given set of topics.
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BrokerError>;

    /// Block until the next message arrives.
    ///
    /// Returns [`BrokerError::Consume`] for transient failures and
    /// [`BrokerError::Closed`] once the broker has shut the channel.
    /// Cancellation is handled by the caller racing this future against
    /// its cancellation scope.
    async fn receive(&mut self) -> Result<BrokerMessage, BrokerError>;
}

/// Factory for broker channels.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a produce channel.
    async fn open_producer(
        &self,
        config: &BrokerConfig,
    ) -> Result<Arc<dyn ProducerChannel>, BrokerError>;

    /// Open a consume channel.
    async fn open_consumer(
        &self,
        config: &BrokerConfig,
    ) -> Result<Box<dyn ConsumerChannel>, BrokerError>;
}
