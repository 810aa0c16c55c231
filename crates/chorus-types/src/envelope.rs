//! # Wire Envelope
//!
//! The key/value pair exchanged with the broker, in both directions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One produced message as handed to the broker.
///
/// The key is generated fresh per publish and carries no semantic
/// meaning; it is not used for partition affinity or idempotency beyond
/// whatever the broker itself does with keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Opaque unique identifier for this message.
    pub key: String,
    /// JSON-encoded event payload.
    pub value: String,
}

impl Envelope {
    /// Create an envelope with a fresh UUID v4 key.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            key: Uuid::new_v4().to_string(),
            value: value.into(),
        }
    }

    /// Create an envelope with a caller-chosen key.
    #[must_use]
    pub fn with_key(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One consumed message as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Envelope key as produced.
    pub key: String,
    /// JSON-encoded event payload.
    pub value: String,
    /// Broker-assigned partition offset.
    pub offset: u64,
}
