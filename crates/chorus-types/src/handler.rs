//! # Handler Contract
//!
//! The single capability every event handler implements. The registry
//! stores handlers keyed by event-type identity, so dispatch involves no
//! runtime method lookup.

use crate::event::Event;
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by an event handler.
///
/// Handler failures are isolated per dispatch: the bus logs them with the
/// handler's identity and the raw payload, and they never abort
/// co-registered handlers or the consume loop.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// A typed event handler.
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync {
    /// Handle one deserialized event instance.
    async fn handle(&self, event: E) -> Result<(), HandlerError>;

    /// Handler identity, used for registration and failure logs.
    ///
    /// Defaults to the implementing type's name; override it when two
    /// instances of the same type must coexist on one topic.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
