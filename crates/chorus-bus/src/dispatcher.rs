//! # Dispatcher
//!
//! Routes each consumed message to the handlers registered for its
//! topic. Runs on the consume loop's task, one message at a time.

use crate::registry::SubscriptionRegistry;
use chorus_types::BrokerMessage;
use std::sync::Arc;
use tracing::trace;

/// Per-message dispatch over the subscription registry.
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over the registry.
    #[must_use]
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch one consumed message.
    ///
    /// A message whose topic has no active subscriptions is dropped here;
    /// the broker has already acknowledged it. Handlers run sequentially
    /// in registration order, and a failing handler never prevents the
    /// ones after it from running.
    pub async fn dispatch(&self, message: &BrokerMessage) {
        let Some(entry) = self.registry.entry(&message.topic) else {
            trace!(
                topic = %message.topic,
                key = %message.key,
                "no subscriptions for topic; message dropped"
            );
            return;
        };
        entry
            .dispatch(&message.topic, &message.key, &message.value)
            .await;
    }
}
