//! # Subscription Registry
//!
//! Tracks which topics have which handlers registered. The registry is
//! the single piece of mutable state shared between the foreground
//! (registration calls) and the background consume loop; it serializes
//! its own mutations and signals emptiness over a watch channel so the
//! loop can shut itself down without a callback into it.

use async_trait::async_trait;
use chorus_types::{Event, EventHandler};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error};

/// Errors from subscription registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    /// Two distinct event types declared the same topic.
    #[error("topic '{topic}' is already registered by a different event type")]
    TopicCollision {
        /// The contested topic name.
        topic: &'static str,
    },

    /// The handler is already subscribed to this event type.
    #[error("handler '{handler}' is already subscribed to topic '{topic}'")]
    DuplicateHandler {
        /// The topic the handler was registered on.
        topic: &'static str,
        /// The duplicated handler identity.
        handler: &'static str,
    },
}

/// Type-erased per-topic subscription entry.
///
/// Owns the decode-and-dispatch step so the dispatcher never names a
/// concrete event type.
#[async_trait]
pub(crate) trait TopicEntry: Send + Sync {
    fn event_type(&self) -> TypeId;
    fn handler_names(&self) -> Vec<&'static str>;
    fn as_any(&self) -> &dyn Any;

    /// Decode the payload once and run every handler in registration
    /// order, isolating failures per handler.
    async fn dispatch(&self, topic: &str, key: &str, payload: &str);
}

struct TypedEntry<E: Event> {
    handlers: Vec<Arc<dyn EventHandler<E>>>,
}

#[async_trait]
impl<E: Event> TopicEntry for TypedEntry<E> {
    fn event_type(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn dispatch(&self, topic: &str, key: &str, payload: &str) {
        let event = match serde_json::from_str::<E>(payload) {
            Ok(event) => event,
            Err(err) => {
                error!(
                    topic,
                    key,
                    payload,
                    error = %err,
                    "failed to deserialize event payload; message dropped"
                );
                return;
            }
        };
        for handler in &self.handlers {
            if let Err(err) = handler.handle(event.clone()).await {
                error!(
                    topic,
                    key,
                    payload,
                    handler = handler.name(),
                    error = %err,
                    "event handler failed"
                );
            }
        }
    }
}

/// Maps topic names to the handlers registered for them.
///
/// Mutations go through [`add`](Self::add), [`remove`](Self::remove),
/// and [`clear`](Self::clear); the consume loop only reads entries and
/// watches the emptied channel.
pub struct SubscriptionRegistry {
    topics: RwLock<HashMap<&'static str, Arc<dyn TopicEntry>>>,
    emptied_tx: watch::Sender<bool>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (emptied_tx, _) = watch::channel(true);
        Self {
            topics: RwLock::new(HashMap::new()),
            emptied_tx,
        }
    }

    /// Register a handler for `E`.
    ///
    /// Rejects a topic claimed by a different event type and duplicate
    /// registration of the same handler identity for the same event.
    pub fn add<E: Event>(
        &self,
        handler: Arc<dyn EventHandler<E>>,
    ) -> Result<(), SubscribeError> {
        let name = handler.name();
        let mut topics = self.topics.write();
        let entry: Arc<dyn TopicEntry> = match topics.get(E::TOPIC) {
            Some(existing) => {
                if existing.event_type() != TypeId::of::<E>() {
                    return Err(SubscribeError::TopicCollision { topic: E::TOPIC });
                }
                let Some(typed) = existing.as_any().downcast_ref::<TypedEntry<E>>() else {
                    return Err(SubscribeError::TopicCollision { topic: E::TOPIC });
                };
                if typed.handlers.iter().any(|h| h.name() == name) {
                    return Err(SubscribeError::DuplicateHandler {
                        topic: E::TOPIC,
                        handler: name,
                    });
                }
                let mut handlers = typed.handlers.clone();
                handlers.push(handler);
                Arc::new(TypedEntry { handlers })
            }
            None => Arc::new(TypedEntry::<E> {
                handlers: vec![handler],
            }),
        };
        topics.insert(E::TOPIC, entry);
        drop(topics);
        self.emptied_tx.send_if_modified(|empty| {
            let was_empty = *empty;
            *empty = false;
            was_empty
        });
        debug!(topic = E::TOPIC, handler = name, "subscription added");
        Ok(())
    }

    /// Remove a handler registration for `E`.
    ///
    /// Returns whether anything was removed. Removing the last handler of
    /// the last topic flips the emptied channel, which tells the consume
    /// loop to shut down.
    pub fn remove<E: Event>(&self, handler_name: &str) -> bool {
        let mut topics = self.topics.write();
        let Some(existing) = topics.get(E::TOPIC) else {
            return false;
        };
        let Some(typed) = existing.as_any().downcast_ref::<TypedEntry<E>>() else {
            return false;
        };
        let mut handlers = typed.handlers.clone();
        let before = handlers.len();
        handlers.retain(|handler| handler.name() != handler_name);
        if handlers.len() == before {
            return false;
        }
        if handlers.is_empty() {
            topics.remove(E::TOPIC);
        } else {
            topics.insert(E::TOPIC, Arc::new(TypedEntry { handlers }));
        }
        let now_empty = topics.is_empty();
        drop(topics);
        self.emptied_tx.send_if_modified(|empty| {
            let changed = *empty != now_empty;
            *empty = now_empty;
            changed
        });
        debug!(topic = E::TOPIC, handler = handler_name, "subscription removed");
        true
    }

    /// Whether any handler is registered for the topic.
    #[must_use]
    pub fn has_subscriptions(&self, topic: &str) -> bool {
        self.topics.read().contains_key(topic)
    }

    /// Handler identities registered for the topic, in registration order.
    #[must_use]
    pub fn handler_names(&self, topic: &str) -> Vec<&'static str> {
        self.topics
            .read()
            .get(topic)
            .map(|entry| entry.handler_names())
            .unwrap_or_default()
    }

    /// Names of all topics with at least one handler.
    #[must_use]
    pub fn active_topics(&self) -> Vec<String> {
        self.topics
            .read()
            .keys()
            .map(|topic| (*topic).to_string())
            .collect()
    }

    /// Whether no subscriptions exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.read().is_empty()
    }

    /// Number of topics with at least one handler.
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.read().len()
    }

    /// Drop every subscription. Flips the emptied channel.
    pub fn clear(&self) {
        self.topics.write().clear();
        self.emptied_tx.send_if_modified(|empty| {
            let was_full = !*empty;
            *empty = true;
            was_full
        });
    }

    /// A receiver over the emptied flag. The consume loop selects on this
    /// to learn that the last subscription went away.
    #[must_use]
    pub fn emptied(&self) -> watch::Receiver<bool> {
        self.emptied_tx.subscribe()
    }

    pub(crate) fn entry(&self, topic: &str) -> Option<Arc<dyn TopicEntry>> {
        self.topics.read().get(topic).cloned()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
