//! # Event Contract
//!
//! Application events published to and consumed from the bus.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A typed application event.
///
/// Implementors declare the broker topic the event travels on. By
/// convention `TOPIC` is the event's type name. Two distinct event types
/// registered on one bus instance must not share a topic; the
/// subscription registry rejects the collision at registration time
/// instead of letting the types shadow each other on the wire.
///
/// Events are JSON-encoded for transport, so the payload must round-trip
/// through `serde`.
pub trait Event: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Broker topic this event is produced to and consumed from.
    const TOPIC: &'static str;
}

/// Topic identity for an event type.
///
/// Pure and deterministic. Used identically by the publisher (to pick the
/// produce target) and by the dispatcher (to resolve the event type for a
/// received topic).
#[must_use]
pub fn topic_of<E: Event>() -> &'static str {
    E::TOPIC
}
