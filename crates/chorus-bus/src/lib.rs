//! # Chorus Bus - Typed Event Bus over an External Broker
//!
//! Application code publishes typed events and registers typed handlers
//! without depending on the underlying message-broker client.
//!
//! ```text
//! ┌─────────────┐  publish()   ┌───────────────────┐   send()   ┌────────┐
//! │ Application │ ───────────► │ Publisher + Retry │ ─────────► │        │
//! │             │              └───────────────────┘            │ Broker │
//! │  handlers   │              ┌───────────────────┐  receive() │ client │
//! │             │ ◄─────────── │ Dispatcher ◄─ loop│ ◄───────── │        │
//! └─────────────┘   handle()   └───────────────────┘            └────────┘
//! ```
//!
//! ## Lifecycle
//!
//! - Registering handlers populates the subscription registry; removing
//!   the last one signals the background consume loop to stop.
//! - Publishing retries transient produce failures with bounded backoff.
//!   The first successful publish after the loop stopped revives it.
//! - Each consumed message is dispatched to every handler registered for
//!   its topic, in registration order, with per-handler fault isolation.
//!
//! ## Failure Policy
//!
//! Nothing on the consume side terminates the background loop except
//! explicit shutdown, the registry becoming empty, or the broker closing
//! the channel. Publish callers see `Ok(true)` / `Ok(false)` for broker
//! outcomes and an error only for cancellation or a payload that cannot
//! be encoded.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod publisher;
pub mod registry;
pub mod retry;
pub mod supervisor;

pub use bus::{BusError, EventBus};
pub use config::{BusConfig, ConfigError, RetryConfig};
pub use dispatcher::Dispatcher;
pub use publisher::{EventPublisher, PublishError};
pub use registry::{SubscribeError, SubscriptionRegistry};
pub use retry::{Backoff, RetryError, RetryPolicy};
pub use supervisor::{ConsumeLoopSupervisor, LoopState};

use std::time::Duration;

/// Default total produce attempts per publish.
pub const DEFAULT_MAX_PUBLISH_ATTEMPTS: u32 = 3;

/// Default base delay for exponential publish backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Default cap for exponential publish backoff.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(5);
