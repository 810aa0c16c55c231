//! # Bus Configuration
//!
//! Opaque settings supplied at bus construction: broker connection
//! parameters plus the publish retry policy.

use crate::retry::Backoff;
use crate::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_MAX_PUBLISH_ATTEMPTS};
use chorus_types::BrokerConfig;
use thiserror::Error;

/// Publish retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total produce attempts per publish. Must be at least 1.
    pub max_attempts: u32,
    /// Backoff between attempts.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_PUBLISH_ATTEMPTS,
            backoff: Backoff::Exponential {
                base: DEFAULT_BACKOFF_BASE,
                cap: DEFAULT_BACKOFF_CAP,
            },
        }
    }
}

/// Complete bus configuration.
#[derive(Debug, Clone, Default)]
pub struct BusConfig {
    /// Broker connection parameters.
    pub broker: BrokerConfig,
    /// Publish retry policy.
    pub retry: RetryConfig,
}

impl BusConfig {
    /// Validate configuration before connecting.
    ///
    /// # Returns
    ///
    /// Returns `Err` if:
    /// - `retry.max_attempts` is zero
    /// - `broker.group_id` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.broker.group_id.is_empty() {
            return Err(ConfigError::EmptyGroupId);
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// At least one produce attempt is required per publish.
    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,

    /// The consume channel needs a consumer group identity.
    #[error("broker.group_id must not be empty")]
    EmptyGroupId,
}
