//! Connection configuration.
//!
//! Defaults cover most uses. `from_env` lets a deployment tune them without a
//! rebuild:
//!
//! | Variable | Field |
//! |---|---|
//! | `RPC_MAX_CONCURRENT_CALLS` | `max_concurrent_calls` |
//! | `RPC_CHANNEL_CAPACITY` | `channel_capacity` |
//! | `RPC_CALL_TIMEOUT_MS` | `default_timeout` |

use std::env;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

/// Default maximum concurrent handlers per connection.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 256;

/// Default capacity of the inbound message channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Upper bound for `max_concurrent_calls` and `channel_capacity`.
pub const MAX_LIMIT: usize = Semaphore::MAX_PERMITS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("RPC_MAX_CONCURRENT_CALLS must be an integer between 1 and {max}", max = MAX_LIMIT)]
    InvalidMaxConcurrentCalls,
    #[error("RPC_CHANNEL_CAPACITY must be an integer between 1 and {max}", max = MAX_LIMIT)]
    InvalidChannelCapacity,
    #[error("RPC_CALL_TIMEOUT_MS must be a positive integer")]
    InvalidCallTimeout,
}

/// Settings for one client/server connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Calls served at once before new calls are refused with `Busy`.
    pub max_concurrent_calls: usize,
    /// Capacity of the channel carrying messages to the server.
    pub channel_capacity: usize,
    /// Deadline applied to client calls whose context has none.
    pub default_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            default_timeout: None,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the environment on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(limit) = positive(&lookup, "RPC_MAX_CONCURRENT_CALLS", MAX_LIMIT as u64)
            .map_err(|_| ConfigError::InvalidMaxConcurrentCalls)?
        {
            config.max_concurrent_calls = limit as usize;
        }
        if let Some(capacity) = positive(&lookup, "RPC_CHANNEL_CAPACITY", MAX_LIMIT as u64)
            .map_err(|_| ConfigError::InvalidChannelCapacity)?
        {
            config.channel_capacity = capacity as usize;
        }
        if let Some(ms) = positive(&lookup, "RPC_CALL_TIMEOUT_MS", u64::MAX)
            .map_err(|_| ConfigError::InvalidCallTimeout)?
        {
            config.default_timeout = Some(Duration::from_millis(ms));
        }

        Ok(config)
    }

    /// Set the maximum number of concurrent calls.
    ///
    /// Default: 256. Values outside `1..=MAX_LIMIT` are clamped on connect.
    pub fn max_concurrent_calls(mut self, limit: usize) -> Self {
        self.max_concurrent_calls = limit;
        self
    }

    /// Set the inbound channel capacity.
    ///
    /// Default: 1024. Values outside `1..=MAX_LIMIT` are clamped on connect.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the deadline for calls whose context has none.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }
}

/// Parse an optional integer variable in `1..=max`; blank counts as unset.
fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    max: u64,
) -> Result<Option<u64>, ()> {
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => match v.parse::<u64>() {
            Ok(n) if (1..=max).contains(&n) => Ok(Some(n)),
            _ => Err(()),
        },
    }
}
