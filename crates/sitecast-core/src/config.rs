use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FanoutError;

/// Tuning for the fan-out pipeline, handed to each component at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Maximum number of connections per delivery job
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Upper bound for a single transport send
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Sends in flight at once within one job
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
    /// Queue messages pulled per worker poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_connection_ttl_secs")]
    pub connection_ttl_secs: i64,
}

fn default_chunk_size() -> usize {
    10
}
fn default_send_timeout_ms() -> u64 {
    5_000
}
fn default_max_concurrent_sends() -> usize {
    10
}
fn default_batch_size() -> usize {
    10
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_connection_ttl_secs() -> i64 {
    86_400
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            send_timeout_ms: default_send_timeout_ms(),
            max_concurrent_sends: default_max_concurrent_sends(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            connection_ttl_secs: default_connection_ttl_secs(),
        }
    }
}

impl FanoutConfig {
    pub fn validate(&self) -> Result<(), FanoutError> {
        if self.chunk_size == 0 {
            return Err(FanoutError::InvalidConfig("fanout.chunk_size must be > 0".into()));
        }
        if self.send_timeout_ms == 0 {
            return Err(FanoutError::InvalidConfig(
                "fanout.send_timeout_ms must be > 0".into(),
            ));
        }
        if self.max_concurrent_sends == 0 {
            return Err(FanoutError::InvalidConfig(
                "fanout.max_concurrent_sends must be > 0".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(FanoutError::InvalidConfig("fanout.batch_size must be > 0".into()));
        }
        if self.connection_ttl_secs <= 0 {
            return Err(FanoutError::InvalidConfig(
                "fanout.connection_ttl_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Falls back to one connection per job if the value was never validated.
    pub fn chunk_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.chunk_size).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connection_ttl(&self) -> time::Duration {
        time::Duration::seconds(self.connection_ttl_secs)
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_send_timeout_ms(mut self, timeout: u64) -> Self {
        self.send_timeout_ms = timeout;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_sends(mut self, n: usize) -> Self {
        self.max_concurrent_sends = n;
        self
    }
}
