use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FanoutError {
    /// Malformed input is never worth redelivering.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

impl From<serde_json::Error> for FanoutError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Failure to push a payload to one connection.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection is closed or was never known to this transport.
    #[error("Connection gone: {connection_id}")]
    Gone { connection_id: String },

    #[error("Send to {connection_id} timed out after {after:?}")]
    Timeout {
        connection_id: String,
        after: Duration,
    },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl SendError {
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone { .. })
    }
}
