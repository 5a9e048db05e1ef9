//! Error types for the PostgreSQL backend.

use sitecast_core::FanoutError;

#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx_core::error::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for FanoutError {
    fn from(err: PostgresError) -> Self {
        FanoutError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PostgresError>;
