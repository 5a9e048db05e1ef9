//! PostgreSQL backends for sitecast.
//!
//! - [`PostgresRegistry`]: the connection registry, one row per connection
//! - [`PostgresQueue`]: at-least-once stage queue over a shared table
//!
//! # Example
//!
//! ```ignore
//! use sitecast_db_postgres::{PostgresConfig, PostgresRegistry, create_pool};
//!
//! let pool = create_pool(&PostgresConfig::new("postgres://localhost/sitecast")).await?;
//! let registry = PostgresRegistry::new(pool.clone());
//! ```

mod config;
mod error;
pub mod migrations;
mod pool;
mod queue;
mod registry;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result};
pub use pool::{PgPoolOptions, create_pool, mask_password};
pub use queue::PostgresQueue;
pub use registry::PostgresRegistry;
pub use sqlx_postgres::PgPool;
