//! In-process backends for sitecast.
//!
//! [`InMemoryRegistry`] stores connection records in a papaya lock-free map and
//! [`InMemoryQueue`] is a visibility-timeout queue. Nothing survives a restart,
//! so these suit tests and single-node deployments.
//!
//! # Example
//!
//! ```ignore
//! use sitecast_core::ConnectionRegistry;
//! use sitecast_db_memory::InMemoryRegistry;
//!
//! let registry = InMemoryRegistry::new();
//! registry.register("conn-1", "weather").await?;
//! assert_eq!(registry.list_connections("weather").await?, vec!["conn-1"]);
//! ```

pub mod queue;
pub mod registry;

pub use queue::{DEFAULT_VISIBILITY_TIMEOUT, InMemoryQueue};
pub use registry::InMemoryRegistry;
