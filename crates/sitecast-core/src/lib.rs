//! Site-scoped publish/subscribe fan-out.
//!
//! ```text
//! publish event
//!        ↓
//! ingress queue → IngressConsumer
//!        ↓            ├─ ConnectionRegistry::list_connections(site)
//!        ↓            └─ partition::split(ids, chunk_size)
//! egress queue  (one DeliveryJob per partition)
//!        ↓
//! EgressConsumer → Dispatcher → TransportSender × connections
//! ```
//!
//! Storage, queues and transport are traits; backends live in the
//! `sitecast-db-*` crates and the server crate.

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod egress;
pub mod error;
pub mod ingress;
pub mod partition;
pub mod queue;
pub mod registry;
pub mod transport;
pub mod types;
pub mod worker;

pub use config::FanoutConfig;
pub use dispatcher::Dispatcher;
pub use egress::EgressConsumer;
pub use error::{FanoutError, SendError};
pub use ingress::IngressConsumer;
pub use queue::{MessageQueue, QueueMessage};
pub use registry::ConnectionRegistry;
pub use transport::TransportSender;
pub use types::*;
pub use worker::{BatchHandler, BatchSummary, QueueWorker, RecordOutcome};
