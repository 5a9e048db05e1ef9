//! HTTP and WebSocket front end for sitecast.
//!
//! Clients open `GET /ws?site=S` and receive every event published to `S`.
//! Producers `POST /publish`; the ingress and egress queue workers spawned
//! by [`server::spawn_workers`] do the fan-out in the background.

pub mod config;
pub mod handlers;
pub mod hub;
pub mod lifecycle;
pub mod observability;
pub mod response;
pub mod server;

pub use hub::ConnectionHub;
pub use observability::init_tracing;
pub use response::ApiResponse;
pub use server::{AppState, ServerBuilder, SitecastServer, build_app, spawn_workers};
