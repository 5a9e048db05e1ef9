use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use sitecast_core::{
    ConnectionRegistry, Dispatcher, EgressConsumer, IngressConsumer, MessageQueue, QueueWorker,
};
use sitecast_db_memory::{InMemoryQueue, InMemoryRegistry};
use sitecast_db_postgres::{PostgresQueue, PostgresRegistry, create_pool};

use crate::config::{AppConfig, StorageBackend};
use crate::handlers;
use crate::hub::ConnectionHub;

/// Shared handles for request handlers and queue workers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn ConnectionRegistry>,
    pub ingress: Arc<dyn MessageQueue>,
    pub egress: Arc<dyn MessageQueue>,
    pub hub: Arc<ConnectionHub>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Process-local registry and queues.
    pub fn in_memory(cfg: AppConfig) -> Self {
        let visibility = cfg.queues.visibility_timeout();
        Self {
            registry: Arc::new(InMemoryRegistry::with_ttl(cfg.fanout.connection_ttl())),
            ingress: Arc::new(InMemoryQueue::with_visibility_timeout(
                cfg.queues.ingress.clone(),
                visibility,
            )),
            egress: Arc::new(InMemoryQueue::with_visibility_timeout(
                cfg.queues.egress.clone(),
                visibility,
            )),
            hub: Arc::new(ConnectionHub::new()),
            config: Arc::new(cfg),
        }
    }

    pub async fn from_config(cfg: AppConfig) -> anyhow::Result<Self> {
        match cfg.storage.backend {
            StorageBackend::Memory => Ok(Self::in_memory(cfg)),
            StorageBackend::Postgres => {
                let pool = create_pool(&cfg.storage.postgres).await?;
                let visibility = cfg.queues.visibility_timeout();
                Ok(Self {
                    registry: Arc::new(PostgresRegistry::with_ttl(
                        pool.clone(),
                        cfg.fanout.connection_ttl(),
                    )),
                    ingress: Arc::new(PostgresQueue::new(
                        pool.clone(),
                        cfg.queues.ingress.clone(),
                        visibility,
                    )),
                    egress: Arc::new(PostgresQueue::new(pool, cfg.queues.egress.clone(), visibility)),
                    hub: Arc::new(ConnectionHub::new()),
                    config: Arc::new(cfg),
                })
            }
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/publish", post(handlers::publish))
        .route(
            "/connections/{connection_id}/subscription",
            post(handlers::update_connection_subscription),
        )
        .route("/ws", get(handlers::ws_connect))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Start the ingress and egress workers. They stop once `shutdown` is set to `true`.
pub fn spawn_workers(state: &AppState, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let fanout = &state.config.fanout;
    let mut handles = Vec::new();

    for _ in 0..state.config.queues.ingress_workers {
        let consumer = IngressConsumer::new(state.registry.clone(), state.egress.clone(), fanout);
        let worker = QueueWorker::new(state.ingress.clone(), consumer, fanout);
        handles.push(tokio::spawn(worker.run(shutdown.clone())));
    }

    for _ in 0..state.config.queues.egress_workers {
        let consumer = EgressConsumer::new(Dispatcher::new(state.hub.clone(), fanout));
        let worker = QueueWorker::new(state.egress.clone(), consumer, fanout);
        handles.push(tokio::spawn(worker.run(shutdown.clone())));
    }

    tracing::info!(workers = handles.len(), "Queue workers started");
    handles
}

pub struct SitecastServer {
    addr: SocketAddr,
    state: AppState,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<SitecastServer> {
        let state = AppState::from_config(self.config).await?;
        Ok(SitecastServer {
            addr: self.addr,
            state,
        })
    }
}

impl SitecastServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = spawn_workers(&self.state, &shutdown_rx);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, build_app(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await;

        let _ = shutdown_tx.send(true);
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Queue worker ended abnormally");
            }
        }
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
