use serde::{Deserialize, Serialize};
use sitecast_core::FanoutConfig;
use sitecast_db_postgres::PostgresConfig;
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Stage queue names and worker counts
    #[serde(default)]
    pub queues: QueueConfig,
    /// Partitioning and delivery tuning
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if self.storage.backend == StorageBackend::Postgres {
            if self.storage.postgres.url.is_empty() {
                return Err("storage.postgres.url must not be empty".into());
            }
            if self.storage.postgres.pool_size == 0 {
                return Err("storage.postgres.pool_size must be > 0".into());
            }
        }
        if self.queues.ingress == self.queues.egress {
            return Err("queues.ingress and queues.egress must differ".into());
        }
        if self.queues.ingress_workers == 0 || self.queues.egress_workers == 0 {
            return Err("queue worker counts must be > 0".into());
        }
        if self.queues.visibility_timeout_secs == 0 {
            return Err("queues.visibility_timeout_secs must be > 0".into());
        }
        self.fanout.validate().map_err(|e| e.to_string())?;
        crate::observability::parse_filter(&self.logging.level)
            .map_err(|e| format!("logging.level: {e}"))?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    256 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local registry and queues
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_ingress")]
    pub ingress: String,
    #[serde(default = "default_egress")]
    pub egress: String,
    /// Seconds a received message stays hidden before it is redelivered
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_ingress_workers")]
    pub ingress_workers: usize,
    #[serde(default = "default_egress_workers")]
    pub egress_workers: usize,
}

fn default_ingress() -> String {
    "ingress".into()
}
fn default_egress() -> String {
    "egress".into()
}
fn default_visibility_timeout_secs() -> u64 {
    30
}
fn default_ingress_workers() -> usize {
    1
}
fn default_egress_workers() -> usize {
    4
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ingress: default_ingress(),
            egress: default_egress(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            ingress_workers: default_ingress_workers(),
            egress_workers: default_egress_workers(),
        }
    }
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level or filter directives, e.g. `info,sitecast_core=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Colored output
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Include the event target (module path) in each line
    #[serde(default = "default_true")]
    pub target: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: true,
            target: true,
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Load from an optional TOML file, then `SITECAST__SECTION__KEY`
    /// environment overrides, then validate.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("sitecast.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        builder = builder.add_source(
            Environment::with_prefix("SITECAST")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
