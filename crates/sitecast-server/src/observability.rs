//! Tracing setup for the server binary.
//!
//! `logging.level` takes full filter directives (`info,sitecast_core=debug`).
//! A `RUST_LOG` in the environment replaces it entirely.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

pub fn parse_filter(directives: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(directives).map_err(|e| format!("invalid log filter `{directives}`: {e}"))
}

fn effective_filter(cfg: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| parse_filter(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(cfg: &LoggingConfig) {
    let _ = tracing_subscriber::registry()
        .with(effective_filter(cfg))
        .with(fmt::layer().with_ansi(cfg.ansi).with_target(cfg.target))
        .try_init();
}
