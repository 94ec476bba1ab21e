//! Logging initialization
//!
//! `RUST_LOG` always takes precedence over the configured filter. Repeated
//! initialization is a no-op, so tests and embedding nodes can call these
//! freely.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn build_filter(filter: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let filter = filter.unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    })
}

fn use_ansi() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

/// Initialize human-readable logging
pub fn init_logging(filter: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(filter))
        .with_target(true)
        .with_ansi(use_ansi())
        .try_init();
}

/// Initialize JSON logging (for log aggregation systems)
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(build_filter(filter))
        .with_current_span(false)
        .try_init();
}

/// Initialize logging from an optional configuration section
pub fn init_logging_from_config(config: Option<&LoggingConfig>) {
    let filter = config.and_then(|c| c.filter.as_deref());
    let json_format = config.map(|c| c.json_format).unwrap_or(false);
    init_formatted(filter, json_format);
}

#[cfg(feature = "json-logging")]
fn init_formatted(filter: Option<&str>, json_format: bool) {
    if json_format {
        init_json_logging(filter);
    } else {
        init_logging(filter);
    }
}

#[cfg(not(feature = "json-logging"))]
fn init_formatted(filter: Option<&str>, json_format: bool) {
    init_logging(filter);
    if json_format {
        tracing::warn!("JSON logging requested but the json-logging feature is disabled");
    }
}
