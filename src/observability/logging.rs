//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber from `ObservabilityConfig`
//! - Honor `RUST_LOG` over the configured level
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - Logs go to stderr; stdout stays free for the consumer

use std::io;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.log_format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init(),
        _ => registry.with(fmt::layer().with_writer(io::stderr)).try_init(),
    };
    installed.is_ok()
}
