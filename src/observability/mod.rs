//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loop, handler tasks, hand-off queue produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout/stderr (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields: connection_id and remote on every per-connection event
//! - Metric updates are no-ops until a recorder is installed
//! - Initialization is idempotent so tests and embedders can call it freely

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
