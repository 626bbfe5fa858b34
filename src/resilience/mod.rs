//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Raw accept fails with a transient error:
//!     → backoff.rs (delay grows per consecutive failure, jittered)
//!     → retry accept
//!     → after max_consecutive failures: treat as fatal, stop accepting
//! ```
//!
//! # Design Decisions
//! - Accept never spins: every transient failure waits at least base_ms
//! - A successful accept resets the failure run
//! - The ceiling is optional; unlimited keeps a listener alive through fd exhaustion

pub mod backoff;

pub use backoff::{calculate_backoff, AcceptRetryPolicy};
