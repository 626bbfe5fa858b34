//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → PumpListener::close → queued connections closed → consumer sees Closed
//! ```
//!
//! # Design Decisions
//! - One token per process; everything long-running watches it
//! - Shutdown never interrupts a handler already running

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::spawn_signal_handler;
