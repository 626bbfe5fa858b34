//! Pump error types.

use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by failing handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the pump to its consumer and to handlers.
#[derive(Debug, Clone, Error)]
pub enum PumpError {
    /// The raw listener failed for good; this is the accept loop's terminal error.
    #[error("accepting connections failed: {0}")]
    Accept(#[source] Arc<std::io::Error>),

    /// The pump was closed and every queued connection has been consumed.
    #[error("pump listener closed")]
    Closed,

    /// The connection was already piped or otherwise detached from its context.
    #[error("connection already handed off")]
    StreamTaken,

    /// Nobody can receive hand-offs any more.
    #[error("hand-off channel closed")]
    HandoffClosed,
}

impl PumpError {
    /// The underlying I/O error for `Accept`.
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match self {
            PumpError::Accept(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PumpError {
    fn from(err: std::io::Error) -> Self {
        PumpError::Accept(Arc::new(err))
    }
}
