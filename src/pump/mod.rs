//! Connection pump subsystem.
//!
//! # Data Flow
//! ```text
//! RawListener
//!     → ListenerWrapper::wrap (spawns the accept loop)
//!     → one task per connection running the handler chain (handler.rs)
//!     → ConnectionContext::pipe → hand-off queue (handoff.rs)
//!     → PumpListener::accept (listener.rs)
//! ```
//!
//! # Design Decisions
//! - Every accepted connection is closed exactly once, by the pump or by
//!   whoever accepted it from the hand-off queue
//! - The hand-off queue is bounded; a slow consumer slows handlers down
//! - The accept loop's terminal error reaches the consumer only after every
//!   queued connection has been delivered or closed

pub mod error;
pub mod handler;
pub mod handoff;
pub mod listener;

use std::sync::Arc;

use crate::config::PumpConfig;
use crate::net::buffer::BufferPool;
use crate::net::transport::RawListener;
use crate::resilience::AcceptRetryPolicy;

pub use error::{BoxError, PumpError};
pub use handler::{handler_fn, HandleOutcome, Handler, HandlerFn, Passthrough};
pub use handoff::Handoff;
pub use listener::PumpListener;

/// Tunables for one pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpSettings {
    /// Connections the hand-off queue holds before piping handlers wait.
    pub handoff_capacity: usize,
    /// Apply the keepalive policy to connections that support it.
    pub keepalive: bool,
    pub retry: AcceptRetryPolicy,
}

impl Default for PumpSettings {
    fn default() -> Self {
        Self {
            handoff_capacity: crate::config::schema::default_parallelism(),
            keepalive: true,
            retry: AcceptRetryPolicy::default(),
        }
    }
}

impl From<&PumpConfig> for PumpSettings {
    fn from(config: &PumpConfig) -> Self {
        Self {
            handoff_capacity: config.listener.effective_handoff_capacity(),
            keepalive: config.listener.keepalive,
            retry: AcceptRetryPolicy::from(&config.accept),
        }
    }
}

/// Wraps raw listeners so their connections go through a handler chain first.
///
/// One wrapper may wrap any number of listeners; each gets its own pump.
#[derive(Clone)]
pub struct ListenerWrapper {
    handler: Arc<dyn Handler>,
    pool: Arc<BufferPool>,
    settings: PumpSettings,
}

impl ListenerWrapper {
    /// Wrapper with default settings and the process-wide buffer pool.
    pub fn new<H: Handler>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            pool: BufferPool::global(),
            settings: PumpSettings::default(),
        }
    }

    pub fn from_config<H: Handler>(config: &PumpConfig, handler: H) -> Self {
        Self::new(handler).with_settings(PumpSettings::from(config))
    }

    pub fn with_settings(mut self, settings: PumpSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_handoff_capacity(mut self, capacity: usize) -> Self {
        self.settings.handoff_capacity = capacity;
        self
    }

    pub fn with_keepalive(mut self, enabled: bool) -> Self {
        self.settings.keepalive = enabled;
        self
    }

    pub fn with_retry_policy(mut self, retry: AcceptRetryPolicy) -> Self {
        self.settings.retry = retry;
        self
    }

    /// Draw connection buffers from `pool` instead of the process-wide one.
    pub fn with_buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn settings(&self) -> &PumpSettings {
        &self.settings
    }

    /// Start pumping `raw`. Must be called within a tokio runtime.
    ///
    /// The returned listener owns the pump: dropping or closing it stops the
    /// accept loop and closes the raw listener.
    pub fn wrap<L: RawListener>(&self, raw: L) -> PumpListener {
        PumpListener::spawn(
            raw,
            Arc::clone(&self.handler),
            Arc::clone(&self.pool),
            self.settings,
        )
    }
}

impl std::fmt::Debug for ListenerWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerWrapper")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
