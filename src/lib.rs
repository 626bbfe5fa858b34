//! Layer-4 connection pump.
//!
//! Wraps a raw stream listener so that every accepted connection first runs
//! through a handler chain. The chain either finishes with the connection
//! (the pump closes it) or pipes it onward, in which case it comes out of the
//! wrapper's own `accept` together with any TLS state recorded on the way.
//!
//! ```text
//! RawListener ──▶ PumpListener (accept loop) ──▶ handler task per connection
//!                       ▲                                │ pipe
//!                       └──────── hand-off queue ◀───────┘
//! ```

// Core subsystems
pub mod config;
pub mod net;
pub mod pump;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::PumpConfig;
pub use lifecycle::Shutdown;
pub use net::{BoxedConnection, Connection, ConnectionContext, RawListener, TlsConnectionState};
pub use pump::{HandleOutcome, Handler, ListenerWrapper, Passthrough, PumpError, PumpListener};
