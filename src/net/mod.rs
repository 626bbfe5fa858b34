//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (raw accept, error classification)
//!     → keepalive.rs (fixed keepalive policy, best effort)
//!     → context.rs (byte counting, pooled buffer, typed vars)
//!     → Hand off to the handler chain
//!
//! On hijack:
//!     context buffer → prefixed.rs (replay read-ahead bytes)
//!     TLS states in vars → tls.rs (TlsStateConn carrier)
//! ```
//!
//! # Design Decisions
//! - Transport capabilities are optional trait methods, probed at runtime
//! - Buffers come from a shared pool and always go back
//! - Each connection tracked for graceful drain

pub mod buffer;
pub mod connection;
pub mod context;
pub mod keepalive;
pub mod listener;
pub mod prefixed;
pub mod tls;
pub mod transport;
pub mod vars;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{BufferPool, PooledBuffer};
pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use context::{ByteCounters, ConnectionContext, CountingStream};
pub use keepalive::{apply_keepalive, KeepaliveControl, KEEPALIVE_IDLE, KEEPALIVE_INTERVAL};
pub use listener::{bind, is_transient_accept_error, ListenerError};
pub use prefixed::PrefixedConn;
pub use tls::{TlsConnectionState, TlsConnectionStates, TlsStateConn};
pub use transport::{BoxedConnection, Connection, RawListener};
pub use vars::Vars;
