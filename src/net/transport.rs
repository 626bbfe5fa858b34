//! Transport abstractions the pump is written against.
//!
//! A [`RawListener`] yields [`Connection`]s. Connections are plain byte
//! streams that may additionally expose optional capabilities (keepalive
//! control, a TLS state snapshot) through probe methods returning `Option`.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::net::keepalive::KeepaliveControl;
use crate::net::tls::TlsConnectionState;

/// A bidirectional byte stream accepted from a raw listener.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Address of the remote peer, if known.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Local address of the connection, if known.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Keepalive controls, for transports that have them.
    fn keepalive(&self) -> Option<&dyn KeepaliveControl> {
        None
    }

    /// TLS state negotiated on this connection, when a TLS layer recorded one.
    fn tls_state(&self) -> Option<&TlsConnectionState> {
        None
    }
}

/// Type-erased connection, the unit handed between pump stages.
pub type BoxedConnection = Box<dyn Connection>;

impl std::fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote_addr", &self.remote_addr())
            .field("local_addr", &self.local_addr())
            .field("tls", &self.tls_state().is_some())
            .finish()
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn remote_addr(&self) -> Option<SocketAddr> {
        (**self).remote_addr()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        (**self).local_addr()
    }

    fn keepalive(&self) -> Option<&dyn KeepaliveControl> {
        (**self).keepalive()
    }

    fn tls_state(&self) -> Option<&TlsConnectionState> {
        (**self).tls_state()
    }
}

/// Source of raw connections.
///
/// Dropping the listener closes it.
#[async_trait]
pub trait RawListener: Send + 'static {
    /// Wait for the next connection.
    async fn accept(&mut self) -> std::io::Result<BoxedConnection>;

    /// Local address the listener is bound to.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

#[async_trait]
impl<L: RawListener + ?Sized> RawListener for Box<L> {
    async fn accept(&mut self) -> std::io::Result<BoxedConnection> {
        (**self).accept().await
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        (**self).local_addr()
    }
}

/// Render an optional address for log fields.
pub(crate) fn display_addr(addr: Option<SocketAddr>) -> String {
    addr.map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
