//! TLS state snapshots and the carrier that exposes them after a hijack.
//!
//! The pump never performs a handshake. A TLS layer further down the handler
//! chain records what it negotiated as [`TlsConnectionStates`] in the
//! connection's variable store; when the connection is piped, the most recent
//! snapshot rides along in a [`TlsStateConn`] so consumers (ALPN-aware
//! upgrades, for instance) can ask `Connection::tls_state()`.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::net::keepalive::KeepaliveControl;
use crate::net::transport::Connection;

/// Negotiated TLS session metadata, captured when a handshake completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConnectionState {
    /// Protocol version, e.g. "TLSv1.3".
    pub protocol_version: Option<String>,
    /// Negotiated cipher suite name.
    pub cipher_suite: Option<String>,
    /// ALPN protocol selected during the handshake.
    pub alpn_protocol: Option<Vec<u8>>,
    /// SNI server name sent by the client.
    pub server_name: Option<String>,
    /// Peer certificate chain, DER encoded, leaf first.
    pub peer_certificates: Vec<Vec<u8>>,
    pub handshake_complete: bool,
}

impl TlsConnectionState {
    /// ALPN protocol as UTF-8, if it is valid UTF-8.
    pub fn alpn_str(&self) -> Option<&str> {
        self.alpn_protocol
            .as_deref()
            .and_then(|p| std::str::from_utf8(p).ok())
    }
}

/// Every TLS state recorded on a connection, oldest first.
///
/// A connection can carry more than one when TLS is layered (for example a
/// TLS tunnel inside TLS); the innermost, most recent one is last.
#[derive(Debug, Clone, Default)]
pub struct TlsConnectionStates(Vec<Arc<TlsConnectionState>>);

impl TlsConnectionStates {
    pub fn push(&mut self, state: TlsConnectionState) {
        self.0.push(Arc::new(state));
    }

    /// The most recently recorded state.
    pub fn latest(&self) -> Option<Arc<TlsConnectionState>> {
        self.0.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TlsConnectionState> {
        self.0.iter().map(|s| &**s)
    }
}

/// A connection decorated with an immutable TLS state snapshot.
pub struct TlsStateConn<S> {
    inner: S,
    state: Arc<TlsConnectionState>,
}

impl<S> TlsStateConn<S> {
    pub fn new(inner: S, state: Arc<TlsConnectionState>) -> Self {
        Self { inner, state }
    }

    pub fn connection_state(&self) -> &TlsConnectionState {
        &self.state
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TlsStateConn<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TlsStateConn<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl<S: Connection> Connection for TlsStateConn<S> {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }

    fn keepalive(&self) -> Option<&dyn KeepaliveControl> {
        self.inner.keepalive()
    }

    fn tls_state(&self) -> Option<&TlsConnectionState> {
        Some(&self.state)
    }
}
