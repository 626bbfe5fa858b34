//! Per-connection context handed to the handler chain.
//!
//! # Responsibilities
//! - Own the accepted stream until it is closed or piped away
//! - Count bytes read from and written to the raw stream
//! - Hold a pooled buffer for bytes matchers read ahead
//! - Carry the typed variable store and an advisory cancellation token
//!
//! # Design Decisions
//! - The stream lives in an `Option`: whoever takes it owns closing it
//! - Counters are shared (`Arc`) so stats stay readable after a hijack
//! - Reads serve buffered bytes first, so prefetching never loses data

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Buf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio_util::sync::CancellationToken;

use crate::net::buffer::PooledBuffer;
use crate::net::connection::ConnectionId;
use crate::net::keepalive::KeepaliveControl;
use crate::net::tls::{TlsConnectionState, TlsConnectionStates};
use crate::net::transport::{BoxedConnection, Connection};
use crate::net::vars::Vars;
use crate::pump::handoff::Handoff;

/// Minimum room reserved in the buffer for each prefetch.
const PREFETCH_CHUNK: usize = 1024;

/// Monotonic read/write byte counters.
#[derive(Debug, Default)]
pub struct ByteCounters {
    read: AtomicU64,
    written: AtomicU64,
}

impl ByteCounters {
    pub fn read(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    fn add_read(&self, n: usize) {
        self.read.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn add_written(&self, n: usize) {
        self.written.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// A stream that counts the bytes passing through it.
pub struct CountingStream<S> {
    inner: S,
    counters: Arc<ByteCounters>,
}

impl<S> CountingStream<S> {
    pub fn new(inner: S, counters: Arc<ByteCounters>) -> Self {
        Self { inner, counters }
    }

    pub fn counters(&self) -> &Arc<ByteCounters> {
        &self.counters
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for CountingStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let polled = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = polled {
            self.counters.add_read(buf.filled().len() - before);
        }
        polled
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CountingStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let polled = Pin::new(&mut self.inner).poll_write(cx, data);
        if let Poll::Ready(Ok(n)) = polled {
            self.counters.add_written(n);
        }
        polled
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

impl<S: Connection> Connection for CountingStream<S> {
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
        self.inner.tls_state()
    }
}

/// Everything a handler chain needs to process one accepted connection.
pub struct ConnectionContext {
    pub(crate) id: ConnectionId,
    pub(crate) stream: Option<CountingStream<BoxedConnection>>,
    pub(crate) buf: PooledBuffer,
    pub(crate) vars: Vars,
    pub(crate) cancel: CancellationToken,
    pub(crate) counters: Arc<ByteCounters>,
    pub(crate) handoff: Handoff,
    remote_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
}

impl ConnectionContext {
    pub(crate) fn new(
        id: ConnectionId,
        conn: BoxedConnection,
        buf: PooledBuffer,
        handoff: Handoff,
    ) -> Self {
        let counters = Arc::new(ByteCounters::default());
        let remote_addr = conn.remote_addr();
        let local_addr = conn.local_addr();
        Self {
            id,
            stream: Some(CountingStream::new(conn, Arc::clone(&counters))),
            buf,
            vars: Vars::new(),
            cancel: CancellationToken::new(),
            counters,
            handoff,
            remote_addr,
            local_addr,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bytes read from the raw connection so far.
    pub fn bytes_read(&self) -> u64 {
        self.counters.read()
    }

    /// Bytes written to the raw connection so far.
    pub fn bytes_written(&self) -> u64 {
        self.counters.written()
    }

    pub fn counters(&self) -> Arc<ByteCounters> {
        Arc::clone(&self.counters)
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut Vars {
        &mut self.vars
    }

    /// Advisory cancellation for work spawned on behalf of this connection.
    /// Cancelled once the pump is done with the connection.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the context still owns the stream.
    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    /// Bytes read ahead and not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Read more bytes into the buffer without consuming them.
    ///
    /// Returns the number of new bytes; 0 means the peer closed its side.
    pub async fn prefetch(&mut self) -> std::io::Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(stream_detached)?;
        self.buf.reserve(PREFETCH_CHUNK);
        stream.read_buf(&mut *self.buf).await
    }

    /// Record a TLS state negotiated by a layer of the handler chain.
    pub fn record_tls_state(&mut self, state: TlsConnectionState) {
        self.vars.get_or_default::<TlsConnectionStates>().push(state);
    }

    /// TLS states recorded so far, oldest first.
    pub fn tls_states(&self) -> Option<&TlsConnectionStates> {
        self.vars.get::<TlsConnectionStates>()
    }

    /// Shut the stream down and release it, if the context still owns it.
    ///
    /// Returns whether a stream was closed. Cancels the context either way.
    pub(crate) async fn close(&mut self) -> bool {
        self.cancel.cancel();
        match self.stream.take() {
            Some(mut stream) => {
                if let Err(err) = stream.shutdown().await {
                    tracing::trace!(connection_id = %self.id, error = %err, "shutdown before close failed");
                }
                true
            }
            None => false,
        }
    }
}

impl AsyncRead for ConnectionContext {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if !this.buf.is_empty() {
            let to_copy = this.buf.len().min(buf.remaining());
            buf.put_slice(&this.buf[..to_copy]);
            this.buf.advance(to_copy);
            return Poll::Ready(Ok(()));
        }
        match this.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_read(cx, buf),
            None => Poll::Ready(Err(stream_detached())),
        }
    }
}

impl AsyncWrite for ConnectionContext {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_write(cx, data),
            None => Poll::Ready(Err(stream_detached())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Err(stream_detached())),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Err(stream_detached())),
        }
    }
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("attached", &self.stream.is_some())
            .field("buffered", &self.buf.len())
            .field("bytes_read", &self.counters.read())
            .field("bytes_written", &self.counters.written())
            .finish()
    }
}

fn stream_detached() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "connection was handed off",
    )
}
