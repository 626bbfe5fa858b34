//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

use layer4_pump::net::{BoxedConnection, Connection, KeepaliveControl, RawListener};
use layer4_pump::resilience::AcceptRetryPolicy;

/// In-memory connection; the test holds the other end.
pub struct MemoryConn {
    stream: DuplexStream,
    remote: SocketAddr,
}

impl MemoryConn {
    pub fn pair(port: u16) -> (Self, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let conn = MemoryConn {
            stream: ours,
            remote: remote_for(port),
        };
        (conn, theirs)
    }
}

pub fn remote_for(port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], port))
}

pub fn listener_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4000))
}

impl AsyncRead for MemoryConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl Connection for MemoryConn {
    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.remote)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(listener_addr())
    }
}

/// Keepalive controls that count calls and optionally fail them.
pub struct KeepaliveRecorder {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl KeepaliveControl for KeepaliveRecorder {
    fn set_keepalive(&self, _enabled: bool) -> io::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "no keepalive here"));
        }
        Ok(())
    }

    fn set_keepalive_period(&self, _idle: Duration, _interval: Duration) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory connection that exposes keepalive controls.
pub struct KeepaliveConn {
    inner: MemoryConn,
    control: KeepaliveRecorder,
}

impl AsyncRead for KeepaliveConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for KeepaliveConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl Connection for KeepaliveConn {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }

    fn keepalive(&self) -> Option<&dyn KeepaliveControl> {
        Some(&self.control)
    }
}

/// Raw listener fed by a [`Script`]. Once the script runs dry, accept waits forever.
pub struct ScriptedListener {
    rx: mpsc::UnboundedReceiver<io::Result<BoxedConnection>>,
    dropped: Arc<AtomicBool>,
}

impl Drop for ScriptedListener {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RawListener for ScriptedListener {
    async fn accept(&mut self) -> io::Result<BoxedConnection> {
        match self.rx.recv().await {
            Some(next) => next,
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(listener_addr())
    }
}

/// Drives a [`ScriptedListener`].
pub struct Script {
    tx: mpsc::UnboundedSender<io::Result<BoxedConnection>>,
    dropped: Arc<AtomicBool>,
}

impl Script {
    /// Queue a connection; returns the peer end.
    pub fn connect(&self, port: u16) -> DuplexStream {
        let (conn, peer) = MemoryConn::pair(port);
        let _ = self.tx.send(Ok(Box::new(conn)));
        peer
    }

    /// Queue a connection with keepalive controls; returns the peer end and
    /// the number of `set_keepalive` calls made on it so far.
    pub fn connect_with_keepalive(&self, port: u16, fail: bool) -> (DuplexStream, Arc<AtomicUsize>) {
        let (inner, peer) = MemoryConn::pair(port);
        let calls = Arc::new(AtomicUsize::new(0));
        let conn = KeepaliveConn {
            inner,
            control: KeepaliveRecorder {
                calls: Arc::clone(&calls),
                fail,
            },
        };
        let _ = self.tx.send(Ok(Box::new(conn)));
        (peer, calls)
    }

    /// Queue an accept error.
    pub fn fail(&self, kind: io::ErrorKind, message: &str) {
        let _ = self.tx.send(Err(io::Error::new(kind, message.to_string())));
    }

    /// Whether the pump has dropped the raw listener.
    pub fn listener_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

pub fn scripted_listener() -> (ScriptedListener, Script) {
    let (tx, rx) = mpsc::unbounded_channel();
    let dropped = Arc::new(AtomicBool::new(false));
    (
        ScriptedListener {
            rx,
            dropped: Arc::clone(&dropped),
        },
        Script { tx, dropped },
    )
}

/// Retry policy fast enough for tests.
pub fn quick_retry(max_consecutive: u32) -> AcceptRetryPolicy {
    AcceptRetryPolicy {
        base_ms: 1,
        max_ms: 5,
        max_consecutive,
    }
}

/// Poll `check` until it holds, panicking after two seconds.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Read until EOF, with a timeout.
pub async fn read_to_end(peer: &mut DuplexStream) -> Vec<u8> {
    use tokio::io::AsyncReadExt;

    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), peer.read_to_end(&mut out))
        .await
        .expect("peer never saw EOF")
        .expect("peer read failed");
    out
}
