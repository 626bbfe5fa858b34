//! Hand-off channel and the pipe (hijack) operation.
//!
//! # Responsibilities
//! - Carry connections whose ownership leaves the pump to `PumpListener::accept`
//! - Apply backpressure: a full queue suspends the piping handler
//! - Attach read-ahead bytes and the latest TLS state to piped connections
//!
//! # Design Decisions
//! - Bounded queue; a send waits for room and never drops a connection
//! - Senders live only in the accept loop, in-flight handlers, and the drain
//!   watcher, so the channel cannot close while a send is possible

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::net::context::ConnectionContext;
use crate::net::prefixed::PrefixedConn;
use crate::net::tls::{TlsConnectionStates, TlsStateConn};
use crate::net::transport::{display_addr, BoxedConnection};
use crate::observability::metrics;
use crate::pump::error::PumpError;
use crate::pump::handler::HandleOutcome;

/// Sending half of the hand-off channel.
#[derive(Debug, Clone)]
pub struct Handoff {
    tx: mpsc::Sender<BoxedConnection>,
}

impl Handoff {
    /// Create a channel holding at most `capacity` connections (minimum 1).
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<BoxedConnection>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a connection, waiting while the channel is full.
    pub(crate) async fn send(&self, conn: BoxedConnection) -> Result<(), PumpError> {
        self.tx
            .send(conn)
            .await
            .map_err(|_| PumpError::HandoffClosed)
    }

    /// Maximum number of queued connections.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Connections queued (or slots reserved) right now.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

impl ConnectionContext {
    /// Hand the connection to the pump's consumer.
    ///
    /// Bytes already read ahead are replayed to the consumer first, and when
    /// TLS states were recorded the most recent one travels with the
    /// connection. Waits while the hand-off queue is full.
    ///
    /// Returns [`HandleOutcome::Hijacked`]; handlers should return it as is.
    pub async fn pipe(&mut self) -> HandleOutcome {
        let Some(stream) = self.stream.take() else {
            return HandleOutcome::failed(PumpError::StreamTaken);
        };

        let mut conn: BoxedConnection = if self.buf.is_empty() {
            Box::new(stream)
        } else {
            let prefix = Bytes::copy_from_slice(&self.buf);
            self.buf.clear();
            Box::new(PrefixedConn::new(prefix, stream))
        };

        let tls_state = self
            .vars
            .get::<TlsConnectionStates>()
            .and_then(TlsConnectionStates::latest);
        let with_tls = tls_state.is_some();
        if let Some(state) = tls_state {
            conn = Box::new(TlsStateConn::new(conn, state));
        }

        tracing::debug!(
            connection_id = %self.id,
            remote = %display_addr(self.remote_addr()),
            tls = with_tls,
            queued = self.handoff.queued(),
            "piping connection"
        );

        match self.handoff.send(conn).await {
            Ok(()) => {
                metrics::record_hijacked(with_tls);
                metrics::record_handoff_depth(self.handoff.queued());
                HandleOutcome::Hijacked
            }
            Err(err) => HandleOutcome::failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::buffer::BufferPool;
    use crate::net::connection::ConnectionId;
    use crate::net::testing::MemoryConn;
    use crate::net::tls::TlsConnectionState;
    use crate::net::transport::Connection;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn context(port: u16, handoff: &Handoff) -> (ConnectionContext, tokio::io::DuplexStream) {
        let pool = BufferPool::new(64, 4);
        let (conn, peer) = MemoryConn::pair(port);
        let cx = ConnectionContext::new(ConnectionId::new(), Box::new(conn), pool.acquire(), handoff.clone());
        (cx, peer)
    }

    #[tokio::test]
    async fn pipe_delivers_plain_connection() {
        let (handoff, mut rx) = Handoff::channel(2);
        let (mut cx, _peer) = context(9, &handoff);

        assert!(cx.pipe().await.is_hijacked());
        assert!(!cx.is_attached());

        let conn = rx.recv().await.unwrap();
        assert_eq!(conn.remote_addr(), MemoryConn::addr_for(9));
        assert!(conn.tls_state().is_none());
    }

    #[tokio::test]
    async fn pipe_twice_fails() {
        let (handoff, _rx) = Handoff::channel(2);
        let (mut cx, _peer) = context(1, &handoff);

        assert!(cx.pipe().await.is_hijacked());
        match cx.pipe().await {
            HandleOutcome::Failed(err) => assert_eq!(err.to_string(), "connection already handed off"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn pipe_exposes_latest_tls_state() {
        let (handoff, mut rx) = Handoff::channel(1);
        let (mut cx, _peer) = context(2, &handoff);
        cx.record_tls_state(TlsConnectionState {
            server_name: Some("first.test".into()),
            ..TlsConnectionState::default()
        });
        cx.record_tls_state(TlsConnectionState {
            server_name: Some("second.test".into()),
            alpn_protocol: Some(b"h2".to_vec()),
            ..TlsConnectionState::default()
        });

        assert!(cx.pipe().await.is_hijacked());
        let conn = rx.recv().await.unwrap();
        let state = conn.tls_state().expect("carrier should expose TLS state");
        assert_eq!(state.server_name.as_deref(), Some("second.test"));
        assert_eq!(state.alpn_str(), Some("h2"));
    }

    #[tokio::test]
    async fn pipe_replays_read_ahead_bytes() {
        let (handoff, mut rx) = Handoff::channel(1);
        let (mut cx, mut peer) = context(3, &handoff);

        peer.write_all(b"PRI * HTTP/2.0").await.unwrap();
        while cx.buffered().len() < 3 {
            cx.prefetch().await.unwrap();
        }
        assert!(cx.pipe().await.is_hijacked());
        drop(peer);

        let mut conn = rx.recv().await.unwrap();
        let mut out = String::new();
        conn.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "PRI * HTTP/2.0");
    }

    #[tokio::test]
    async fn full_channel_applies_backpressure() {
        let (handoff, mut rx) = Handoff::channel(1);
        let (mut first, _p1) = context(1, &handoff);
        let (mut second, _p2) = context(2, &handoff);

        assert!(first.pipe().await.is_hijacked());
        assert_eq!(handoff.queued(), 1);

        let blocked = tokio::spawn(async move { second.pipe().await.is_hijacked() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.remote_addr(), MemoryConn::addr_for(1));
        assert!(blocked.await.unwrap());
        assert_eq!(rx.recv().await.unwrap().remote_addr(), MemoryConn::addr_for(2));
    }

    #[tokio::test]
    async fn queue_depth_tracks_channel_length() {
        let (handoff, mut rx) = Handoff::channel(3);
        let (mut first, _p1) = context(1, &handoff);
        let (mut second, _p2) = context(2, &handoff);

        assert!(first.pipe().await.is_hijacked());
        assert!(second.pipe().await.is_hijacked());
        assert_eq!(handoff.queued(), 2);
        assert_eq!(rx.len(), 2);

        rx.recv().await.unwrap();
        assert_eq!(handoff.queued(), rx.len());
        rx.recv().await.unwrap();
        assert_eq!(handoff.queued(), 0);
        assert_eq!(rx.len(), 0);
    }

    #[tokio::test]
    async fn closed_channel_fails_and_drops_connection() {
        let (handoff, rx) = Handoff::channel(1);
        drop(rx);
        let (mut cx, mut peer) = context(4, &handoff);

        assert!(matches!(cx.pipe().await, HandleOutcome::Failed(_)));
        let mut buf = [0u8; 1];
        assert_eq!(peer.read(&mut buf).await.unwrap(), 0);
    }
}
