//! Accept loop, per-connection handler tasks, and the consumer-facing listener.
//!
//! # Data Flow
//! ```text
//! raw accept ──▶ keepalive ──▶ track ──▶ spawn handle_connection
//!                                              │
//!                     handler chain ◀──────────┘
//!                      │         │
//!        Completed/Failed       Hijacked (pipe)
//!                      │         │
//!              close stream     hand-off queue ──▶ PumpListener::accept
//! ```
//!
//! # Shutdown
//! ```text
//! fatal accept error or close()
//!     → record terminal error, drop raw listener
//!     → drain watcher: wait for in-flight handlers, then drop the last sender
//!     → accept loop: close every connection still queued until the channel ends
//!     → PumpListener::accept returns the terminal error
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::net::buffer::BufferPool;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::context::{ByteCounters, ConnectionContext};
use crate::net::keepalive::apply_keepalive;
use crate::net::listener::is_transient_accept_error;
use crate::net::transport::{display_addr, BoxedConnection, RawListener};
use crate::observability::metrics;
use crate::pump::error::PumpError;
use crate::pump::handler::{HandleOutcome, Handler};
use crate::pump::handoff::Handoff;
use crate::pump::PumpSettings;

/// State shared by the accept loop and the consumer-facing listener.
struct Shared {
    rx: Mutex<mpsc::Receiver<BoxedConnection>>,
    terminal: OnceLock<PumpError>,
    close: CancellationToken,
    tracker: ConnectionTracker,
    local_addr: Option<SocketAddr>,
}

/// The listener a pump presents to its consumer.
///
/// `accept` yields connections that the handler chain piped. Dropping the
/// listener closes it.
pub struct PumpListener {
    shared: Arc<Shared>,
}

impl PumpListener {
    /// Start pumping `raw` on the current tokio runtime.
    pub(crate) fn spawn<L: RawListener>(
        raw: L,
        handler: Arc<dyn Handler>,
        pool: Arc<BufferPool>,
        settings: PumpSettings,
    ) -> Self {
        let (handoff, rx) = Handoff::channel(settings.handoff_capacity);
        let shared = Arc::new(Shared {
            rx: Mutex::new(rx),
            terminal: OnceLock::new(),
            close: CancellationToken::new(),
            tracker: ConnectionTracker::new(),
            local_addr: raw.local_addr().ok(),
        });

        tracing::info!(
            address = %display_addr(shared.local_addr),
            handoff_capacity = handoff.capacity(),
            keepalive = settings.keepalive,
            "Pump listener started"
        );

        let pump = AcceptLoop {
            shared: Arc::clone(&shared),
            handoff,
            handler,
            pool,
            settings,
        };
        tokio::spawn(pump.run(raw));

        Self { shared }
    }

    /// Wait for the next piped connection.
    ///
    /// Once the pump has stopped and every queued connection is gone, returns
    /// the raw listener's terminal error, or [`PumpError::Closed`] after
    /// [`close`](Self::close).
    pub async fn accept(&self) -> Result<BoxedConnection, PumpError> {
        let mut rx = self.shared.rx.lock().await;
        match rx.recv().await {
            Some(conn) => {
                metrics::record_handoff_delivered(rx.len());
                Ok(conn)
            }
            None => Err(self
                .shared
                .terminal
                .get()
                .cloned()
                .unwrap_or(PumpError::Closed)),
        }
    }

    /// Stop accepting. Handlers already running finish normally; connections
    /// still queued are closed. Idempotent.
    pub fn close(&self) {
        self.shared.close.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.close.is_cancelled()
    }

    /// Address of the wrapped raw listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.local_addr
    }

    /// Handler tasks still running.
    pub fn in_flight(&self) -> u64 {
        self.shared.tracker.active_count()
    }
}

impl Drop for PumpListener {
    fn drop(&mut self) {
        self.shared.close.cancel();
    }
}

impl std::fmt::Debug for PumpListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpListener")
            .field("local_addr", &self.shared.local_addr)
            .field("in_flight", &self.shared.tracker.active_count())
            .field("closed", &self.shared.close.is_cancelled())
            .finish()
    }
}

struct AcceptLoop {
    shared: Arc<Shared>,
    handoff: Handoff,
    handler: Arc<dyn Handler>,
    pool: Arc<BufferPool>,
    settings: PumpSettings,
}

impl AcceptLoop {
    async fn run<L: RawListener>(self, mut raw: L) {
        let mut consecutive_errors: u32 = 0;

        let terminal = loop {
            let accepted = tokio::select! {
                biased;

                _ = self.shared.close.cancelled() => break None,
                accepted = raw.accept() => accepted,
            };

            let conn = match accepted {
                Ok(conn) => {
                    consecutive_errors = 0;
                    conn
                }
                Err(err) if is_transient_accept_error(&err) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    metrics::record_accept_error("transient");
                    if self.settings.retry.is_exhausted(consecutive_errors) {
                        tracing::error!(
                            error = %err,
                            consecutive_errors,
                            "Too many consecutive accept errors, giving up"
                        );
                        break Some(err);
                    }

                    let delay = self.settings.retry.delay(consecutive_errors);
                    tracing::error!(
                        error = %err,
                        consecutive_errors,
                        retry_in_ms = delay.as_millis() as u64,
                        "Temporary error accepting connection"
                    );
                    tokio::select! {
                        biased;

                        _ = self.shared.close.cancelled() => break None,
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
                Err(err) => {
                    metrics::record_accept_error("fatal");
                    break Some(err);
                }
            };

            if self.settings.keepalive {
                if let Some(control) = conn.keepalive() {
                    if let Err(err) = apply_keepalive(control) {
                        metrics::record_keepalive_failure();
                        tracing::warn!(
                            remote = %display_addr(conn.remote_addr()),
                            error = %err,
                            "Unable to set keepalive for new connection"
                        );
                    }
                }
            }

            metrics::record_connection_accepted();
            // Tracked before the spawn so the drain watcher never sees a false zero.
            let guard = self.shared.tracker.track();
            tokio::spawn(handle_connection(
                conn,
                guard,
                Arc::clone(&self.handler),
                Arc::clone(&self.pool),
                self.handoff.clone(),
            ));
        };

        drop(raw);
        match terminal {
            Some(err) => {
                tracing::error!(error = %err, "Accept loop stopped");
                let _ = self.shared.terminal.set(PumpError::Accept(Arc::new(err)));
            }
            None => tracing::info!("Pump listener closed"),
        }

        self.drain().await;
    }

    /// Close the hand-off channel once handlers are done, and close whatever
    /// the consumer will never accept.
    async fn drain(self) {
        let AcceptLoop {
            shared, handoff, ..
        } = self;

        let tracker = shared.tracker.clone();
        let in_flight = tracker.active_count();
        if in_flight > 0 {
            tracing::info!(in_flight, "Waiting for connection handlers to finish");
        }
        tokio::spawn(async move {
            tracker.wait_idle().await;
            drop(handoff);
            tracing::debug!("Hand-off channel closed");
        });

        let mut rx = shared.rx.lock().await;
        let mut reclaimed = 0u64;
        while let Some(mut conn) = rx.recv().await {
            if let Err(err) = conn.shutdown().await {
                tracing::trace!(error = %err, "shutdown of undelivered connection failed");
            }
            reclaimed += 1;
            metrics::record_drained_close();
        }
        metrics::record_handoff_depth(0);
        tracing::debug!(reclaimed, "Hand-off queue drained");
    }
}

/// Run the handler chain for one connection and close it unless it was handed off.
async fn handle_connection(
    conn: BoxedConnection,
    guard: ConnectionGuard,
    handler: Arc<dyn Handler>,
    pool: Arc<BufferPool>,
    handoff: Handoff,
) {
    let id = guard.id();
    let mut cx = ConnectionContext::new(id, conn, pool.acquire(), handoff);
    let mut finish = ConnectionFinish::new(guard, cx.remote_addr(), cx.counters());

    let outcome = handler.handle(&mut cx).await;
    finish.handled(outcome.label());

    match &outcome {
        HandleOutcome::Failed(err) => {
            metrics::record_handler_failure();
            tracing::error!(
                connection_id = %id,
                remote = %display_addr(cx.remote_addr()),
                error = %err,
                "Error handling connection"
            );
        }
        HandleOutcome::Hijacked if cx.is_attached() => {
            tracing::warn!(
                connection_id = %id,
                remote = %display_addr(cx.remote_addr()),
                "Handler reported a hijack without piping the connection; closing it"
            );
        }
        _ => {}
    }

    finish.closed = cx.close().await;
    // Buffer back in the pool before the tracker lets go.
    drop(cx);
}

/// Stats record and tracker release for one handler task.
///
/// Runs on drop, so a panicking handler is still logged, counted and
/// released from the tracker.
struct ConnectionFinish {
    guard: ConnectionGuard,
    remote: Option<SocketAddr>,
    counters: Arc<ByteCounters>,
    start: Instant,
    duration: Option<Duration>,
    outcome: &'static str,
    closed: bool,
}

impl ConnectionFinish {
    fn new(guard: ConnectionGuard, remote: Option<SocketAddr>, counters: Arc<ByteCounters>) -> Self {
        Self {
            guard,
            remote,
            counters,
            start: Instant::now(),
            duration: None,
            outcome: "panicked",
            closed: false,
        }
    }

    fn handled(&mut self, outcome: &'static str) {
        self.duration = Some(self.start.elapsed());
        self.outcome = outcome;
    }
}

impl Drop for ConnectionFinish {
    fn drop(&mut self) {
        let duration = self.duration.unwrap_or_else(|| self.start.elapsed());
        let read = self.counters.read();
        let written = self.counters.written();

        tracing::debug!(
            connection_id = %self.guard.id(),
            remote = %display_addr(self.remote),
            read,
            written,
            duration_ms = duration.as_millis() as u64,
            outcome = self.outcome,
            closed = self.closed,
            "Connection stats"
        );
        metrics::record_connection_finished(self.outcome, duration, read, written);
    }
}
