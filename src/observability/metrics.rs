//! Metrics collection and exposition.
//!
//! # Metrics
//! - `layer4_pump_connections_total` (counter): raw connections accepted
//! - `layer4_pump_connections_active` (gauge): handler tasks running
//! - `layer4_pump_connections_finished_total` (counter): by outcome
//! - `layer4_pump_connection_duration_seconds` (histogram): handler chain time
//! - `layer4_pump_bytes_received_total` / `layer4_pump_bytes_sent_total` (counters)
//! - `layer4_pump_hijacked_total` (counter): piped connections, by tls
//! - `layer4_pump_handoff_queue_depth` (gauge): queued, not yet accepted; always
//!   set from the channel's own length, never adjusted incrementally
//! - `layer4_pump_handoff_delivered_total` (counter): accepted by the consumer
//! - `layer4_pump_handoff_dropped_total` (counter): closed during drain
//! - `layer4_pump_accept_errors_total` (counter): by kind
//! - `layer4_pump_handler_failures_total` (counter)
//! - `layer4_pump_keepalive_failures_total` (counter)

use std::net::SocketAddr;
use std::time::Duration;

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const CONNECTIONS_TOTAL: &str = "layer4_pump_connections_total";
pub const CONNECTIONS_ACTIVE: &str = "layer4_pump_connections_active";
pub const CONNECTIONS_FINISHED_TOTAL: &str = "layer4_pump_connections_finished_total";
pub const CONNECTION_DURATION_SECONDS: &str = "layer4_pump_connection_duration_seconds";
pub const BYTES_RECEIVED_TOTAL: &str = "layer4_pump_bytes_received_total";
pub const BYTES_SENT_TOTAL: &str = "layer4_pump_bytes_sent_total";
pub const HIJACKED_TOTAL: &str = "layer4_pump_hijacked_total";
pub const HANDOFF_QUEUE_DEPTH: &str = "layer4_pump_handoff_queue_depth";
pub const HANDOFF_DELIVERED_TOTAL: &str = "layer4_pump_handoff_delivered_total";
pub const HANDOFF_DROPPED_TOTAL: &str = "layer4_pump_handoff_dropped_total";
pub const ACCEPT_ERRORS_TOTAL: &str = "layer4_pump_accept_errors_total";
pub const HANDLER_FAILURES_TOTAL: &str = "layer4_pump_handler_failures_total";
pub const KEEPALIVE_FAILURES_TOTAL: &str = "layer4_pump_keepalive_failures_total";

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

#[inline]
pub fn record_connection_accepted() {
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record the end of a handler task. Bytes are those that passed through the
/// pump; traffic after a hijack is not counted here.
#[inline]
pub fn record_connection_finished(outcome: &'static str, duration: Duration, read: u64, written: u64) {
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    counter!(CONNECTIONS_FINISHED_TOTAL, "outcome" => outcome).increment(1);
    histogram!(CONNECTION_DURATION_SECONDS).record(duration.as_secs_f64());
    counter!(BYTES_RECEIVED_TOTAL).increment(read);
    counter!(BYTES_SENT_TOTAL).increment(written);
}

#[inline]
pub fn record_hijacked(with_tls: bool) {
    let tls = if with_tls { "true" } else { "false" };
    counter!(HIJACKED_TOTAL, "tls" => tls).increment(1);
}

#[inline]
pub fn record_handoff_depth(depth: usize) {
    gauge!(HANDOFF_QUEUE_DEPTH).set(depth as f64);
}

/// Record a delivery to the consumer; `depth` is what is still queued.
#[inline]
pub fn record_handoff_delivered(depth: usize) {
    counter!(HANDOFF_DELIVERED_TOTAL).increment(1);
    record_handoff_depth(depth);
}

#[inline]
pub fn record_drained_close() {
    counter!(HANDOFF_DROPPED_TOTAL).increment(1);
}

/// Record an accept error (kind: "transient" or "fatal").
#[inline]
pub fn record_accept_error(kind: &'static str) {
    counter!(ACCEPT_ERRORS_TOTAL, "kind" => kind).increment(1);
}

#[inline]
pub fn record_handler_failure() {
    counter!(HANDLER_FAILURES_TOTAL).increment(1);
}

#[inline]
pub fn record_keepalive_failure() {
    counter!(KEEPALIVE_FAILURES_TOTAL).increment(1);
}
