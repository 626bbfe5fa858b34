//! TCP keepalive configuration for accepted connections.
//!
//! # Responsibilities
//! - Define the keepalive capability connections may expose
//! - Apply the fixed policy: enabled, 120s idle, 15s probe interval
//!
//! # Design Decisions
//! - Fixed policy; not configurable per connection
//! - Best effort: callers log failures and keep the connection
//! - Socket option plumbing is delegated to socket2

use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

/// Idle time before the first keepalive probe.
pub const KEEPALIVE_IDLE: Duration = Duration::from_millis(120_000);

/// Interval between unanswered keepalive probes.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(15_000);

/// Keepalive controls exposed by a transport.
pub trait KeepaliveControl {
    /// Turn keepalive probing on or off.
    fn set_keepalive(&self, enabled: bool) -> std::io::Result<()>;

    /// Set the idle time and probe interval.
    fn set_keepalive_period(&self, idle: Duration, interval: Duration) -> std::io::Result<()>;
}

/// Apply the fixed keepalive policy.
pub fn apply_keepalive(conn: &dyn KeepaliveControl) -> std::io::Result<()> {
    conn.set_keepalive(true)?;
    conn.set_keepalive_period(KEEPALIVE_IDLE, KEEPALIVE_INTERVAL)
}

impl KeepaliveControl for TcpStream {
    fn set_keepalive(&self, enabled: bool) -> std::io::Result<()> {
        SockRef::from(self).set_keepalive(enabled)
    }

    fn set_keepalive_period(&self, idle: Duration, interval: Duration) -> std::io::Result<()> {
        let params = TcpKeepalive::new().with_time(idle);
        #[cfg(any(
            target_os = "android",
            target_os = "freebsd",
            target_os = "ios",
            target_os = "linux",
            target_os = "macos",
            target_os = "netbsd",
            target_os = "windows",
        ))]
        let params = params.with_interval(interval);
        #[cfg(not(any(
            target_os = "android",
            target_os = "freebsd",
            target_os = "ios",
            target_os = "linux",
            target_os = "macos",
            target_os = "netbsd",
            target_os = "windows",
        )))]
        let _ = interval;

        SockRef::from(self).set_tcp_keepalive(&params)
    }
}
