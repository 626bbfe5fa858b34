//! TCP transport: binding, raw accept, and accept error classification.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Adapt `tokio::net::TcpListener`/`TcpStream` to the pump's transport traits
//! - Decide which accept errors are worth retrying

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;
use crate::net::keepalive::KeepaliveControl;
use crate::net::transport::{BoxedConnection, Connection, RawListener};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The bind address did not parse.
    Address(std::net::AddrParseError),
    /// Failed to bind to address.
    Bind(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Address(e) => write!(f, "Invalid bind address: {}", e),
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// Bind a TCP listener to the configured address.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(ListenerError::Address)?;

    let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
    let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

    tracing::info!(address = %local_addr, "Listener bound");

    Ok(listener)
}

#[async_trait]
impl RawListener for TcpListener {
    async fn accept(&mut self) -> std::io::Result<BoxedConnection> {
        let (stream, _) = TcpListener::accept(self).await?;
        Ok(Box::new(stream))
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

impl Connection for TcpStream {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.peer_addr().ok()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        TcpStream::local_addr(self).ok()
    }

    fn keepalive(&self) -> Option<&dyn KeepaliveControl> {
        Some(self)
    }
}

/// Whether an accept error is a per-connection or resource hiccup that a
/// later accept may not hit, as opposed to a broken listener.
pub fn is_transient_accept_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    if matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    ) {
        return true;
    }

    #[cfg(unix)]
    if let Some(code) = err.raw_os_error() {
        return matches!(
            code,
            libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM
        );
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn connection_level_errors_are_transient() {
        for kind in [
            ErrorKind::ConnectionAborted,
            ErrorKind::ConnectionReset,
            ErrorKind::Interrupted,
            ErrorKind::WouldBlock,
            ErrorKind::TimedOut,
        ] {
            assert!(is_transient_accept_error(&Error::from(kind)), "{kind:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn fd_exhaustion_is_transient() {
        assert!(is_transient_accept_error(&Error::from_raw_os_error(libc::EMFILE)));
        assert!(is_transient_accept_error(&Error::from_raw_os_error(libc::ENFILE)));
    }

    #[test]
    fn listener_level_errors_are_fatal() {
        assert!(!is_transient_accept_error(&Error::new(
            ErrorKind::Other,
            "listener closed"
        )));
        assert!(!is_transient_accept_error(&Error::from(ErrorKind::InvalidInput)));
        #[cfg(unix)]
        assert!(!is_transient_accept_error(&Error::from_raw_os_error(libc::EBADF)));
    }

    #[tokio::test]
    async fn bind_rejects_bad_address() {
        let config = ListenerConfig {
            bind_address: "localhost:http".into(),
            ..ListenerConfig::default()
        };
        assert!(matches!(bind(&config).await, Err(ListenerError::Address(_))));
    }

    #[tokio::test]
    async fn tcp_connections_expose_addresses_and_keepalive() {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            ..ListenerConfig::default()
        };
        let mut listener = bind(&config).await.unwrap();
        let addr = RawListener::local_addr(&listener).unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let conn = RawListener::accept(&mut listener).await.unwrap();

        assert_eq!(conn.remote_addr(), Some(client.local_addr().unwrap()));
        assert_eq!(conn.local_addr(), Some(addr));
        assert!(conn.keepalive().is_some());
        assert!(conn.tls_state().is_none());
    }
}
