//! In-memory connections for unit tests.

use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use crate::net::transport::Connection;

pub(crate) struct MemoryConn {
    stream: DuplexStream,
    remote: SocketAddr,
}

impl MemoryConn {
    /// A connection from `10.0.0.1:<port>` and the peer's end of it.
    pub(crate) fn pair(port: u16) -> (Self, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(4096);
        let conn = Self {
            stream: ours,
            remote: SocketAddr::from((Ipv4Addr::new(10, 0, 0, 1), port)),
        };
        (conn, theirs)
    }

    pub(crate) fn addr_for(port: u16) -> Option<SocketAddr> {
        Some(SocketAddr::from((Ipv4Addr::new(10, 0, 0, 1), port)))
    }
}

impl AsyncRead for MemoryConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl Connection for MemoryConn {
    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.remote)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}
