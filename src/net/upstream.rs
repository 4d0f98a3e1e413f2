//! Upstream connect primitive.

use std::io::{self, ErrorKind};
use std::net::ToSocketAddrs;

use mio::net::TcpStream;

/// Opens outbound connections on behalf of the event loop.
///
/// Implementations must return a non-blocking socket. The handshake may still
/// be in flight when the socket is returned; the dispatcher waits for
/// writability before treating it as connected.
pub trait Connector: Send {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<TcpStream>;
}

/// Resolves the host with the system resolver and starts a TCP handshake to
/// the first address returned.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<TcpStream> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(ErrorKind::NotFound, format!("no address found for {host}"))
        })?;

        let stream = TcpStream::connect(addr)?;
        let _ = stream.set_nodelay(true);
        tracing::debug!(%addr, host, port, "upstream connect started");
        Ok(stream)
    }
}
