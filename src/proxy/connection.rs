//! Per-socket connection state.

use std::io;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use uuid::Uuid;

use crate::http::{Request, Response};
use crate::net::wire::{self, HeadScanner, WriteOutcome};

/// Which end of a pair this socket is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Upstream,
}

/// Where a connection is in its exchange.
///
/// Clients move `AwaitingRequestHeaders → RequestRouted → StreamingBody`,
/// or to `TunnelEstablished` for CONNECT, or straight to `Complete` when
/// the proxy answers locally. Upstreams move
/// `AwaitingResponseHeaders → StreamingBody → Complete`, or live in
/// `TunnelEstablished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingRequestHeaders,
    RequestRouted,
    AwaitingResponseHeaders,
    StreamingBody,
    TunnelEstablished,
    Complete,
}

/// Result of handling one readiness event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionResult {
    Continue,
    /// The dispatcher must tear this connection (and its pair) down.
    Close,
}

/// State for one tracked socket.
#[derive(Debug)]
pub struct Connection {
    pub token: Token,
    pub role: Role,
    pub socket: TcpStream,
    /// The other end of the pair. Only used to route bytes.
    pub peer: Option<Token>,
    pub phase: Phase,
    /// Bytes received while waiting for a complete head.
    pub inbound: Vec<u8>,
    pub head_scanner: HeadScanner,
    outbound: Vec<u8>,
    /// Client: the routed request.
    pub request: Option<Request>,
    /// Upstream: the response being relayed.
    pub response: Option<Response>,
    /// Upstream: URL to cache the response under once complete.
    pub cache_key: Option<String>,
    /// Upstream: whether body bytes are kept for the cache.
    pub retain_body: bool,
    /// Upstream: TCP handshake still in flight.
    pub connecting: bool,
    /// Remove once `outbound` drains.
    pub close_after_flush: bool,
    interest: Interest,
    last_activity: Instant,
    pub request_id: Uuid,
}

impl Connection {
    fn new(token: Token, role: Role, socket: TcpStream, phase: Phase, interest: Interest) -> Self {
        Self {
            token,
            role,
            socket,
            peer: None,
            phase,
            inbound: Vec::new(),
            head_scanner: HeadScanner::default(),
            outbound: Vec::new(),
            request: None,
            response: None,
            cache_key: None,
            retain_body: false,
            connecting: false,
            close_after_flush: false,
            interest,
            last_activity: Instant::now(),
            request_id: Uuid::new_v4(),
        }
    }

    /// A freshly accepted client, registered for reads.
    pub fn client(token: Token, socket: TcpStream) -> Self {
        Self::new(
            token,
            Role::Client,
            socket,
            Phase::AwaitingRequestHeaders,
            Interest::READABLE,
        )
    }

    /// An upstream whose connect is in flight, registered for reads and
    /// writes. It inherits the client's request id.
    pub fn upstream(
        token: Token,
        socket: TcpStream,
        client: Token,
        request_id: Uuid,
        phase: Phase,
    ) -> Self {
        let mut conn = Self::new(
            token,
            Role::Upstream,
            socket,
            phase,
            Interest::READABLE | Interest::WRITABLE,
        );
        conn.peer = Some(client);
        conn.connecting = true;
        conn.request_id = request_id;
        conn
    }

    pub fn initial_interest(&self) -> Interest {
        self.interest
    }

    #[cfg(test)]
    fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Ready to be removed: asked to close and nothing left to send.
    pub fn wants_close(&self) -> bool {
        self.close_after_flush && self.outbound.is_empty()
    }

    /// Appends `bytes` to the outbound queue and writes as much as the
    /// socket takes right now.
    pub fn queue(&mut self, bytes: &[u8], registry: &Registry) -> io::Result<()> {
        self.outbound.extend_from_slice(bytes);
        self.flush()?;
        self.sync_interest(registry)
    }

    /// Writes queued bytes until the socket would block. A write error
    /// discards the queue.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.connecting {
            return Ok(());
        }
        while !self.outbound.is_empty() {
            match wire::write_some(&mut self.socket, &self.outbound) {
                Ok(WriteOutcome::Written(n)) => {
                    self.outbound.drain(..n);
                    self.touch();
                }
                Ok(WriteOutcome::WouldBlock) => break,
                Err(e) => {
                    self.outbound.clear();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn desired_interest(&self) -> Interest {
        if self.connecting || !self.outbound.is_empty() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    /// Re-registers when write interest must be added or dropped.
    pub fn sync_interest(&mut self, registry: &Registry) -> io::Result<()> {
        let desired = self.desired_interest();
        if desired != self.interest {
            registry.reregister(&mut self.socket, self.token, desired)?;
            self.interest = desired;
        }
        Ok(())
    }

    /// Polls a pending connect. `Ok(true)` once established, `Ok(false)`
    /// while still in progress.
    pub fn finish_connect(&mut self) -> io::Result<bool> {
        if let Some(e) = self.socket.take_error()? {
            return Err(e);
        }
        match self.socket.peer_addr() {
            Ok(_) => {
                self.connecting = false;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::Poll;
    use std::io::Read;

    fn pair() -> (TcpStream, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        (TcpStream::from_std(server), client)
    }

    #[test]
    fn queued_bytes_reach_the_socket() {
        let poll = Poll::new().unwrap();
        let (socket, mut remote) = pair();
        let mut conn = Connection::client(Token(0), socket);
        let interest = conn.initial_interest();
        poll.registry()
            .register(&mut conn.socket, Token(0), interest)
            .unwrap();

        conn.queue(b"hello", poll.registry()).unwrap();
        assert!(!conn.has_pending_output());

        let mut buf = [0u8; 5];
        remote.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn close_waits_for_drain() {
        let (socket, _remote) = pair();
        let mut conn = Connection::client(Token(1), socket);
        conn.close_after_flush = true;
        assert!(conn.wants_close());
        conn.outbound.extend_from_slice(b"pending");
        assert!(!conn.wants_close());
    }

    #[test]
    fn connecting_upstream_holds_output() {
        let (socket, _remote) = pair();
        let request_id = Uuid::new_v4();
        let mut conn = Connection::upstream(
            Token(2),
            socket,
            Token(0),
            request_id,
            Phase::AwaitingResponseHeaders,
        );
        assert_eq!(conn.peer, Some(Token(0)));
        assert_eq!(conn.request_id, request_id);
        conn.outbound.extend_from_slice(b"GET / HTTP/1.1\r\n\r\n");
        conn.flush().unwrap();
        assert!(conn.has_pending_output());

        assert!(conn.finish_connect().unwrap());
        conn.flush().unwrap();
        assert!(!conn.has_pending_output());
    }
}
