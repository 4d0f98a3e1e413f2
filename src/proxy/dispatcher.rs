//! The event loop.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::answers;
use crate::lifecycle::Shutdown;
use crate::net::{Connector, TcpConnector};
use crate::observability::metrics;
use crate::proxy::connection::{Connection, Phase, Role, SessionResult};
use crate::proxy::{state, Context, Settings};
use crate::store::ContentStore;

const LISTENER: Token = Token(usize::MAX - 1);
const WAKER: Token = Token(usize::MAX - 2);

const EVENT_CAPACITY: usize = 1024;

/// Single-threaded forward proxy.
///
/// Owns the poller, the listening socket, every connection and the content
/// store. All state is touched only from the thread calling [`Proxy::run`]
/// or [`Proxy::turn`].
pub struct Proxy {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: Slab<Connection>,
    store: ContentStore,
    connector: Box<dyn Connector>,
    settings: Settings,
    scratch: Vec<u8>,
    shutdown: Shutdown,
    local_addr: SocketAddr,
}

impl Proxy {
    /// Binds the listener described by `config`.
    pub fn bind(config: &ProxyConfig, store: ContentStore) -> Result<Self, ProxyError> {
        let addr = config
            .listener
            .socket_addr()
            .map_err(|_| ProxyError::InvalidAddress(config.listener.bind_address.clone()))?;

        let poll = Poll::new().map_err(ProxyError::Poll)?;
        let mut listener = TcpListener::bind(addr).map_err(|source| ProxyError::Bind {
            address: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| ProxyError::Bind {
            address: addr.to_string(),
            source,
        })?;

        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(|source| ProxyError::Register {
                what: "listener",
                source,
            })?;
        let shutdown = Shutdown::new(poll.registry(), WAKER).map_err(|source| {
            ProxyError::Register {
                what: "waker",
                source,
            }
        })?;

        let settings = Settings::from_config(config, local_addr.port());
        tracing::info!(
            address = %local_addr,
            authority = %settings.authority,
            capacity = store.cache().capacity(),
            policy = %store.cache().policy(),
            "Proxy listening"
        );

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener,
            connections: Slab::new(),
            store,
            connector: Box::new(TcpConnector),
            scratch: vec![0; settings.read_chunk],
            settings,
            shutdown,
            local_addr,
        })
    }

    /// Replaces the upstream connect primitive.
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Box::new(connector);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `host:port` that marks requests for the query API.
    pub fn authority(&self) -> &str {
        &self.settings.authority
    }

    /// Handle that stops [`Proxy::run`] from another thread.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Sockets currently tracked, clients and upstreams together.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Runs until the shutdown handle is triggered.
    pub fn run(&mut self) -> Result<(), ProxyError> {
        let timeout = self.settings.poll_timeout;
        while !self.shutdown.is_triggered() {
            if self.turn(Some(timeout))? == 0 && !self.shutdown.is_triggered() {
                tracing::debug!(timeout_secs = timeout.as_secs(), "Readiness wait timed out");
            }
        }
        tracing::info!(open = self.connections.len(), "Event loop stopped");
        Ok(())
    }

    /// One iteration: wait for readiness, handle every event, sweep idle
    /// connections. Returns the number of events handled.
    pub fn turn(&mut self, timeout: Option<Duration>) -> Result<usize, ProxyError> {
        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() == ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(ProxyError::Wait(e));
        }

        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|event| {
                let failed = event.is_error();
                (
                    event.token(),
                    event.is_readable() || event.is_read_closed() || failed,
                    event.is_writable() || event.is_write_closed() || failed,
                )
            })
            .collect();

        for &(token, readable, writable) in &ready {
            match token {
                LISTENER => self.accept(),
                WAKER => {}
                token => self.dispatch(token, readable, writable),
            }
        }

        self.sweep_idle(Instant::now());
        metrics::record_open_connections(self.connections.len());
        Ok(ready.len())
    }

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((socket, addr)) => {
                    if self.connections.len() >= self.settings.max_connections {
                        tracing::warn!(
                            peer = %addr,
                            limit = self.settings.max_connections,
                            "Connection limit reached; dropping client"
                        );
                        continue;
                    }

                    let entry = self.connections.vacant_entry();
                    let token = Token(entry.key());
                    let mut conn = Connection::client(token, socket);
                    let interest = conn.initial_interest();
                    if let Err(e) = self
                        .poll
                        .registry()
                        .register(&mut conn.socket, token, interest)
                    {
                        tracing::warn!(peer = %addr, error = %e, "Failed to register client");
                        continue;
                    }
                    tracing::debug!(
                        token = token.0,
                        peer = %addr,
                        request_id = %conn.request_id,
                        "Client connected"
                    );
                    entry.insert(conn);
                    metrics::record_connection_accepted();
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }
    }

    fn dispatch(&mut self, token: Token, readable: bool, writable: bool) {
        if !self.connections.contains(token.0) {
            return;
        }
        let mut ctx = Context {
            connections: &mut self.connections,
            registry: self.poll.registry(),
            store: &mut self.store,
            connector: self.connector.as_mut(),
            settings: &self.settings,
            scratch: &mut self.scratch,
        };
        if state::ready(&mut ctx, token, readable, writable) == SessionResult::Close {
            self.close_pair(token);
        }
    }

    /// Removes `token` and ends its pair.
    ///
    /// The peer is unlinked first. A client still waiting for its response
    /// is told `502 Bad Gateway`. A peer with queued output stays registered
    /// without a peer until it drains; otherwise it is removed now.
    fn close_pair(&mut self, token: Token) {
        let Some(mut conn) = self.connections.try_remove(token.0) else {
            return;
        };
        let registry = self.poll.registry();
        if let Err(e) = registry.deregister(&mut conn.socket) {
            tracing::debug!(token = token.0, error = %e, "Deregister failed");
        }
        tracing::debug!(
            token = token.0,
            role = ?conn.role,
            phase = ?conn.phase,
            request_id = %conn.request_id,
            "Connection closed"
        );

        let Some(peer_token) = conn.peer else {
            return;
        };
        let Some(peer) = self.connections.get_mut(peer_token.0) else {
            return;
        };
        if peer.peer != Some(token) {
            return;
        }
        peer.peer = None;

        if peer.role == Role::Client && peer.phase == Phase::RequestRouted {
            let version = peer
                .request
                .as_ref()
                .map(|request| request.version.as_str())
                .unwrap_or_default();
            let reply = answers::error(version, 502);
            tracing::warn!(
                request_id = %peer.request_id,
                "Upstream closed before responding"
            );
            if let Err(e) = peer.queue(&reply, registry) {
                tracing::debug!(token = peer_token.0, error = %e, "Failed to send 502");
            }
        }
        peer.phase = Phase::Complete;
        peer.close_after_flush = true;

        if peer.wants_close() {
            if let Some(mut peer) = self.connections.try_remove(peer_token.0) {
                if let Err(e) = registry.deregister(&mut peer.socket) {
                    tracing::debug!(token = peer_token.0, error = %e, "Deregister failed");
                }
                tracing::debug!(token = peer_token.0, role = ?peer.role, "Peer closed with pair");
            }
        } else {
            if let Err(e) = peer.sync_interest(registry) {
                tracing::debug!(token = peer_token.0, error = %e, "Failed to update interest");
            }
            tracing::debug!(token = peer_token.0, "Peer detached; flushing before close");
        }
    }

    fn sweep_idle(&mut self, now: Instant) {
        let Some(limit) = self.settings.idle_timeout else {
            return;
        };
        // Upstreams go first so a waiting client is still told 502.
        let mut idle: Vec<(Role, Token)> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.idle_for(now) > limit)
            .map(|(key, conn)| (conn.role, Token(key)))
            .collect();
        idle.sort_by_key(|(role, _)| *role == Role::Client);

        for (_, token) in idle {
            // Sending a 502 counts as activity.
            let still_idle = self
                .connections
                .get(token.0)
                .is_some_and(|conn| conn.idle_for(now) > limit);
            if !still_idle {
                continue;
            }
            tracing::info!(token = token.0, idle_secs = limit.as_secs(), "Closing idle connection");
            self.close_pair(token);
        }
    }
}
