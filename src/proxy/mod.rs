//! Readiness-driven proxy core.
//!
//! # Data Flow
//! ```text
//! mio::Poll readiness
//!     → dispatcher.rs (accept, route by Token, teardown, idle sweep)
//!     → state.rs (read chunks, detect heads, route, relay)
//!         → ContentStore (cache lookup / admit, search)
//!         → query.rs (requests addressed to the proxy itself)
//!     → connection.rs (outbound queue, write interest)
//! ```
//!
//! # Design Decisions
//! - The slab is the only owner of connections; peers refer to each other
//!   by `Token`, so removing one side can never leave a dangling pointer
//! - Handlers never remove entries: they return `SessionResult::Close` and
//!   the dispatcher tears down the pair
//! - Readiness is edge-triggered, so every readable event drains its socket

pub mod connection;
pub mod dispatcher;
pub mod query;
mod state;

use std::time::Duration;

use mio::Registry;
use slab::Slab;

use crate::config::ProxyConfig;
use crate::net::Connector;
use crate::store::ContentStore;

pub use connection::{Connection, Phase, Role, SessionResult};
pub use dispatcher::Proxy;

/// Runtime limits derived from configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// `host:port` that marks a request as addressed to the proxy.
    pub authority: String,
    pub max_connections: usize,
    pub max_header_bytes: usize,
    pub max_object_bytes: usize,
    pub read_chunk: usize,
    pub poll_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Settings {
    /// Settings for `config`, advertising `port` (the bound port, which may
    /// differ from the configured one when that was 0).
    pub fn from_config(config: &ProxyConfig, port: u16) -> Self {
        Self {
            authority: format!("{}:{}", config.listener.host, port),
            max_connections: config.listener.max_connections.max(1),
            max_header_bytes: config.buffers.max_header_bytes.max(1),
            max_object_bytes: config.cache.max_object_bytes,
            read_chunk: config.buffers.read_chunk.max(1),
            poll_timeout: config.timeouts.poll(),
            idle_timeout: config.timeouts.idle(),
        }
    }
}

/// Everything a handler may touch while processing one event.
pub(crate) struct Context<'a> {
    pub connections: &'a mut Slab<Connection>,
    pub registry: &'a Registry,
    pub store: &'a mut ContentStore,
    pub connector: &'a mut dyn Connector,
    pub settings: &'a Settings,
    pub scratch: &'a mut Vec<u8>,
}
