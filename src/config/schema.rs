//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{EvictionPolicy, DEFAULT_CAPACITY};

/// Root configuration for the caching proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (advertised authority, bind address).
    pub listener: ListenerConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Socket buffer sizing.
    pub buffers: BufferConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host name clients use to address the proxy itself.
    pub host: String,

    /// Listening port, also part of the advertised authority.
    pub port: u16,

    /// Explicit bind address (e.g., "127.0.0.1:9085"). Empty binds all
    /// interfaces on `port`.
    pub bind_address: String,

    /// Maximum sockets tracked at once, clients and upstreams together.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9085,
            bind_address: String::new(),
            max_connections: 1024,
        }
    }
}

impl ListenerConfig {
    /// `host:port` as clients write it in a `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address to bind. Fails only for a non-empty, unparsable
    /// `bind_address`.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        if self.bind_address.is_empty() {
            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port))
        } else {
            self.bind_address.parse()
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of responses kept.
    pub capacity: usize,

    /// Victim selection when the cache is full.
    pub eviction: EvictionPolicy,

    /// Audit log path. Empty disables the audit file.
    pub audit_log: String,

    /// Responses declaring a larger body are relayed but not cached.
    pub max_object_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            eviction: EvictionPolicy::Lru,
            audit_log: "cache.log".to_string(),
            max_object_bytes: 16 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn audit_path(&self) -> Option<PathBuf> {
        (!self.audit_log.is_empty()).then(|| PathBuf::from(&self.audit_log))
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Longest single readiness wait in seconds.
    pub poll_secs: u64,

    /// Idle connection timeout in seconds (0 = never).
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            poll_secs: 60,
            idle_secs: 300,
        }
    }
}

impl TimeoutConfig {
    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    pub fn idle(&self) -> Option<Duration> {
        (self.idle_secs > 0).then(|| Duration::from_secs(self.idle_secs))
    }
}

/// Socket buffer sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Bytes requested per non-blocking read.
    pub read_chunk: usize,

    /// Largest accepted request or response head.
    pub max_header_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            read_chunk: 8192,
            max_header_bytes: 64 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.authority(), "localhost:9085");
        assert_eq!(
            config.listener.socket_addr().unwrap(),
            "0.0.0.0:9085".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.cache.capacity, 3);
        assert_eq!(config.cache.eviction, EvictionPolicy::Lru);
        assert_eq!(config.cache.audit_path(), Some(PathBuf::from("cache.log")));
        assert_eq!(config.timeouts.idle(), Some(Duration::from_secs(300)));
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            port = 8080

            [cache]
            eviction = "random"
            audit_log = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.listener.host, "localhost");
        assert_eq!(config.cache.eviction, EvictionPolicy::Random);
        assert_eq!(config.cache.audit_path(), None);
        assert_eq!(config.buffers.read_chunk, 8192);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let result = toml::from_str::<ProxyConfig>("[cache]\neviction = \"fifo\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn zero_idle_disables_sweep() {
        let timeouts = TimeoutConfig {
            poll_secs: 1,
            idle_secs: 0,
        };
        assert_eq!(timeouts.idle(), None);
        assert_eq!(timeouts.poll(), Duration::from_secs(1));
    }
}
