//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_accepted_total` (counter): client connections accepted
//! - `proxy_upstream_connects_total` (counter): upstream connects by `outcome`
//! - `proxy_cache_events_total` (counter): cache activity by `action`
//! - `proxy_search_queries_total` (counter): search queries answered
//! - `proxy_open_connections` (gauge): sockets in the registry
//! - `proxy_cache_entries` (gauge): resident cache entries

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub fn record_connection_accepted() {
    counter!("proxy_connections_accepted_total").increment(1);
}

/// `outcome` is `connected` or `failed`.
pub fn record_upstream_connect(outcome: &'static str) {
    counter!("proxy_upstream_connects_total", "outcome" => outcome).increment(1);
}

/// `action` is `admit`, `evict`, `hit` or `miss`.
pub fn record_cache_event(action: &'static str) {
    counter!("proxy_cache_events_total", "action" => action).increment(1);
}

pub fn record_search_query() {
    counter!("proxy_search_queries_total").increment(1);
}

pub fn record_open_connections(count: usize) {
    gauge!("proxy_open_connections").set(count as f64);
}

pub fn record_cache_size(entries: usize) {
    gauge!("proxy_cache_entries").set(entries as f64);
}

/// Installs the Prometheus recorder with a scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}
