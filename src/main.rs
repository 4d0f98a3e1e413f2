//! search-proxy
//!
//! A caching forward proxy with keyword search over the pages it has cached.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                     SEARCH PROXY                     │
//!                  │                                                      │
//!   Client ────────┼─▶ proxy::dispatcher ──▶ proxy::state ──▶ net::upstream┼──▶ Origin
//!                  │     (mio Poll, slab)     (heads, relay,   (connect)   │
//!                  │                           tunnels)                   │
//!                  │                              │                       │
//!                  │                              ▼                       │
//!                  │                         store::ContentStore          │
//!                  │                      ┌──────────┴──────────┐         │
//!                  │                      ▼                     ▼         │
//!                  │                cache (LRU/MRU/random)  search index  │
//!                  │                      │                               │
//!                  │                      ▼                               │
//!                  │                 audit log file                       │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use search_proxy::cache::EvictionPolicy;
use search_proxy::config::{load_config, validate_config, ProxyConfig};
use search_proxy::observability::{logging, metrics};
use search_proxy::{ContentStore, Proxy, ProxyError};

/// Caching forward proxy with keyword search over cached pages.
#[derive(Debug, Parser)]
#[command(name = "search-proxy", version)]
struct Cli {
    /// Host name clients use to address the proxy itself.
    proxy_host: String,

    /// Port to listen on.
    proxy_port: u16,

    /// Cache eviction policy.
    #[arg(value_enum)]
    eviction_policy: Option<EvictionPolicy>,

    /// Optional TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (overrides the config file).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("search-proxy: {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => ProxyConfig::default(),
    };
    apply_overrides(&mut config, &cli);

    logging::init(&config.observability.log_level);
    tracing::info!("search-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(%error, "Invalid configuration");
        }
        return ExitCode::FAILURE;
    }

    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        policy = %config.cache.eviction,
        capacity = config.cache.capacity,
        audit_log = %config.cache.audit_log,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    match run(&config) {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Proxy failed");
            ExitCode::FAILURE
        }
    }
}

fn apply_overrides(config: &mut ProxyConfig, cli: &Cli) {
    config.listener.host = cli.proxy_host.clone();
    config.listener.port = cli.proxy_port;
    if let Some(policy) = cli.eviction_policy {
        config.cache.eviction = policy;
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
}

fn run(config: &ProxyConfig) -> Result<(), ProxyError> {
    let store = ContentStore::from_config(&config.cache)?;
    let mut proxy = Proxy::bind(config, store)?;
    proxy.run()?;
    Ok(())
}
