//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! event loop, cache, search index produce:
//!     → logging.rs (structured tracing events, request IDs as fields)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stderr via tracing-subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - The cache audit log is a separate file with a fixed line format and does
//!   not go through tracing
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
