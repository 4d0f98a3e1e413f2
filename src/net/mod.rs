//! Network primitives.
//!
//! # Responsibilities
//! - HTTP delimiter constants and head-completion detection
//! - Non-blocking read/write helpers that never wait on a single socket
//! - The upstream connect primitive (DNS + TCP handshake start)
//!
//! # Design Decisions
//! - Readiness is owned by the dispatcher; nothing here blocks on I/O
//! - `Connector` is a trait so the event loop can be exercised against
//!   instrumented or failing upstreams

pub mod upstream;
pub mod wire;

pub use upstream::{Connector, TcpConnector};
pub use wire::{HeadScanner, ReadOutcome, WriteOutcome};
