//! HTTP message model.
//!
//! # Data Flow
//! ```text
//! inbound bytes (one connection)
//!     → net::wire::HeadScanner (head complete?)
//!     → parser.rs (Request / Response with explicit lengths)
//!     → proxy state machine routes on Method
//!     → cached Response → parser::serialize_response (Age recomputed)
//!     → answers.rs for responses the proxy produces itself
//! ```
//!
//! # Design Decisions
//! - Parsing works on byte slices with a known length, never on
//!   NUL-terminated scans
//! - Unknown methods parse successfully as `Method::Unsupported`
//! - Header lookup is an exact, case-sensitive name match
//! - An `Age` header is dropped on ingestion and recomputed on output

pub mod answers;
pub mod message;
pub mod parser;

pub use message::{Header, HeaderList, Method, Request, Response};
pub use parser::{parse_request, parse_response, serialize_response, ParseError};
