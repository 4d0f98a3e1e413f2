//! Keyword search over cached documents.
//!
//! # Data Flow
//! ```text
//! cache admission (body bytes, URL)
//!     → tokenizer.rs (strip markup, lowercase, drop short words and stop words)
//!     → index.rs (per-document counts → top keywords → postings by URL)
//!
//! query string
//!     → tokenizer.rs (same filtering)
//!     → index.rs (fold keyword postings, rank by tf, top five)
//! ```
//!
//! # Design Decisions
//! - Postings name documents by URL; the cache resolves them, the index never
//!   owns a response
//! - Eviction prunes postings before the cache entry is dropped

pub mod index;
pub mod tokenizer;

pub use index::{Posting, SearchIndex, SearchResults, NUM_TOP_RESULTS};
pub use tokenizer::{strip_content, tokenize_and_filter};
