//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Open audit log → Bind listener → Run loop
//!
//! Shutdown (shutdown.rs):
//!     Shutdown::trigger → waker fires → loop returns → sockets dropped
//! ```
//!
//! # Design Decisions
//! - The event loop owns every socket, so stopping the loop releases them
//! - Shutdown is a flag plus a poller wake-up, usable from any thread

pub mod shutdown;

pub use shutdown::Shutdown;
