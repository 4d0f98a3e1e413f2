//! Errors that stop the event loop or prevent it from starting.
//!
//! Per-connection failures never surface here: they are logged and turned
//! into a teardown of the affected connection pair.

use std::io;
use thiserror::Error;

use crate::cache::audit::AuditError;

/// Fatal proxy errors.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The readiness poller could not be created.
    #[error("failed to create poller: {0}")]
    Poll(#[source] io::Error),

    /// The configured listen address is not a socket address.
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    /// Binding the listening socket failed.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// A socket or waker could not be registered with the poller.
    #[error("failed to register {what}: {source}")]
    Register {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    /// Waiting for readiness failed for a reason other than an interrupt.
    #[error("readiness wait failed: {0}")]
    Wait(#[source] io::Error),

    /// The cache audit log could not be opened.
    #[error(transparent)]
    Audit(#[from] AuditError),
}
