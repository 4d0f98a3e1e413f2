//! Shutdown coordination for the proxy.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::{Registry, Token, Waker};

/// Handle that stops a running event loop from any thread.
///
/// Triggering sets a flag and wakes the poller, so the loop notices without
/// waiting for the next socket event or poll timeout.
#[derive(Clone, Debug)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl Shutdown {
    /// Create a shutdown handle bound to the poller behind `registry`.
    pub fn new(registry: &Registry, token: Token) -> io::Result<Self> {
        Ok(Self {
            flag: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(Waker::new(registry, token)?),
        })
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutdown requested");
        }
        if let Err(e) = self.waker.wake() {
            tracing::warn!(error = %e, "Failed to wake event loop for shutdown");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
