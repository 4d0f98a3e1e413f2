//! Append-only record of cache activity.
//!
//! The file starts with a line naming the eviction policy, followed by one
//! line per event: `HH:MM:SS ACTION URL`.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::cache::eviction::EvictionPolicy;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to open audit log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write audit log header: {0}")]
    Header(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Admit,
    Evict,
    Fetch,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Admit => "ADMIT",
            AuditAction::Evict => "EVICT",
            AuditAction::Fetch => "FETCH",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for audit lines. A disabled log drops every record.
pub struct AuditLog {
    sink: Option<Box<dyn Write + Send>>,
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}

impl AuditLog {
    /// Opens `path` for appending and writes the policy header.
    pub fn open(path: &Path, policy: EvictionPolicy) -> Result<Self, AuditError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| AuditError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), %policy, "Cache audit log opened");
        Self::from_writer(file, policy)
    }

    /// Audit log over an arbitrary writer.
    pub fn from_writer(
        writer: impl Write + Send + 'static,
        policy: EvictionPolicy,
    ) -> Result<Self, AuditError> {
        let mut sink: Box<dyn Write + Send> = Box::new(writer);
        writeln!(sink, "Eviction policy: {policy}")
            .and_then(|_| sink.flush())
            .map_err(AuditError::Header)?;
        Ok(Self { sink: Some(sink) })
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    #[cfg(test)]
    fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Appends one event. Write failures are logged and otherwise ignored.
    pub fn record(&mut self, action: AuditAction, url: &str) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let line = format!("{} {} {}", timestamp(), action, url);
        if let Err(e) = writeln!(sink, "{line}").and_then(|_| sink.flush()) {
            tracing::warn!(error = %e, %action, url, "Failed to write cache audit record");
        }
    }
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| String::from("00:00:00"))
}
