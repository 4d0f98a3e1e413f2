//! Bounded URL-keyed response cache.
//!
//! # Responsibilities
//! - Hold complete upstream responses keyed by request URL
//! - Enforce the capacity bound with a pluggable eviction policy
//! - Record every admit, evict and fetch in the audit log
//!
//! # Design Decisions
//! - Recency is a logical tick, not wall-clock time, so LRU/MRU never tie
//! - Admission is first-write-wins: re-admitting a resident URL is a no-op
//! - The victim is handed to a caller-supplied hook before it is dropped so
//!   anything referring to it by URL can be cleaned up first

pub mod audit;
pub mod eviction;

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::http::Response;

pub use audit::{AuditAction, AuditError, AuditLog};
pub use eviction::EvictionPolicy;

/// Default number of resident responses.
pub const DEFAULT_CAPACITY: usize = 3;

/// One cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub response: Response,
    /// Logical time of the last admit or hit.
    pub last_accessed: u64,
}

/// Outcome of [`ResponseCache::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Stored; `evicted` names the entry that made room, if any.
    Admitted { evicted: Option<String> },
    /// The URL was already resident; nothing changed.
    AlreadyPresent,
}

#[derive(Debug)]
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    policy: EvictionPolicy,
    clock: u64,
    rng: StdRng,
    audit: AuditLog,
}

impl ResponseCache {
    /// Creates an empty cache. A capacity of zero is raised to one.
    pub fn new(capacity: usize, policy: EvictionPolicy, audit: AuditLog) -> Self {
        Self::with_rng(capacity, policy, audit, StdRng::from_entropy())
    }

    /// Like [`ResponseCache::new`] with a caller-provided generator for the
    /// random policy.
    pub fn with_rng(capacity: usize, policy: EvictionPolicy, audit: AuditLog, rng: StdRng) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
            policy,
            clock: 0,
            rng,
            audit,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Returns the cached response for `url`, refreshing its recency.
    pub fn lookup(&mut self, url: &str) -> Option<&Response> {
        let now = self.tick();
        let entry = self.entries.get_mut(url)?;
        entry.last_accessed = now;
        self.audit.record(AuditAction::Fetch, url);
        tracing::debug!(url, "Cache hit");
        Some(&entry.response)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// Stores `response` under `url`.
    ///
    /// At capacity, one victim is chosen by the active policy and passed to
    /// `on_evict` while still resident, then removed before the insert.
    pub fn admit<F>(&mut self, url: &str, response: Response, on_evict: F) -> Admission
    where
        F: FnOnce(&CacheEntry),
    {
        if self.entries.contains_key(url) {
            return Admission::AlreadyPresent;
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some(victim) = eviction::select_victim(self.policy, &self.entries, &mut self.rng)
            {
                if let Some(entry) = self.entries.get(&victim) {
                    on_evict(entry);
                }
                self.entries.remove(&victim);
                self.audit.record(AuditAction::Evict, &victim);
                tracing::debug!(url = %victim, policy = %self.policy, "Cache eviction");
                evicted = Some(victim);
            }
        }

        let now = self.tick();
        self.entries.insert(
            url.to_string(),
            CacheEntry {
                key: url.to_string(),
                response,
                last_accessed: now,
            },
        );
        self.audit.record(AuditAction::Admit, url);
        tracing::debug!(url, resident = self.entries.len(), "Cache admission");

        Admission::Admitted { evicted }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Resident URLs in no particular order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
