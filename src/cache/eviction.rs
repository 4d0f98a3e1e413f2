//! Victim selection policies.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;

/// Which resident entry makes room for a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the entry accessed longest ago.
    #[default]
    Lru,
    /// Evict the entry accessed most recently.
    Mru,
    /// Evict a uniformly chosen entry.
    Random,
}

impl EvictionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "LRU",
            EvictionPolicy::Mru => "MRU",
            EvictionPolicy::Random => "RANDOM",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Picks the key to evict, or `None` for an empty table.
///
/// Access ticks are unique, so LRU and MRU are deterministic. Random picks
/// over sorted keys so a seeded generator gives reproducible choices.
pub fn select_victim<R: Rng + ?Sized>(
    policy: EvictionPolicy,
    entries: &HashMap<String, CacheEntry>,
    rng: &mut R,
) -> Option<String> {
    match policy {
        EvictionPolicy::Lru => entries
            .values()
            .min_by_key(|entry| entry.last_accessed)
            .map(|entry| entry.key.clone()),
        EvictionPolicy::Mru => entries
            .values()
            .max_by_key(|entry| entry.last_accessed)
            .map(|entry| entry.key.clone()),
        EvictionPolicy::Random => {
            if entries.is_empty() {
                return None;
            }
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            let pick = rng.gen_range(0..keys.len());
            Some(keys[pick].clone())
        }
    }
}
