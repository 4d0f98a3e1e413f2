//! Response cache and search index kept in step.
//!
//! # Responsibilities
//! - Admit completed responses and index their bodies
//! - Prune an evicted entry's postings before the entry is dropped
//! - Answer searches with URLs that are resident in the cache

use crate::cache::{Admission, AuditError, AuditLog, ResponseCache};
use crate::config::schema::CacheConfig;
use crate::http::Response;
use crate::observability::metrics;
use crate::search::{SearchIndex, SearchResults};

#[derive(Debug)]
pub struct ContentStore {
    cache: ResponseCache,
    index: SearchIndex,
}

impl ContentStore {
    pub fn new(cache: ResponseCache) -> Self {
        Self {
            cache,
            index: SearchIndex::new(),
        }
    }

    /// Builds the cache described by `config`, opening its audit log.
    pub fn from_config(config: &CacheConfig) -> Result<Self, AuditError> {
        let audit = match config.audit_path() {
            Some(path) => AuditLog::open(&path, config.eviction)?,
            None => AuditLog::disabled(),
        };
        Ok(Self::new(ResponseCache::new(
            config.capacity,
            config.eviction,
            audit,
        )))
    }

    /// Cached response for `url`, refreshing its recency on a hit.
    pub fn lookup(&mut self, url: &str) -> Option<&Response> {
        let hit = self.cache.lookup(url);
        metrics::record_cache_event(if hit.is_some() { "hit" } else { "miss" });
        hit
    }

    /// Caches `response` under `url` and indexes its body.
    pub fn admit(&mut self, url: &str, response: Response) -> Admission {
        let body = response.body.clone();
        let index = &mut self.index;
        let admission = self.cache.admit(url, response, |victim| {
            index.prune(&victim.key);
        });

        if let Admission::Admitted { evicted } = &admission {
            self.index.extract_keywords(&body, url);
            if evicted.is_some() {
                metrics::record_cache_event("evict");
            }
            metrics::record_cache_event("admit");
            metrics::record_cache_size(self.cache.len());
        }
        admission
    }

    pub fn find_relevant(&self, query: &str) -> SearchResults {
        metrics::record_search_query();
        self.index.find_relevant(query)
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionPolicy;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn store(capacity: usize, policy: EvictionPolicy) -> ContentStore {
        ContentStore::new(ResponseCache::with_rng(
            capacity,
            policy,
            AuditLog::disabled(),
            StdRng::seed_from_u64(3),
        ))
    }

    fn page(body: &str) -> Response {
        Response::new("HTTP/1.1", 200, "OK").with_body(body)
    }

    #[test]
    fn ranking_scenario() {
        let mut store = store(3, EvictionPolicy::Lru);
        store.admit("u1", page("apple apple banana"));
        store.admit("u2", page("apple cherry"));

        let results = store.find_relevant("apple");
        assert_eq!(results.urls().collect::<Vec<_>>(), vec!["u1", "u2"]);
    }

    #[test]
    fn readmission_does_not_duplicate_postings() {
        let mut store = store(3, EvictionPolicy::Lru);
        store.admit("u1", page("apple"));
        assert_eq!(store.admit("u1", page("apple")), Admission::AlreadyPresent);
        assert_eq!(store.index().postings("apple").len(), 1);
    }

    #[test]
    fn eviction_prunes_index() {
        let mut store = store(1, EvictionPolicy::Lru);
        store.admit("u1", page("<p>apple orchard</p>"));
        store.admit("u2", page("cherry orchard"));

        assert!(!store.index().references("u1"));
        let results = store.find_relevant("apple orchard");
        assert_eq!(results.urls().collect::<Vec<_>>(), vec!["u2"]);
    }

    #[test]
    fn search_only_returns_resident_urls() {
        for policy in [EvictionPolicy::Lru, EvictionPolicy::Mru, EvictionPolicy::Random] {
            let mut store = store(3, policy);
            for i in 0..12 {
                let url = format!("http://fruit/{i}");
                store.admit(&url, page("apple banana cherry"));
                if i % 2 == 0 {
                    store.lookup(&url);
                }
                for hit in store.find_relevant("apple banana").urls() {
                    assert!(store.cache().contains(hit), "{hit} not resident");
                }
            }
        }
    }

    #[test]
    fn from_config_without_audit_file() {
        let config = CacheConfig {
            capacity: 2,
            eviction: EvictionPolicy::Mru,
            audit_log: String::new(),
            ..CacheConfig::default()
        };
        let store = ContentStore::from_config(&config).unwrap();
        assert_eq!(store.cache().capacity(), 2);
        assert_eq!(store.cache().policy(), EvictionPolicy::Mru);
    }
}
