use searchpipe_core::{CacheStats, Config, Operation, RemoteResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    result: RemoteResult,
    created_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < ttl
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// In-memory, TTL-bounded cache of successful remote results.
///
/// Expired entries are dropped lazily when looked up (or when room is needed on store);
/// nothing sweeps on a timer. Concurrent misses for one key are not coalesced.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_entries: 0,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Bound the number of entries (0 = unbounded).
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_ttl()).with_max_entries(config.cache_max_entries())
    }

    /// Canonical key: operation kind plus the sorted wire parameters, hashed.
    ///
    /// Values are length-prefixed so no choice of query text can collide with another field.
    pub fn key_for(op: &Operation) -> String {
        let mut pairs = op.query_pairs();
        pairs.sort();
        let mut h = Sha256::new();
        h.update(b"kind:");
        h.update(op.kind().as_str().as_bytes());
        h.update(b"\n");
        for (k, v) in &pairs {
            h.update(k.as_bytes());
            h.update(b"=");
            h.update(v.len().to_string().as_bytes());
            h.update(b":");
            h.update(v.as_bytes());
            h.update(b"\n");
        }
        hex::encode(h.finalize())
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn lookup(&self, op: &Operation) -> Option<RemoteResult> {
        let key = Self::key_for(op);
        let now = Instant::now();
        let mut s = self.lock();
        let (fresh, expired) = match s.entries.get(&key) {
            Some(entry) if entry.is_fresh(self.ttl, now) => (Some(entry.result.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };
        if expired {
            s.entries.remove(&key);
            debug!(kind = %op.kind(), "cache entry expired");
        }
        if fresh.is_some() {
            s.hits += 1;
        } else {
            s.misses += 1;
        }
        fresh
    }

    pub fn store(&self, op: &Operation, result: RemoteResult) {
        let key = Self::key_for(op);
        let now = Instant::now();
        let mut s = self.lock();
        if self.max_entries > 0
            && !s.entries.contains_key(&key)
            && s.entries.len() >= self.max_entries
        {
            let ttl = self.ttl;
            s.entries.retain(|_, e| e.is_fresh(ttl, now));
            if s.entries.len() >= self.max_entries {
                let oldest = s
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.created_at)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    s.entries.remove(&k);
                }
            }
        }
        s.entries.insert(
            key,
            CacheEntry {
                result,
                created_at: now,
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let s = self.lock();
        CacheStats {
            hits: s.hits,
            misses: s.misses,
            entries: s.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use searchpipe_core::{
        CrawlParameters, CrawlResult, NewsParameters, SearchParameters, SearchResults, TimeRange,
    };

    fn search(q: &str) -> Operation {
        Operation::Search(SearchParameters::new(q))
    }

    fn result(q: &str) -> RemoteResult {
        RemoteResult::Search(SearchResults {
            query: q.to_string(),
            results: vec![],
            suggestions: None,
        })
    }

    #[test]
    fn keys_ignore_construction_order_and_surrounding_whitespace() {
        let a = SearchParameters::new("rust")
            .with_language("en")
            .with_page(2)
            .with_time_range(TimeRange::Week);
        let b = SearchParameters::new("  rust ")
            .with_time_range(TimeRange::Week)
            .with_page(2)
            .with_language("en");
        assert_eq!(
            ResponseCache::key_for(&Operation::Search(a)),
            ResponseCache::key_for(&Operation::Search(b))
        );
    }

    #[test]
    fn keys_distinguish_kind_case_and_fields() {
        let k = ResponseCache::key_for(&search("rust"));
        assert_ne!(k, ResponseCache::key_for(&search("Rust")));
        assert_ne!(
            k,
            ResponseCache::key_for(&Operation::News(NewsParameters::new("rust")))
        );
        assert_ne!(
            k,
            ResponseCache::key_for(&Operation::Search(
                SearchParameters::new("rust").with_page(2)
            ))
        );
        // An explicit "none" time range is the same request as no time range.
        assert_eq!(
            k,
            ResponseCache::key_for(&Operation::Search(
                SearchParameters::new("rust").with_time_range(TimeRange::None)
            ))
        );
    }

    #[test]
    fn hits_and_misses_are_counted() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        assert!(cache.lookup(&search("a")).is_none());
        cache.store(&search("a"), result("a"));
        assert_eq!(cache.lookup(&search("a")), Some(result("a")));
        assert_eq!(cache.lookup(&search(" a ")), Some(result("a")));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 2,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn expired_entries_are_evicted_on_lookup() {
        let cache = ResponseCache::new(Duration::from_millis(30));
        cache.store(&search("a"), result("a"));
        assert!(cache.lookup(&search("a")).is_some());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.lookup(&search("a")).is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn zero_ttl_never_serves() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.store(&search("a"), result("a"));
        assert!(cache.lookup(&search("a")).is_none());
    }

    #[test]
    fn stores_overwrite() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let op = Operation::Crawl(CrawlParameters::new("https://example.com"));
        let v1 = RemoteResult::Crawl(CrawlResult {
            url: "https://example.com".into(),
            title: Some("v1".into()),
            content: None,
            metadata: None,
        });
        let mut v2 = v1.clone();
        if let RemoteResult::Crawl(c) = &mut v2 {
            c.title = Some("v2".into());
        }
        cache.store(&op, v1);
        cache.store(&op, v2.clone());
        assert_eq!(cache.lookup(&op), Some(v2));
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn capacity_evicts_the_oldest_entry() {
        let cache = ResponseCache::new(Duration::from_secs(60)).with_max_entries(2);
        cache.store(&search("a"), result("a"));
        std::thread::sleep(Duration::from_millis(2));
        cache.store(&search("b"), result("b"));
        std::thread::sleep(Duration::from_millis(2));
        cache.store(&search("c"), result("c"));
        assert_eq!(cache.stats().entries, 2);
        assert!(cache.lookup(&search("a")).is_none());
        assert!(cache.lookup(&search("b")).is_some());
        assert!(cache.lookup(&search("c")).is_some());
    }

    proptest! {
        #[test]
        fn key_is_hex_sha256_and_trim_invariant(q in "\\PC*", pad in "[ \\t]{0,4}") {
            let k1 = ResponseCache::key_for(&search(&q));
            let k2 = ResponseCache::key_for(&search(&format!("{pad}{q}{pad}")));
            prop_assert_eq!(k1.len(), 64);
            prop_assert!(k1.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
            prop_assert_eq!(k1, k2);
        }
    }
}
