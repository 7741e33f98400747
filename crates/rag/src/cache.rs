//! Retrieval result cache
//!
//! Entries expire after a fixed TTL and are removed when a lookup finds them
//! stale. On overflow the oldest-inserted entry is evicted; reads do not
//! refresh an entry's position, and re-inserting an existing key keeps it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use voice_bridge_core::ContextSnippet;

/// Cache key for a query: `rag:{session}:{first prefix_chars chars of query}`
pub fn cache_key(session_id: &str, query: &str, prefix_chars: usize) -> String {
    let prefix: String = query.chars().take(prefix_chars).collect();
    format!("rag:{}:{}", session_id, prefix)
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub expirations: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

struct Entry {
    snippets: Vec<ContextSnippet>,
    inserted_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    // Insertion order; holds exactly the keys of `entries`
    order: VecDeque<String>,
}

impl Inner {
    fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }
}

/// Shared, thread-safe retrieval cache
pub struct RetrievalCache {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<Inner>,
    pub stats: CacheStats,
}

impl RetrievalCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            inner: Mutex::new(Inner::default()),
            stats: CacheStats::default(),
        }
    }

    /// Fresh entry for `key`, if any; a stale entry is removed
    pub fn get(&self, key: &str) -> Option<Vec<ContextSnippet>> {
        let mut inner = self.inner.lock();

        let (fresh, stale) = match inner.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => (Some(entry.snippets.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };
        if stale {
            inner.remove(key);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        }

        match fresh {
            Some(_) => self.stats.hits.fetch_add(1, Ordering::Relaxed),
            None => self.stats.misses.fetch_add(1, Ordering::Relaxed),
        };
        fresh
    }

    pub fn insert(&self, key: String, snippets: Vec<ContextSnippet>) {
        let mut inner = self.inner.lock();
        let entry = Entry {
            snippets,
            inserted_at: Instant::now(),
        };

        if inner.entries.insert(key.clone(), entry).is_none() {
            inner.order.push_back(key);
        }

        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}
