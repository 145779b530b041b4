//! The attribute cache: key → envelope.
//!
//! Authoritative after mutation: writes, truncates and utimes update the
//! cached envelope directly and later getattrs are served from here without
//! a network round-trip. Entries are evicted only on unlink/rmdir; there is
//! no TTL (single-writer mount).

use std::collections::HashMap;

use bucketfs_store::Envelope;

/// Hit/miss counters.
#[derive(Debug, Default, Clone)]
pub struct AttrCacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Current entry count.
    pub entries: usize,
}

/// Process-local map from key to attribute envelope.
#[derive(Default)]
pub struct AttrCache {
    entries: HashMap<String, Envelope>,
    stats: AttrCacheStats,
}

impl AttrCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a key, counting the hit or miss.
    pub fn get(&mut self, key: &str) -> Option<Envelope> {
        match self.entries.get(key) {
            Some(env) => {
                self.stats.hits += 1;
                Some(env.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, key: &str, envelope: Envelope) {
        self.entries.insert(key.to_string(), envelope);
        self.stats.entries = self.entries.len();
    }

    /// Drops an entry; absence is not an error.
    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.stats.entries = self.entries.len();
    }

    /// True iff the key is cached. Does not count as a lookup.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> AttrCacheStats {
        self.stats.clone()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True iff no entries are cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
