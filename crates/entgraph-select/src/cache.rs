//! Statement template caching.
//!
//! A selector renders one SQL template per distinct block size and dialect.
//! Templates are immutable once built, so they are cached and shared by every
//! load (and thread) going through the same selector.

use entgraph_core::Dialect;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Shape of one `IN` block: what a template depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    /// Dialect the placeholders were rendered for.
    pub dialect: Dialect,
    /// Number of identifiers in the block.
    pub block_size: usize,
}

#[derive(Debug, Clone)]
struct CachedStatement {
    sql: Arc<str>,
    last_used: Instant,
    hit_count: u64,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Templates rendered (cache misses).
    pub builds: u64,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Templates currently cached.
    pub entries: usize,
}

/// LRU-style cache for rendered statement templates.
///
/// When the cache exceeds `max_size`, the least-recently-used entry is evicted.
///
/// # Example
///
/// ```
/// use entgraph_core::Dialect;
/// use entgraph_select::cache::{StatementCache, TemplateKey};
///
/// let mut cache = StatementCache::new(8);
/// let key = TemplateKey { dialect: Dialect::Mysql, block_size: 2 };
///
/// let sql = cache.get_or_insert(key, || "SELECT * FROM t WHERE id IN (?, ?)".to_string());
/// assert_eq!(&*sql, "SELECT * FROM t WHERE id IN (?, ?)");
///
/// let called = std::cell::Cell::new(false);
/// cache.get_or_insert(key, || {
///     called.set(true);
///     String::new()
/// });
/// assert!(!called.get());
/// ```
#[derive(Debug)]
pub struct StatementCache {
    cache: HashMap<TemplateKey, CachedStatement>,
    max_size: usize,
    builds: u64,
    hits: u64,
}

impl StatementCache {
    /// Create a new cache with the given maximum number of entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: HashMap::with_capacity(max_size.min(64)),
            max_size: max_size.max(1),
            builds: 0,
            hits: 0,
        }
    }

    /// Get a cached template or render and insert it.
    ///
    /// The `builder` closure is only called on cache miss.
    pub fn get_or_insert(&mut self, key: TemplateKey, builder: impl FnOnce() -> String) -> Arc<str> {
        if let Some(entry) = self.cache.get_mut(&key) {
            entry.last_used = Instant::now();
            entry.hit_count += 1;
            self.hits += 1;
            return Arc::clone(&entry.sql);
        }

        if self.cache.len() >= self.max_size {
            self.evict_lru();
        }

        let sql: Arc<str> = Arc::from(builder());
        self.builds += 1;
        self.cache.insert(
            key,
            CachedStatement {
                sql: Arc::clone(&sql),
                last_used: Instant::now(),
                hit_count: 0,
            },
        );
        sql
    }

    /// Check if a template is cached.
    pub fn contains(&self, key: TemplateKey) -> bool {
        self.cache.contains_key(&key)
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Reuse count of one template, if cached.
    pub fn hit_count(&self, key: TemplateKey) -> Option<u64> {
        self.cache.get(&key).map(|entry| entry.hit_count)
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            builds: self.builds,
            hits: self.hits,
            entries: self.cache.len(),
        }
    }

    /// Clear all cached templates. Counters are kept.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn evict_lru(&mut self) {
        if let Some((&lru_key, _)) = self.cache.iter().min_by_key(|(_, entry)| entry.last_used) {
            tracing::trace!(block_size = lru_key.block_size, "Evicting statement template");
            self.cache.remove(&lru_key);
        }
    }
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(block_size: usize) -> TemplateKey {
        TemplateKey {
            dialect: Dialect::Postgres,
            block_size,
        }
    }

    #[test]
    fn test_cache_hit_reuses_template() {
        let mut cache = StatementCache::new(10);
        let first = cache.get_or_insert(key(3), || "SELECT 3".to_string());
        let second = cache.get_or_insert(key(3), || "SELECT other".to_string());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.hit_count(key(3)), Some(1));
        assert_eq!(
            cache.stats(),
            CacheStats {
                builds: 1,
                hits: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn test_dialect_is_part_of_the_key() {
        let mut cache = StatementCache::new(10);
        cache.get_or_insert(key(1), || "pg".to_string());
        let mysql = TemplateKey {
            dialect: Dialect::Mysql,
            block_size: 1,
        };
        assert!(!cache.contains(mysql));
        assert_eq!(&*cache.get_or_insert(mysql, || "my".to_string()), "my");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_eviction() {
        let mut cache = StatementCache::new(2);
        cache.get_or_insert(key(1), || "1".to_string());
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.get_or_insert(key(2), || "2".to_string());
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.get_or_insert(key(1), || "1".to_string());
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.get_or_insert(key(3), || "3".to_string());

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(key(1)));
        assert!(!cache.contains(key(2)));
        assert!(cache.contains(key(3)));
    }

    #[test]
    fn test_clear_keeps_counters() {
        let mut cache = StatementCache::default();
        cache.get_or_insert(key(1), || "1".to_string());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().builds, 1);
    }
}
