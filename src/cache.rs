//! Bounded in-memory cache for built search indices.
//!
//! Entries are bounded three ways: by age (TTL, checked lazily on access and
//! swept on every insert), by count, and by aggregate estimated size. Count and
//! size pressure evict the least recently accessed entry first.

use crate::config::CacheConfig;
use lru::LruCache;
use serde::Serialize;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Size assumed for a value whose estimate fails.
pub const FALLBACK_ESTIMATE_BYTES: u64 = 1024 * 1024;

/// Values that can report an approximate in-memory footprint.
pub trait EstimateSize {
    fn estimate_size(&self) -> anyhow::Result<u64>;
}

impl<T: EstimateSize + ?Sized> EstimateSize for Arc<T> {
    fn estimate_size(&self) -> anyhow::Result<u64> {
        (**self).estimate_size()
    }
}

impl EstimateSize for serde_json::Value {
    fn estimate_size(&self) -> anyhow::Result<u64> {
        serialized_size(self)
    }
}

impl EstimateSize for String {
    fn estimate_size(&self) -> anyhow::Result<u64> {
        serialized_size(self)
    }
}

/// Generic size heuristic: two bytes per character of the JSON serialization.
pub fn serialized_size<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<u64> {
    let json = serde_json::to_vec(value)?;
    Ok(json.len() as u64 * 2)
}

/// A cached value with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheRecord<V> {
    pub value: V,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub estimated_size_bytes: u64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub memory_usage_mb: f64,
    pub max_memory_mb: u64,
    pub hit_rate: f64,
}

/// Keyed cache with TTL expiry, LRU eviction, and a memory budget.
///
/// Not synchronized; owners share it behind a mutex.
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: LruCache<K, CacheRecord<V>>,
    config: CacheConfig,
    memory_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Hash + Eq, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("len", &self.entries.len())
            .field("memory_bytes", &self.memory_bytes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
    V: EstimateSize + Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: LruCache::unbounded(),
            config,
            memory_bytes: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn ttl(&self) -> Duration {
        self.config.ttl()
    }

    fn is_expired(&self, record: &CacheRecord<V>, now: Instant) -> bool {
        now.saturating_duration_since(record.created_at) > self.ttl()
    }

    /// Look up `key`, counting a hit or a miss. Expired entries are removed.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.peek(key) {
            None => {
                self.misses += 1;
                return None;
            }
            Some(record) => self.is_expired(record, now),
        };

        if expired {
            tracing::debug!("Cache entry {:?} expired", key);
            self.remove_entry(key);
            self.evictions += 1;
            self.misses += 1;
            return None;
        }

        let record = self.entries.get_mut(key)?;
        record.last_accessed_at = now;
        self.hits += 1;
        Some(record.value.clone())
    }

    /// Insert or replace `key`, then enforce TTL, count, and memory bounds.
    pub fn set(&mut self, key: K, value: V) {
        let estimated_size_bytes = match value.estimate_size() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    "Size estimation failed for {:?}, assuming {} bytes: {}",
                    key,
                    FALLBACK_ESTIMATE_BYTES,
                    e
                );
                FALLBACK_ESTIMATE_BYTES
            }
        };

        let now = Instant::now();
        // Back-to-back inserts must not look fresher than an entry read since.
        let last_accessed_at = if self.entries.contains(&key) {
            now
        } else {
            now.checked_sub(Duration::from_millis(1)).unwrap_or(now)
        };

        let record = CacheRecord {
            value,
            created_at: now,
            last_accessed_at,
            estimated_size_bytes,
        };
        if let Some((_, old)) = self.entries.push(key, record) {
            self.memory_bytes = self.memory_bytes.saturating_sub(old.estimated_size_bytes);
        }
        self.memory_bytes += estimated_size_bytes;

        self.enforce_constraints();
    }

    /// Whether `key` is present and unexpired. Does not touch counters or recency.
    pub fn has(&self, key: &K) -> bool {
        let now = Instant::now();
        self.entries
            .peek(key)
            .is_some_and(|record| !self.is_expired(record, now))
    }

    /// Unexpired value for `key` without touching counters or recency.
    pub fn peek(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .peek(key)
            .filter(|record| !self.is_expired(record, now))
            .map(|record| record.value.clone())
    }

    pub fn delete(&mut self, key: &K) -> bool {
        self.remove_entry(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.memory_bytes = 0;
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().rev().map(|(k, _)| k.clone()).collect()
    }

    /// Total estimated size of all entries.
    pub const fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let requests = self.hits + self.misses;
        let hit_rate = if requests == 0 {
            0.0
        } else {
            self.hits as f64 / requests as f64
        };

        CacheStats {
            size: self.entries.len(),
            max_size: self.config.max_size,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            memory_usage_mb: self.memory_bytes as f64 / (1024.0 * 1024.0),
            max_memory_mb: self.config.max_memory_mb,
            hit_rate,
        }
    }

    fn remove_entry(&mut self, key: &K) -> Option<CacheRecord<V>> {
        let record = self.entries.pop(key)?;
        self.memory_bytes = self.memory_bytes.saturating_sub(record.estimated_size_bytes);
        Some(record)
    }

    fn enforce_constraints(&mut self) {
        self.purge_expired();

        while self.entries.len() > self.config.max_size {
            if !self.evict_least_recent("size limit") {
                break;
            }
        }

        let max_memory = self.config.max_memory_bytes();
        while self.memory_bytes > max_memory && !self.entries.is_empty() {
            if !self.evict_least_recent("memory limit") {
                break;
            }
        }
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, record)| self.is_expired(record, now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in expired {
            tracing::debug!("Purging expired cache entry {:?}", key);
            self.remove_entry(&key);
            self.evictions += 1;
        }
    }

    /// Evict the entry with the oldest access time; ties go to the least
    /// recently used position.
    fn evict_least_recent(&mut self, reason: &str) -> bool {
        let victim = self
            .entries
            .iter()
            .rev()
            .fold(None::<(&K, Instant)>, |oldest, (key, record)| match oldest {
                Some((_, at)) if at <= record.last_accessed_at => oldest,
                _ => Some((key, record.last_accessed_at)),
            })
            .map(|(key, _)| key.clone());

        let Some(key) = victim else {
            return false;
        };

        tracing::debug!("Evicting cache entry {:?} ({})", key, reason);
        self.remove_entry(&key);
        self.evictions += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{check, let_assert};
    use rstest::rstest;

    /// Fixed-size test value.
    #[derive(Debug, Clone, PartialEq)]
    struct Blob(u64);

    impl EstimateSize for Blob {
        fn estimate_size(&self) -> anyhow::Result<u64> {
            Ok(self.0)
        }
    }

    #[derive(Debug, Clone)]
    struct Unsizable;

    impl EstimateSize for Unsizable {
        fn estimate_size(&self) -> anyhow::Result<u64> {
            anyhow::bail!("no idea")
        }
    }

    const MB: u64 = 1024 * 1024;

    fn config(max_size: usize, max_memory_mb: u64) -> CacheConfig {
        CacheConfig {
            max_size,
            max_memory_mb,
            ttl_minutes: 60,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_leaves_counters_and_recency_alone() {
        let mut cache = BoundedCache::new(config(2, 500));
        cache.set("A", Blob(1));
        cache.set("B", Blob(1));

        check!(cache.peek(&"A").is_some());
        check!(cache.peek(&"C").is_none());
        check!(cache.stats().hits == 0);
        check!(cache.stats().misses == 0);

        // A was only peeked, so it is still the least recent
        cache.set("C", Blob(1));
        check!(!cache.has(&"A"));

        tokio::time::advance(Duration::from_secs(61 * 60)).await;
        check!(cache.peek(&"B").is_none());
        check!(cache.stats().evictions == 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction_respects_access() {
        let mut cache = BoundedCache::new(config(2, 500));
        cache.set("A", Blob(1));
        cache.set("B", Blob(1));
        check!(cache.get(&"A") == Some(Blob(1)));

        cache.set("C", Blob(1));

        check!(cache.has(&"A"));
        check!(!cache.has(&"B"));
        check!(cache.has(&"C"));
        check!(cache.stats().evictions == 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_inserts_evict_in_insertion_order() {
        let mut cache = BoundedCache::new(config(2, 500));
        cache.set("A", Blob(1));
        cache.set("B", Blob(1));
        cache.set("C", Blob(1));
        check!(cache.keys() == vec!["B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_counts_miss() {
        let mut cache = BoundedCache::new(config(10, 500));
        cache.set("A", Blob(1));
        check!(cache.get(&"A").is_some());

        tokio::time::advance(Duration::from_secs(60 * 60 + 1)).await;

        check!(!cache.has(&"A"));
        check!(cache.get(&"A").is_none());
        let stats = cache.stats();
        check!(stats.hits == 1);
        check!(stats.misses == 1);
        check!(cache.size() == 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_purges_expired_entries() {
        let mut cache = BoundedCache::new(config(10, 500));
        cache.set("old", Blob(1));
        tokio::time::advance(Duration::from_secs(61 * 60)).await;
        cache.set("new", Blob(1));
        check!(cache.keys() == vec!["new"]);
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let mut cache = BoundedCache::new(config(10, 500));
        check!(cache.stats().hit_rate == 0.0);

        cache.set("A", Blob(1));
        cache.get(&"A");
        cache.get(&"A");
        cache.get(&"missing");

        let stats = cache.stats();
        check!(stats.hits == 2);
        check!(stats.misses == 1);
        check!((stats.hit_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_pressure_evicts_oldest() {
        let mut cache = BoundedCache::new(config(10, 3));
        cache.set("A", Blob(MB));
        cache.set("B", Blob(MB));
        cache.set("C", Blob(MB));
        check!(cache.size() == 3);

        cache.set("D", Blob(MB));
        check!(cache.keys() == vec!["B", "C", "D"]);
        check!(cache.memory_bytes() == 3 * MB);
    }

    #[tokio::test]
    async fn test_oversized_value_is_not_kept() {
        let mut cache = BoundedCache::new(config(10, 1));
        cache.set("huge", Blob(2 * MB));
        check!(cache.size() == 0);
        check!(cache.memory_bytes() == 0);
    }

    #[tokio::test]
    async fn test_estimation_failure_uses_fallback() {
        let mut cache = BoundedCache::new(config(10, 500));
        cache.set("A", Unsizable);
        check!(cache.memory_bytes() == FALLBACK_ESTIMATE_BYTES);
    }

    #[tokio::test]
    async fn test_replace_adjusts_memory() {
        let mut cache = BoundedCache::new(config(10, 500));
        cache.set("A", Blob(100));
        cache.set("A", Blob(40));
        check!(cache.size() == 1);
        check!(cache.memory_bytes() == 40);
        check!(cache.delete(&"A"));
        check!(!cache.delete(&"A"));
        check!(cache.memory_bytes() == 0);
    }

    #[rstest]
    #[case(1, 10)]
    #[case(3, 2)]
    #[case(5, 4)]
    #[tokio::test(start_paused = true)]
    async fn test_bounds_hold_after_every_insert(#[case] max_size: usize, #[case] max_memory_mb: u64) {
        let mut cache = BoundedCache::new(config(max_size, max_memory_mb));
        for i in 0..25u64 {
            cache.set(i, Blob((i % 3 + 1) * MB / 2));
            if i % 4 == 0 {
                cache.get(&(i / 2));
            }
            check!(cache.size() <= max_size);
            check!(cache.memory_bytes() <= max_memory_mb * MB);
        }
    }

    #[test]
    fn test_serialized_size_heuristic() {
        let_assert!(Ok(bytes) = serialized_size("abc"));
        // "\"abc\"" is five characters
        check!(bytes == 10);
        let value = serde_json::json!({"a": 1});
        check!(value.estimate_size().unwrap() == 14);
    }

    #[tokio::test]
    async fn test_clear_keeps_counters() {
        let mut cache = BoundedCache::new(config(10, 500));
        cache.set("A", Blob(1));
        cache.get(&"A");
        cache.clear();
        check!(cache.size() == 0);
        check!(cache.stats().hits == 1);
    }
}
