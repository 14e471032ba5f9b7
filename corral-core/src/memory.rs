//! In-process cache port backed by a sharded concurrent map.
//!
//! `MemoryCache` gives the coordination patterns a real atomic backend inside
//! a single process: `add` and `incr`/`decr` run under the shard lock of the
//! entry they touch, so they are atomic with respect to each other.
//!
//! Expiry is lazy. An expired entry is treated as absent by every operation
//! and is physically removed the next time its key is touched, or by
//! [`MemoryCache::purge_expired`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{CacheError, CorralResult};
use crate::port::{as_counter, CachePort, CacheValue};

type PartitionKey = (Option<String>, String);

#[derive(Debug, Clone)]
struct StoredEntry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(value: CacheValue, ttl: Duration) -> Self {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        Self { value, expires_at }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of keys found by `get`/`get_multi`.
    pub hits: u64,
    /// Number of keys not found by `get`/`get_multi`.
    pub misses: u64,
    /// Number of live entries.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-memory [`CachePort`] partitioned by namespace.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<PartitionKey, StoredEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    /// Create an empty memory cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn partition_key(key: &str, namespace: Option<&str>) -> PartitionKey {
        (namespace.map(str::to_string), key.to_string())
    }

    /// Number of live entries across all namespaces.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().is_live(now)).count()
    }

    /// Whether the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` holds a live entry in `namespace`.
    pub fn contains_key(&self, key: &str, namespace: Option<&str>) -> bool {
        let now = Instant::now();
        self.entries
            .get(&Self::partition_key(key, namespace))
            .is_some_and(|e| e.is_live(now))
    }

    /// Physically remove expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        let purged = before - self.entries.len();
        debug!(purged, "Purged expired memory cache entries");
        purged
    }

    /// Snapshot of usage statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
        }
    }

    fn read(&self, key: &str, namespace: Option<&str>) -> Option<CacheValue> {
        let pk = Self::partition_key(key, namespace);
        let now = Instant::now();
        let found = match self.entries.get(&pk) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            _ => None,
        };
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn write(&self, key: &str, value: CacheValue, ttl: Duration, namespace: Option<&str>) {
        self.entries.insert(
            Self::partition_key(key, namespace),
            StoredEntry::new(value, ttl),
        );
    }

    fn write_if_absent(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> bool {
        let now = Instant::now();
        match self.entries.entry(Self::partition_key(key, namespace)) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    false
                } else {
                    occupied.insert(StoredEntry::new(value, ttl));
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::new(value, ttl));
                true
            }
        }
    }

    fn write_if_present(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> bool {
        let now = Instant::now();
        match self.entries.entry(Self::partition_key(key, namespace)) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    occupied.insert(StoredEntry::new(value, ttl));
                    true
                } else {
                    occupied.remove();
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    fn remove(&self, key: &str, namespace: Option<&str>) -> bool {
        let now = Instant::now();
        self.entries
            .remove(&Self::partition_key(key, namespace))
            .is_some_and(|(_, e)| e.is_live(now))
    }

    /// Apply `step` to a live counter, or seed an absent one.
    ///
    /// The existing TTL of a live counter is preserved; a seeded counter
    /// never expires.
    fn mutate_counter(
        &self,
        key: &str,
        namespace: Option<&str>,
        initial_value: Option<u64>,
        step: impl Fn(u64) -> u64,
    ) -> CorralResult<Option<u64>> {
        let now = Instant::now();
        match self.entries.entry(Self::partition_key(key, namespace)) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    let current = as_counter(&occupied.get().value).ok_or_else(|| {
                        CacheError::NonNumeric {
                            key: key.to_string(),
                        }
                    })?;
                    let next = step(current);
                    occupied.get_mut().value = CacheValue::from(next);
                    Ok(Some(next))
                } else if let Some(seed) = initial_value {
                    let next = step(seed);
                    occupied.insert(StoredEntry::new(CacheValue::from(next), Duration::ZERO));
                    Ok(Some(next))
                } else {
                    occupied.remove();
                    Ok(None)
                }
            }
            Entry::Vacant(vacant) => match initial_value {
                Some(seed) => {
                    let next = step(seed);
                    vacant.insert(StoredEntry::new(CacheValue::from(next), Duration::ZERO));
                    Ok(Some(next))
                }
                None => Ok(None),
            },
        }
    }
}

#[async_trait]
impl CachePort for MemoryCache {
    async fn get(&self, key: &str, namespace: Option<&str>) -> CorralResult<Option<CacheValue>> {
        Ok(self.read(key, namespace))
    }

    async fn get_multi(
        &self,
        keys: &[String],
        namespace: Option<&str>,
    ) -> CorralResult<HashMap<String, CacheValue>> {
        Ok(keys
            .iter()
            .filter_map(|key| self.read(key, namespace).map(|v| (key.clone(), v)))
            .collect())
    }

    async fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool> {
        self.write(key, value, ttl, namespace);
        Ok(true)
    }

    async fn set_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        for (key, value) in mapping {
            self.write(&key, value, ttl, namespace);
        }
        Ok(Vec::new())
    }

    async fn add(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool> {
        Ok(self.write_if_absent(key, value, ttl, namespace))
    }

    async fn add_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        Ok(mapping
            .into_iter()
            .filter_map(|(key, value)| {
                (!self.write_if_absent(&key, value, ttl, namespace)).then_some(key)
            })
            .collect())
    }

    async fn replace(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool> {
        Ok(self.write_if_present(key, value, ttl, namespace))
    }

    async fn replace_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        Ok(mapping
            .into_iter()
            .filter_map(|(key, value)| {
                (!self.write_if_present(&key, value, ttl, namespace)).then_some(key)
            })
            .collect())
    }

    async fn delete(&self, key: &str, namespace: Option<&str>) -> CorralResult<bool> {
        Ok(self.remove(key, namespace))
    }

    async fn delete_multi(&self, keys: &[String], namespace: Option<&str>) -> CorralResult<bool> {
        for key in keys {
            self.remove(key, namespace);
        }
        Ok(true)
    }

    async fn incr(
        &self,
        key: &str,
        delta: u64,
        namespace: Option<&str>,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>> {
        self.mutate_counter(key, namespace, initial_value, |n| n.wrapping_add(delta))
    }

    async fn decr(
        &self,
        key: &str,
        delta: u64,
        namespace: Option<&str>,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>> {
        self.mutate_counter(key, namespace, initial_value, |n| n.saturating_sub(delta))
    }

    async fn flush_all(&self) -> CorralResult<bool> {
        self.entries.clear();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CorralError;
    use serde_json::json;

    fn mapping(pairs: &[(&str, i64)]) -> HashMap<String, CacheValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("unknown", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_get() {
        let cache = MemoryCache::new();
        assert!(cache.set("s1", json!("some string"), Duration::from_secs(10), None).await.unwrap());
        assert_eq!(cache.get("s1", None).await.unwrap(), Some(json!("some string")));
    }

    #[tokio::test]
    async fn test_get_multi_some_found() {
        let cache = MemoryCache::new();
        cache.set("s1", json!("some string"), Duration::ZERO, None).await.unwrap();
        let found = cache
            .get_multi(&["unknown1".to_string(), "s1".to_string()], None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["s1"], json!("some string"));
    }

    #[tokio::test]
    async fn test_add_only_when_absent() {
        let cache = MemoryCache::new();
        assert!(cache.add("a", json!(100), Duration::ZERO, None).await.unwrap());
        assert!(!cache.add("a", json!(200), Duration::ZERO, None).await.unwrap());
        assert_eq!(cache.get("a", None).await.unwrap(), Some(json!(100)));
    }

    #[tokio::test]
    async fn test_add_multi_reports_existing() {
        let cache = MemoryCache::new();
        let pairs = mapping(&[("a1", 1), ("a2", 2)]);
        assert!(cache.add_multi(pairs.clone(), Duration::ZERO, None).await.unwrap().is_empty());
        let mut failed = cache.add_multi(pairs, Duration::ZERO, None).await.unwrap();
        failed.sort();
        assert_eq!(failed, vec!["a1".to_string(), "a2".to_string()]);
    }

    #[tokio::test]
    async fn test_replace_requires_presence() {
        let cache = MemoryCache::new();
        assert!(!cache.replace("r", json!(1), Duration::ZERO, None).await.unwrap());
        cache.add("r", json!(100), Duration::ZERO, None).await.unwrap();
        assert!(cache.replace("r", json!(101), Duration::ZERO, None).await.unwrap());
        assert_eq!(cache.get("r", None).await.unwrap(), Some(json!(101)));

        let mut failed = cache
            .replace_multi(mapping(&[("r", 5), ("rr", 6)]), Duration::ZERO, None)
            .await
            .unwrap();
        failed.sort();
        assert_eq!(failed, vec!["rr".to_string()]);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = MemoryCache::new();
        assert!(!cache.delete("d", None).await.unwrap());
        cache.set("d", json!(1), Duration::ZERO, None).await.unwrap();
        assert!(cache.delete("d", None).await.unwrap());
        assert_eq!(cache.get("d", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_seeds_and_increments() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("ci", 1, None, Some(0)).await.unwrap(), Some(1));
        assert_eq!(cache.get("ci", None).await.unwrap(), Some(json!(1)));
        assert_eq!(cache.incr("ci", 1, None, None).await.unwrap(), Some(2));
        assert_eq!(cache.incr("ix", 1, None, None).await.unwrap(), None);
        assert!(!cache.contains_key("ix", None));
    }

    #[tokio::test]
    async fn test_decr_floors_at_zero() {
        let cache = MemoryCache::new();
        assert_eq!(cache.decr("cd", 1, None, Some(10)).await.unwrap(), Some(9));
        assert_eq!(cache.decr("cd", 100, None, None).await.unwrap(), Some(0));
        assert_eq!(cache.decr("dx", 1, None, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_non_numeric() {
        let cache = MemoryCache::new();
        cache.set("text", json!("abc"), Duration::ZERO, None).await.unwrap();
        let err = cache.incr("text", 1, None, None).await.unwrap_err();
        assert!(matches!(
            err,
            CorralError::Cache(CacheError::NonNumeric { .. })
        ));
    }

    #[tokio::test]
    async fn test_namespaces_are_partitions() {
        let cache = MemoryCache::new();
        cache.set("k", json!(1), Duration::ZERO, Some("n1")).await.unwrap();
        assert_eq!(cache.get("k", None).await.unwrap(), None);
        assert_eq!(cache.get("k", Some("n2")).await.unwrap(), None);
        assert_eq!(cache.get("k", Some("n1")).await.unwrap(), Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache.set("t", json!(1), Duration::from_secs(5), None).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.contains_key("t", None));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("t", None).await.unwrap(), None);
        assert!(cache.add("t", json!(2), Duration::ZERO, None).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_keeps_ttl() {
        let cache = MemoryCache::new();
        cache.add("w", json!(1), Duration::from_secs(60), None).await.unwrap();
        assert_eq!(cache.incr("w", 1, None, None).await.unwrap(), Some(2));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.incr("w", 1, None, None).await.unwrap(), None);
        assert_eq!(cache.purge_expired(), 0);
    }

    #[tokio::test]
    async fn test_flush_all_and_stats() {
        let cache = MemoryCache::new();
        cache.set_multi(mapping(&[("s1", 1), ("s2", 2)]), Duration::ZERO, None).await.unwrap();
        cache.get("s1", None).await.unwrap();
        cache.get("missing", None).await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 2);
        assert!((stats.hit_rate() - 0.5).abs() < 0.001);

        assert!(cache.flush_all().await.unwrap());
        assert!(cache.is_empty());
    }
}
