//! Corral Test Utilities
//!
//! Shared test infrastructure for the corral workspace:
//! - A recording cache port that logs calls and injects failures
//! - Proptest generators for keys, values, namespaces and id sets
//! - Fixtures for common configurations
//! - Assertions for corral error variants

pub use corral_core::{
    CacheError, CachePort, CacheValue, CachedConfig, ConfigError, CorralError, CorralResult,
    CounterConfig, LockerConfig, MemoryCache, NullCache,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

// ============================================================================
// RECORDING CACHE
// ============================================================================

/// One observed port call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCall {
    pub op: &'static str,
    pub keys: Vec<String>,
    pub namespace: Option<String>,
}

/// A [`MemoryCache`] that records every port call.
///
/// `add` results can be forced (to simulate losing or winning a race) and
/// every operation can be made to fail with `CacheError::Unavailable`.
#[derive(Debug, Default)]
pub struct RecordingCache {
    inner: MemoryCache,
    calls: Mutex<Vec<PortCall>>,
    forced_add: Mutex<Option<bool>>,
    unavailable: AtomicBool,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped storage.
    pub fn inner(&self) -> &MemoryCache {
        &self.inner
    }

    /// All calls observed so far, oldest first.
    pub fn calls(&self) -> Vec<PortCall> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    /// Number of calls to `op`.
    pub fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .iter()
            .filter(|c| c.op == op)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls lock poisoned").clear();
    }

    /// Force the result of `add`. `Some(false)` reports the key as taken
    /// without writing; `Some(true)` writes unconditionally; `None` restores
    /// normal behavior.
    pub fn force_add(&self, result: Option<bool>) {
        *self.forced_add.lock().expect("force lock poisoned") = result;
    }

    /// Make every subsequent operation fail as unavailable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn record(&self, op: &'static str, keys: Vec<String>, namespace: Option<&str>) -> CorralResult<()> {
        self.calls.lock().expect("calls lock poisoned").push(PortCall {
            op,
            keys,
            namespace: namespace.map(str::to_string),
        });
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CorralError::unavailable("recording", "injected failure"));
        }
        Ok(())
    }

    fn forced_add(&self) -> Option<bool> {
        *self.forced_add.lock().expect("force lock poisoned")
    }
}

fn one(key: &str) -> Vec<String> {
    vec![key.to_string()]
}

fn sorted_keys(mapping: &HashMap<String, CacheValue>) -> Vec<String> {
    let mut keys: Vec<String> = mapping.keys().cloned().collect();
    keys.sort();
    keys
}

#[async_trait]
impl CachePort for RecordingCache {
    async fn get(&self, key: &str, namespace: Option<&str>) -> CorralResult<Option<CacheValue>> {
        self.record("get", one(key), namespace)?;
        self.inner.get(key, namespace).await
    }

    async fn get_multi(
        &self,
        keys: &[String],
        namespace: Option<&str>,
    ) -> CorralResult<HashMap<String, CacheValue>> {
        self.record("get_multi", keys.to_vec(), namespace)?;
        self.inner.get_multi(keys, namespace).await
    }

    async fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool> {
        self.record("set", one(key), namespace)?;
        self.inner.set(key, value, ttl, namespace).await
    }

    async fn set_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        self.record("set_multi", sorted_keys(&mapping), namespace)?;
        self.inner.set_multi(mapping, ttl, namespace).await
    }

    async fn add(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool> {
        self.record("add", one(key), namespace)?;
        match self.forced_add() {
            Some(false) => Ok(false),
            Some(true) => self.inner.set(key, value, ttl, namespace).await,
            None => self.inner.add(key, value, ttl, namespace).await,
        }
    }

    async fn add_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        self.record("add_multi", sorted_keys(&mapping), namespace)?;
        self.inner.add_multi(mapping, ttl, namespace).await
    }

    async fn replace(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool> {
        self.record("replace", one(key), namespace)?;
        self.inner.replace(key, value, ttl, namespace).await
    }

    async fn replace_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        self.record("replace_multi", sorted_keys(&mapping), namespace)?;
        self.inner.replace_multi(mapping, ttl, namespace).await
    }

    async fn delete(&self, key: &str, namespace: Option<&str>) -> CorralResult<bool> {
        self.record("delete", one(key), namespace)?;
        self.inner.delete(key, namespace).await
    }

    async fn delete_multi(&self, keys: &[String], namespace: Option<&str>) -> CorralResult<bool> {
        self.record("delete_multi", keys.to_vec(), namespace)?;
        self.inner.delete_multi(keys, namespace).await
    }

    async fn incr(
        &self,
        key: &str,
        delta: u64,
        namespace: Option<&str>,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>> {
        self.record("incr", one(key), namespace)?;
        self.inner.incr(key, delta, namespace, initial_value).await
    }

    async fn decr(
        &self,
        key: &str,
        delta: u64,
        namespace: Option<&str>,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>> {
        self.record("decr", one(key), namespace)?;
        self.inner.decr(key, delta, namespace, initial_value).await
    }

    async fn flush_all(&self) -> CorralResult<bool> {
        self.record("flush_all", Vec::new(), None)?;
        self.inner.flush_all().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache keys, values and batches.

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    /// Keys safe for any backend: short, lowercase, no whitespace.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    pub fn arb_namespace() -> impl Strategy<Value = Option<String>> {
        prop::option::of("[a-z]{1,8}")
    }

    /// Scalar and small structured JSON values.
    pub fn arb_value() -> impl Strategy<Value = CacheValue> {
        prop_oneof![
            any::<i64>().prop_map(|n| json!(n)),
            any::<bool>().prop_map(|b| json!(b)),
            "[ -~]{0,32}".prop_map(|s| json!(s)),
            (any::<u32>(), "[a-z]{0,8}").prop_map(|(id, name)| json!({ "id": id, "name": name })),
            prop::collection::vec(any::<u16>(), 0..5).prop_map(|v| json!(v)),
        ]
    }

    /// Non-zero TTLs up to an hour.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..=3600).prop_map(Duration::from_secs)
    }

    /// Distinct ids in ascending order.
    pub fn arb_id_set(max_len: usize) -> impl Strategy<Value = Vec<u32>> {
        prop::collection::btree_set(0u32..1000, 0..=max_len)
            .prop_map(|ids| ids.into_iter().collect())
    }

    /// Distinct dependent keys for a dependency group.
    pub fn arb_dependents(max_len: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::btree_set(arb_key(), 0..=max_len)
            .prop_map(|keys| keys.into_iter().map(|k| format!("dep_{}", k)).collect())
    }

    pub fn arb_counter_config() -> impl Strategy<Value = CounterConfig> {
        (1u64..=20, 1u64..=600, 1u64..=7200, any::<bool>()).prop_map(
            |(count, period, duration, reset)| CounterConfig {
                count,
                period: Duration::from_secs(period),
                duration: Duration::from_secs(duration),
                reset,
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made configurations and caches.

    use super::*;
    use std::sync::Arc;

    pub fn memory_cache() -> Arc<MemoryCache> {
        Arc::new(MemoryCache::new())
    }

    pub fn recording_cache() -> Arc<RecordingCache> {
        Arc::new(RecordingCache::new())
    }

    /// Orchestrator settings with a short single-flight timeout.
    pub fn fast_cached_config() -> CachedConfig {
        CachedConfig::default()
            .with_ttl(Duration::from_secs(300))
            .with_timeout(Duration::from_secs(2))
            .with_key_prefix("test")
    }

    /// A dimension that locks after `count` events for an hour.
    pub fn counter_config(count: u64, reset: bool) -> CounterConfig {
        CounterConfig {
            count,
            period: Duration::from_secs(60),
            duration: Duration::from_secs(3600),
            reset,
        }
    }

    pub fn locker_config() -> LockerConfig {
        LockerConfig::default().with_key_prefix("test-lockout")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for corral error variants.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &CorralResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &CorralResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a result is an injected or real backend outage.
    #[track_caller]
    pub fn assert_unavailable<T: std::fmt::Debug>(result: &CorralResult<T>) {
        match result {
            Err(CorralError::Cache(CacheError::Unavailable { .. })) => {}
            other => panic!("Expected Unavailable cache error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &CorralResult<T>) {
        match result {
            Err(CorralError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_unknown_dimension<T: std::fmt::Debug>(result: &CorralResult<T>, name: &str) {
        match result {
            Err(CorralError::Config(ConfigError::UnknownDimension { name: n })) => {
                assert_eq!(n, name, "Wrong dimension in UnknownDimension error");
            }
            other => panic!("Expected UnknownDimension({}), got: {:?}", name, other),
        }
    }

    #[track_caller]
    pub fn assert_codec_error<T: std::fmt::Debug>(result: &CorralResult<T>) {
        match result {
            Err(CorralError::Codec(_)) => {}
            other => panic!("Expected Codec error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let cache = RecordingCache::new();
        cache.set("a", json!(1), Duration::ZERO, Some("ns")).await.unwrap();
        cache.get("a", Some("ns")).await.unwrap();

        let calls = cache.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].op, "set");
        assert_eq!(calls[1].keys, vec!["a"]);
        assert_eq!(calls[1].namespace.as_deref(), Some("ns"));
    }

    #[tokio::test]
    async fn test_forced_add_and_outage() {
        let cache = RecordingCache::new();
        cache.force_add(Some(false));
        assert!(!cache.add("a", json!(1), Duration::ZERO, None).await.unwrap());
        assert!(!cache.inner().contains_key("a", None));

        cache.force_add(None);
        cache.set_unavailable(true);
        assertions::assert_unavailable(&cache.get("a", None).await);
        assert_eq!(cache.count("get"), 1);
    }
}
