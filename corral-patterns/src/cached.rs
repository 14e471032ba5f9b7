//! Cache-aside orchestration.
//!
//! [`Cached`] binds a cache port to a TTL, a namespace and a key builder,
//! and layers the read-through patterns on top:
//!
//! | Pattern            | On miss                                             |
//! |--------------------|-----------------------------------------------------|
//! | `get_or_add`       | compute, `add` (first writer wins)                  |
//! | `get_or_set`       | compute, `set` (last writer wins)                   |
//! | `get_or_create`    | single-flight: one caller computes, others wait     |
//! | `get_or_set_multi` | compute only the missing ids in one batch           |
//!
//! Factories are async closures returning `Result<Option<V>, E>`. `Ok(None)`
//! means "nothing to cache" and is passed through without a write. Any
//! application error type works as long as it can absorb a [`CorralError`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use corral_core::{
    decode_value, encode_value, CachePort, CacheValue, CachedConfig, CorralError, CorralResult,
};
use once_cell::sync::OnceCell;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::dependency::CacheDependency;
use crate::keys::{KeyBuilder, PrefixKeyBuilder};
use crate::one_pass::{OnePass, Pass};

/// Lazily produces the master key of the dependency group a freshly cached
/// entry joins. Only invoked after a successful write.
pub type DependencyKeyFactory = Box<dyn FnOnce() -> String + Send>;

/// A [`DependencyKeyFactory`] for a fixed master key.
pub fn depends_on(master: impl Into<String>) -> DependencyKeyFactory {
    let master = master.into();
    Box::new(move || master)
}

/// Cache-aside orchestrator over a [`CachePort`].
pub struct Cached<C: CachePort + ?Sized> {
    cache: Arc<C>,
    key_builder: Arc<dyn KeyBuilder>,
    ttl: Duration,
    timeout: Duration,
    namespace: Option<String>,
    dependency: OnceCell<CacheDependency<C>>,
}

impl<C: CachePort + ?Sized + 'static> Cached<C> {
    /// Orchestrator with default settings: no expiry, 10 second single-flight
    /// timeout, default namespace.
    pub fn new(cache: Arc<C>) -> Self {
        Self::build(cache, &CachedConfig::default())
    }

    /// Orchestrator configured from `config`.
    pub fn from_config(cache: Arc<C>, config: &CachedConfig) -> CorralResult<Self> {
        config.validate()?;
        Ok(Self::build(cache, config))
    }

    fn build(cache: Arc<C>, config: &CachedConfig) -> Self {
        Self {
            cache,
            key_builder: Arc::new(PrefixKeyBuilder::new(config.key_prefix.clone())),
            ttl: config.ttl,
            timeout: config.timeout,
            namespace: config.namespace.clone(),
            dependency: OnceCell::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self.dependency = OnceCell::new();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self.dependency = OnceCell::new();
        self
    }

    pub fn with_key_builder(mut self, key_builder: impl KeyBuilder + 'static) -> Self {
        self.key_builder = Arc::new(key_builder);
        self
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Derive the cache key for a wrapped function call.
    pub fn key_for(&self, function: &str, args: &[String]) -> String {
        self.key_builder.key(function, args)
    }

    /// Dependency groups bound to the same cache, namespace and TTL.
    pub fn dependency(&self) -> &CacheDependency<C> {
        self.dependency.get_or_init(|| {
            CacheDependency::new(Arc::clone(&self.cache), self.ttl, self.namespace())
        })
    }

    // ========================================================================
    // PASS-THROUGH OPERATIONS
    // ========================================================================

    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> CorralResult<Option<V>> {
        match self.cache.get(key, self.namespace()).await? {
            Some(value) => decode_value(key, value).map(Some),
            None => Ok(None),
        }
    }

    /// Values for the keys that are present.
    pub async fn get_multi<V: DeserializeOwned>(
        &self,
        keys: &[String],
    ) -> CorralResult<HashMap<String, V>> {
        let found = self.cache.get_multi(keys, self.namespace()).await?;
        found
            .into_iter()
            .map(|(key, value)| -> CorralResult<(String, V)> {
                let decoded = decode_value(&key, value)?;
                Ok((key, decoded))
            })
            .collect()
    }

    /// Store `value`, joining the group at `dependency_key` when the write
    /// succeeded.
    pub async fn set<V: Serialize>(
        &self,
        key: &str,
        value: &V,
        dependency_key: Option<&str>,
    ) -> CorralResult<bool> {
        let stored = self
            .cache
            .set(key, encode_value(key, value)?, self.ttl, self.namespace())
            .await?;
        if stored {
            if let Some(master) = dependency_key {
                self.dependency().add(master, key).await?;
            }
        }
        Ok(stored)
    }

    /// Store `value` only if `key` is absent, joining the group at
    /// `dependency_key` when the add won.
    pub async fn add<V: Serialize>(
        &self,
        key: &str,
        value: &V,
        dependency_key: Option<&str>,
    ) -> CorralResult<bool> {
        let added = self
            .cache
            .add(key, encode_value(key, value)?, self.ttl, self.namespace())
            .await?;
        if added {
            if let Some(master) = dependency_key {
                self.dependency().add(master, key).await?;
            }
        }
        Ok(added)
    }

    pub async fn replace<V: Serialize>(&self, key: &str, value: &V) -> CorralResult<bool> {
        self.cache
            .replace(key, encode_value(key, value)?, self.ttl, self.namespace())
            .await
    }

    /// Returns the keys that failed to store.
    pub async fn set_multi<V: Serialize>(
        &self,
        mapping: &HashMap<String, V>,
    ) -> CorralResult<Vec<String>> {
        let encoded = encode_mapping(mapping)?;
        self.cache.set_multi(encoded, self.ttl, self.namespace()).await
    }

    /// Returns the keys that were already present.
    pub async fn add_multi<V: Serialize>(
        &self,
        mapping: &HashMap<String, V>,
    ) -> CorralResult<Vec<String>> {
        let encoded = encode_mapping(mapping)?;
        self.cache.add_multi(encoded, self.ttl, self.namespace()).await
    }

    /// Returns the keys that were absent.
    pub async fn replace_multi<V: Serialize>(
        &self,
        mapping: &HashMap<String, V>,
    ) -> CorralResult<Vec<String>> {
        let encoded = encode_mapping(mapping)?;
        self.cache
            .replace_multi(encoded, self.ttl, self.namespace())
            .await
    }

    pub async fn delete(&self, key: &str) -> CorralResult<bool> {
        self.cache.delete(key, self.namespace()).await
    }

    pub async fn delete_multi(&self, keys: &[String]) -> CorralResult<bool> {
        self.cache.delete_multi(keys, self.namespace()).await
    }

    pub async fn incr(
        &self,
        key: &str,
        delta: u64,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>> {
        self.cache
            .incr(key, delta, self.namespace(), initial_value)
            .await
    }

    pub async fn decr(
        &self,
        key: &str,
        delta: u64,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>> {
        self.cache
            .decr(key, delta, self.namespace(), initial_value)
            .await
    }

    async fn join_group(
        &self,
        key: &str,
        dependency_key_factory: Option<DependencyKeyFactory>,
    ) -> CorralResult<()> {
        if let Some(factory) = dependency_key_factory {
            let master = factory();
            self.dependency().add(&master, key).await?;
        }
        Ok(())
    }

    // ========================================================================
    // CACHE-ASIDE PATTERNS
    // ========================================================================

    /// Read `key`; on a miss compute it and `add` it.
    ///
    /// The computed value is returned even when a concurrent writer won the
    /// add. The entry joins the dependency group only if this call's add won.
    pub async fn get_or_add<V, E, F, Fut>(
        &self,
        key: &str,
        create: F,
        dependency_key_factory: Option<DependencyKeyFactory>,
    ) -> Result<Option<V>, E>
    where
        V: Serialize + DeserializeOwned,
        E: From<CorralError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        if let Some(hit) = self.get(key).await? {
            return Ok(Some(hit));
        }
        debug!(key, "Cache miss, computing for add");

        let Some(value) = create().await? else {
            return Ok(None);
        };
        let added = self
            .cache
            .add(key, encode_value(key, &value)?, self.ttl, self.namespace())
            .await?;
        if added {
            self.join_group(key, dependency_key_factory).await?;
        }
        Ok(Some(value))
    }

    /// Read `key`; on a miss compute it and `set` it.
    pub async fn get_or_set<V, E, F, Fut>(
        &self,
        key: &str,
        create: F,
        dependency_key_factory: Option<DependencyKeyFactory>,
    ) -> Result<Option<V>, E>
    where
        V: Serialize + DeserializeOwned,
        E: From<CorralError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        if let Some(hit) = self.get(key).await? {
            return Ok(Some(hit));
        }
        debug!(key, "Cache miss, computing for set");
        self.create_and_set(key, create, dependency_key_factory)
            .await
    }

    /// Compute `key` under a single-flight lease without reading it first.
    ///
    /// The lease owner computes, stores and releases (on every path,
    /// including factory errors). Everyone else waits up to the configured
    /// timeout and then re-reads the key; a timeout yields `None`.
    pub async fn one_pass_create<V, E, F, Fut>(
        &self,
        key: &str,
        create: F,
        dependency_key_factory: Option<DependencyKeyFactory>,
    ) -> Result<Option<V>, E>
    where
        V: Serialize + DeserializeOwned,
        E: From<CorralError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        let lease_key = format!("one_pass:{}", key);
        let pass = OnePass::new(
            Arc::clone(&self.cache),
            lease_key,
            self.timeout,
            self.namespace(),
        )
        .enter()
        .await?;

        match pass {
            Pass::Acquired(lease) => {
                let outcome = self
                    .create_and_set(key, create, dependency_key_factory)
                    .await;
                let released = lease.release().await;
                let value = outcome?;
                released?;
                Ok(value)
            }
            Pass::Contended(waiter) => {
                if waiter.wait(None).await? {
                    Ok(self.get(key).await?)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Read `key`; on a miss fall through to [`one_pass_create`](Self::one_pass_create).
    pub async fn get_or_create<V, E, F, Fut>(
        &self,
        key: &str,
        create: F,
        dependency_key_factory: Option<DependencyKeyFactory>,
    ) -> Result<Option<V>, E>
    where
        V: Serialize + DeserializeOwned,
        E: From<CorralError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        if let Some(hit) = self.get(key).await? {
            return Ok(Some(hit));
        }
        debug!(key, "Cache miss, entering single-flight create");
        self.one_pass_create(key, create, dependency_key_factory)
            .await
    }

    /// Batched read-through keyed by id.
    ///
    /// `create` receives every id whose key missed, in one call, and returns
    /// the values it could produce. Only those are written back (one
    /// `set_multi`) and merged into the result; declined ids are absent.
    /// Values for ids that were not requested are discarded.
    pub async fn get_or_set_multi<Id, V, E, K, F, Fut>(
        &self,
        make_key: K,
        create: F,
        ids: &[Id],
    ) -> Result<HashMap<Id, V>, E>
    where
        Id: Eq + Hash + Clone,
        V: Serialize + DeserializeOwned,
        E: From<CorralError>,
        K: Fn(&Id) -> String,
        F: FnOnce(Vec<Id>) -> Fut,
        Fut: Future<Output = Result<HashMap<Id, V>, E>>,
    {
        let keyed: Vec<(Id, String)> = ids.iter().map(|id| (id.clone(), make_key(id))).collect();
        let keys: Vec<String> = keyed.iter().map(|(_, key)| key.clone()).collect();
        let mut hits: HashMap<String, V> = self.get_multi(&keys).await?;

        let mut result = HashMap::with_capacity(keyed.len());
        let mut seen = HashSet::with_capacity(keyed.len());
        let mut missing = Vec::new();
        for (id, key) in keyed {
            if !seen.insert(id.clone()) {
                continue;
            }
            match hits.remove(&key) {
                Some(value) => {
                    result.insert(id, value);
                }
                None => missing.push(id),
            }
        }
        if missing.is_empty() {
            return Ok(result);
        }
        debug!(missing = missing.len(), "Cache miss, computing batch");

        let requested: HashSet<Id> = missing.iter().cloned().collect();
        let created: HashMap<Id, V> = create(missing)
            .await?
            .into_iter()
            .filter(|(id, _)| requested.contains(id))
            .collect();
        if !created.is_empty() {
            let mut mapping = HashMap::with_capacity(created.len());
            for (id, value) in &created {
                let key = make_key(id);
                let encoded = encode_value(&key, value)?;
                mapping.insert(key, encoded);
            }
            self.cache
                .set_multi(mapping, self.ttl, self.namespace())
                .await?;
        }
        result.extend(created);
        Ok(result)
    }

    async fn create_and_set<V, E, F, Fut>(
        &self,
        key: &str,
        create: F,
        dependency_key_factory: Option<DependencyKeyFactory>,
    ) -> Result<Option<V>, E>
    where
        V: Serialize,
        E: From<CorralError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        let Some(value) = create().await? else {
            return Ok(None);
        };
        self.cache
            .set(key, encode_value(key, &value)?, self.ttl, self.namespace())
            .await?;
        self.join_group(key, dependency_key_factory).await?;
        Ok(Some(value))
    }
}

fn encode_mapping<V: Serialize>(
    mapping: &HashMap<String, V>,
) -> CorralResult<HashMap<String, CacheValue>> {
    mapping
        .iter()
        .map(|(key, value)| -> CorralResult<(String, CacheValue)> {
            Ok((key.clone(), encode_value(key, value)?))
        })
        .collect()
}

impl<C: CachePort + ?Sized> std::fmt::Debug for Cached<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cached")
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::MemoryCache;
    use corral_test_utils::assertions::{assert_codec_error, assert_err};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cached() -> Cached<MemoryCache> {
        Cached::new(Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn test_get_or_set_stores_computed_value() {
        let cached = cached();
        let value: Option<String> = cached
            .get_or_set("k", || async { Ok::<_, CorralError>(Some("v".to_string())) }, None)
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("v"));
        assert_eq!(cached.get::<String>("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_hit_skips_factory() {
        let cached = cached();
        cached.set("k", &7u32, None).await.unwrap();
        let calls = AtomicUsize::new(0);

        let value: Option<u32> = cached
            .get_or_create(
                "k",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CorralError>(Some(1))
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(value, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_none_is_not_cached() {
        let cached = cached();
        let value: Option<u32> = cached
            .get_or_set("k", || async { Ok::<_, CorralError>(None) }, None)
            .await
            .unwrap();
        assert_eq!(value, None);
        assert!(cached.cache().is_empty());
    }

    #[tokio::test]
    async fn test_get_or_add_keeps_first_writer() {
        let cached = cached();
        // Another writer lands between the miss and our add.
        let value: Option<u32> = cached
            .get_or_add(
                "k",
                || async {
                    cached.add("k", &1u32, None).await?;
                    Ok::<_, CorralError>(Some(2))
                },
                Some(depends_on("group")),
            )
            .await
            .unwrap();

        assert_eq!(value, Some(2));
        assert_eq!(cached.get::<u32>("k").await.unwrap(), Some(1));
        assert!(cached.dependency().get_keys("group").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_or_set_joins_dependency_group() {
        let cached = cached();
        for key in ["a", "b"] {
            let _: Option<u32> = cached
                .get_or_set(key, || async { Ok::<_, CorralError>(Some(1)) }, Some(depends_on("g")))
                .await
                .unwrap();
        }
        assert!(cached.dependency().delete("g").await.unwrap());
        assert!(cached.cache().is_empty());
    }

    #[tokio::test]
    async fn test_factory_error_propagates_and_releases_lease() {
        #[derive(Debug, PartialEq)]
        enum AppError {
            Backend,
            Cache(CorralError),
        }
        impl From<CorralError> for AppError {
            fn from(e: CorralError) -> Self {
                AppError::Cache(e)
            }
        }

        let cached = cached();
        let result: Result<Option<u32>, AppError> = cached
            .get_or_create("k", || async { Err(AppError::Backend) }, None)
            .await;
        assert_eq!(result, Err(AppError::Backend));
        assert!(!cached.cache().contains_key("one_pass:k", None));
    }

    #[tokio::test]
    async fn test_get_or_set_multi_computes_only_missing() {
        let cached = cached();
        cached.set("item:1", &"one".to_string(), None).await.unwrap();
        cached.set("item:3", &"three".to_string(), None).await.unwrap();
        let seen = std::sync::Mutex::new(Vec::new());

        let result: HashMap<u32, String> = cached
            .get_or_set_multi(
                |id: &u32| format!("item:{}", id),
                |missing: Vec<u32>| {
                    seen.lock().unwrap().extend(missing.iter().copied());
                    async move {
                        let produced: HashMap<u32, String> =
                            missing.into_iter().map(|id| (id, format!("fresh{}", id))).collect();
                        Ok::<_, CorralError>(produced)
                    }
                },
                &[1, 2, 3],
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![2]);
        assert_eq!(result.len(), 3);
        assert_eq!(result[&2], "fresh2");
        assert_eq!(cached.get::<String>("item:2").await.unwrap().as_deref(), Some("fresh2"));
    }

    #[tokio::test]
    async fn test_get_or_set_multi_skips_factory_on_full_hit() {
        let cached = cached();
        cached.set("item:1", &1u32, None).await.unwrap();
        let calls = AtomicUsize::new(0);

        let result: HashMap<u32, u32> = cached
            .get_or_set_multi(
                |id: &u32| format!("item:{}", id),
                |_missing: Vec<u32>| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CorralError>(HashMap::new())
                },
                &[1],
            )
            .await
            .unwrap();
        assert_eq!(result[&1], 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_or_set_multi_discards_unrequested_ids() {
        let cached = cached();
        cached.set("item:1", &10u32, None).await.unwrap();

        let result: HashMap<u32, u32> = cached
            .get_or_set_multi(
                |id: &u32| format!("item:{}", id),
                |_missing: Vec<u32>| async {
                    let produced: HashMap<u32, u32> = [(2, 20), (1, 999), (99, 990)].into();
                    Ok::<_, CorralError>(produced)
                },
                &[1, 2],
            )
            .await
            .unwrap();

        assert_eq!(result, HashMap::from([(1, 10), (2, 20)]));
        assert_eq!(cached.get::<u32>("item:1").await.unwrap(), Some(10));
        assert_eq!(cached.get::<u32>("item:99").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_or_set_multi_dedupes_ids() {
        let cached = cached();
        let seen = std::sync::Mutex::new(Vec::new());

        let result: HashMap<u32, u32> = cached
            .get_or_set_multi(
                |id: &u32| format!("item:{}", id),
                |missing: Vec<u32>| {
                    seen.lock().unwrap().extend(missing.iter().copied());
                    async move {
                        let produced: HashMap<u32, u32> =
                            missing.into_iter().map(|id| (id, id)).collect();
                        Ok::<_, CorralError>(produced)
                    }
                },
                &[3, 1, 3, 1, 2],
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![3, 1, 2]);
        assert_eq!(result.len(), 3);
    }

    #[tokio::test]
    async fn test_from_config_rejects_zero_timeout() {
        let config = CachedConfig::default().with_timeout(Duration::ZERO);
        assert_err(&Cached::from_config(Arc::new(MemoryCache::new()), &config));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_codec_error() {
        let cached = cached();
        cached.set("k", &"text".to_string(), None).await.unwrap();
        assert_codec_error(&cached.get::<u32>("k").await);
    }
}
