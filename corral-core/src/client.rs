//! Namespace-routing cache client.
//!
//! `CacheClient` is a single entry point that partitions application cache
//! by namespace, each namespace served by its own backend. Operations with
//! `namespace = None` go to the default backend; an unregistered namespace
//! is an error rather than a silent fallback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, ConfigError, CorralResult};
use crate::port::{CachePort, CacheValue};

/// A [`CachePort`] that dispatches to one backend per namespace.
#[derive(Clone)]
pub struct CacheClient {
    namespaces: HashMap<String, Arc<dyn CachePort>>,
    default_namespace: String,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.namespaces.keys().collect();
        names.sort();
        f.debug_struct("CacheClient")
            .field("namespaces", &names)
            .field("default_namespace", &self.default_namespace)
            .finish()
    }
}

impl CacheClient {
    /// Create a client from a namespace map.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] when `default_namespace` is
    /// not one of the registered namespaces.
    pub fn new(
        namespaces: HashMap<String, Arc<dyn CachePort>>,
        default_namespace: impl Into<String>,
    ) -> CorralResult<Self> {
        let default_namespace = default_namespace.into();
        if !namespaces.contains_key(&default_namespace) {
            return Err(ConfigError::MissingRequired {
                field: format!("namespaces.{}", default_namespace),
            }
            .into());
        }
        Ok(Self {
            namespaces,
            default_namespace,
        })
    }

    /// The namespace used when an operation does not name one.
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    fn route(&self, namespace: Option<&str>) -> CorralResult<&Arc<dyn CachePort>> {
        let name = namespace.unwrap_or(&self.default_namespace);
        self.namespaces.get(name).ok_or_else(|| {
            CacheError::UnknownNamespace {
                namespace: name.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl CachePort for CacheClient {
    async fn get(&self, key: &str, namespace: Option<&str>) -> CorralResult<Option<CacheValue>> {
        self.route(namespace)?.get(key, namespace).await
    }

    async fn get_multi(
        &self,
        keys: &[String],
        namespace: Option<&str>,
    ) -> CorralResult<HashMap<String, CacheValue>> {
        self.route(namespace)?.get_multi(keys, namespace).await
    }

    async fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool> {
        self.route(namespace)?.set(key, value, ttl, namespace).await
    }

    async fn set_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        self.route(namespace)?.set_multi(mapping, ttl, namespace).await
    }

    async fn add(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool> {
        self.route(namespace)?.add(key, value, ttl, namespace).await
    }

    async fn add_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        self.route(namespace)?.add_multi(mapping, ttl, namespace).await
    }

    async fn replace(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool> {
        self.route(namespace)?.replace(key, value, ttl, namespace).await
    }

    async fn replace_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        self.route(namespace)?
            .replace_multi(mapping, ttl, namespace)
            .await
    }

    async fn delete(&self, key: &str, namespace: Option<&str>) -> CorralResult<bool> {
        self.route(namespace)?.delete(key, namespace).await
    }

    async fn delete_multi(&self, keys: &[String], namespace: Option<&str>) -> CorralResult<bool> {
        self.route(namespace)?.delete_multi(keys, namespace).await
    }

    async fn incr(
        &self,
        key: &str,
        delta: u64,
        namespace: Option<&str>,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>> {
        self.route(namespace)?
            .incr(key, delta, namespace, initial_value)
            .await
    }

    async fn decr(
        &self,
        key: &str,
        delta: u64,
        namespace: Option<&str>,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>> {
        self.route(namespace)?
            .decr(key, delta, namespace, initial_value)
            .await
    }

    /// Flushes every registered backend.
    async fn flush_all(&self) -> CorralResult<bool> {
        let mut flushed = true;
        for cache in self.namespaces.values() {
            flushed &= cache.flush_all().await?;
        }
        Ok(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CorralError;
    use crate::memory::MemoryCache;
    use crate::null::NullCache;
    use serde_json::json;

    fn client() -> (CacheClient, Arc<MemoryCache>) {
        let memory = Arc::new(MemoryCache::new());
        let mut namespaces: HashMap<String, Arc<dyn CachePort>> = HashMap::new();
        namespaces.insert("n1".to_string(), memory.clone());
        namespaces.insert("n2".to_string(), Arc::new(NullCache::new()));
        (CacheClient::new(namespaces, "n1").unwrap(), memory)
    }

    #[tokio::test]
    async fn test_default_namespace_routing() {
        let (client, memory) = client();
        client.set("x", json!(1), Duration::ZERO, None).await.unwrap();
        assert!(memory.contains_key("x", None));
        assert_eq!(client.get("x", None).await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_explicit_namespace_routing() {
        let (client, memory) = client();
        client.set("x", json!(1), Duration::ZERO, Some("n2")).await.unwrap();
        assert!(memory.is_empty());
        assert_eq!(client.get("x", Some("n2")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_error() {
        let (client, _) = client();
        let err = client.get("x", Some("n3")).await.unwrap_err();
        assert!(matches!(
            err,
            CorralError::Cache(CacheError::UnknownNamespace { .. })
        ));
    }

    #[test]
    fn test_missing_default_namespace() {
        let namespaces: HashMap<String, Arc<dyn CachePort>> = HashMap::new();
        assert!(matches!(
            CacheClient::new(namespaces, "n1"),
            Err(CorralError::Config(ConfigError::MissingRequired { .. }))
        ));
    }

    #[tokio::test]
    async fn test_flush_all_reaches_every_backend() {
        let (client, memory) = client();
        client.set("x", json!(1), Duration::ZERO, Some("n1")).await.unwrap();
        assert!(client.flush_all().await.unwrap());
        assert!(memory.is_empty());
    }
}
