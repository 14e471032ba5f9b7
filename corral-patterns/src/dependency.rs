//! Dependency groups: sets of cache keys invalidated together.
//!
//! A group is addressed by a master key holding a counter `N`. Sequence keys
//! `master1 .. masterN` each store the name of one dependent key. Deleting
//! the master removes every dependent, every sequence key and the counter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use corral_core::{as_counter, CacheError, CachePort, CacheValue, CorralError, CorralResult};
use tracing::debug;

/// Bookkeeping for dependency groups stored in a cache port.
pub struct CacheDependency<C: CachePort + ?Sized> {
    cache: Arc<C>,
    ttl: Duration,
    namespace: Option<String>,
}

impl<C: CachePort + ?Sized> CacheDependency<C> {
    pub fn new(cache: Arc<C>, ttl: Duration, namespace: Option<&str>) -> Self {
        Self {
            cache,
            ttl,
            namespace: namespace.map(str::to_string),
        }
    }

    fn ns(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Allocate one sequence key under `master`.
    pub async fn next_key(&self, master: &str) -> CorralResult<String> {
        let last = self.allocate(master, 1).await?;
        Ok(format!("{}{}", master, last))
    }

    /// Allocate `n` contiguous sequence keys under `master`.
    ///
    /// Concurrent callers always receive disjoint ranges.
    pub async fn next_keys(&self, master: &str, n: usize) -> CorralResult<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let last = self.allocate(master, n as u64).await?;
        let first = last + 1 - n as u64;
        Ok((first..=last).map(|i| format!("{}{}", master, i)).collect())
    }

    async fn allocate(&self, master: &str, n: u64) -> CorralResult<u64> {
        self.cache
            .incr(master, n, self.ns(), Some(0))
            .await?
            .ok_or_else(|| {
                CorralError::unavailable(
                    "dependency",
                    format!("counter {} could not be allocated", master),
                )
            })
    }

    /// Register `dependent` as a member of the group at `master`.
    pub async fn add(&self, master: &str, dependent: &str) -> CorralResult<bool> {
        let sequence_key = self.next_key(master).await?;
        self.cache
            .add(
                &sequence_key,
                CacheValue::String(dependent.to_string()),
                self.ttl,
                self.ns(),
            )
            .await
    }

    /// Register several dependents with one range allocation and one write.
    ///
    /// Returns the sequence keys that could not be stored.
    pub async fn add_multi(&self, master: &str, dependents: &[String]) -> CorralResult<Vec<String>> {
        if dependents.is_empty() {
            return Ok(Vec::new());
        }
        let sequence_keys = self.next_keys(master, dependents.len()).await?;
        let mapping: HashMap<String, CacheValue> = sequence_keys
            .into_iter()
            .zip(dependents.iter().cloned().map(CacheValue::String))
            .collect();
        self.cache.add_multi(mapping, self.ttl, self.ns()).await
    }

    /// Every key owned by the group: the dependents that are still live,
    /// then all sequence keys, then the master key itself.
    ///
    /// An absent master yields an empty list.
    pub async fn get_keys(&self, master: &str) -> CorralResult<Vec<String>> {
        let count = match self.cache.get(master, self.ns()).await? {
            None => return Ok(Vec::new()),
            Some(value) => as_counter(&value).ok_or_else(|| CacheError::NonNumeric {
                key: master.to_string(),
            })?,
        };

        let sequence_keys: Vec<String> = (1..=count).map(|i| format!("{}{}", master, i)).collect();
        let resolved = self.cache.get_multi(&sequence_keys, self.ns()).await?;

        let mut keys: Vec<String> = sequence_keys
            .iter()
            .filter_map(|k| resolved.get(k))
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        keys.extend(sequence_keys);
        keys.push(master.to_string());
        Ok(keys)
    }

    /// Union of [`get_keys`](Self::get_keys) across `masters`.
    pub async fn get_multi_keys(&self, masters: &[String]) -> CorralResult<Vec<String>> {
        let mut keys = Vec::new();
        for master in masters {
            keys.extend(self.get_keys(master).await?);
        }
        Ok(keys)
    }

    /// Invalidate the group at `master`.
    pub async fn delete(&self, master: &str) -> CorralResult<bool> {
        let keys = self.get_keys(master).await?;
        self.delete_keys(keys).await
    }

    /// Invalidate several groups with a single batch delete.
    pub async fn delete_multi(&self, masters: &[String]) -> CorralResult<bool> {
        let keys = self.get_multi_keys(masters).await?;
        self.delete_keys(keys).await
    }

    async fn delete_keys(&self, keys: Vec<String>) -> CorralResult<bool> {
        if keys.is_empty() {
            return Ok(true);
        }
        debug!(count = keys.len(), "Invalidating dependency group");
        self.cache.delete_multi(&keys, self.ns()).await
    }
}

impl<C: CachePort + ?Sized> Clone for CacheDependency<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            ttl: self.ttl,
            namespace: self.namespace.clone(),
        }
    }
}

impl<C: CachePort + ?Sized> std::fmt::Debug for CacheDependency<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDependency")
            .field("ttl", &self.ttl)
            .field("namespace", &self.namespace)
            .finish()
    }
}
