//! Function wrappers that derive their cache key from call arguments.
//!
//! ```ignore
//! let load_user = cached.wraps_get_or_create("load_user", |(id,): (u64,)| async move {
//!     repository.find(id).await
//! });
//! let user: Option<User> = load_user.call((42,)).await?;
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

use corral_core::{CachePort, CorralError};
use serde::{de::DeserializeOwned, Serialize};

use crate::cached::Cached;
use crate::keys::KeyArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    GetOrAdd,
    GetOrSet,
    GetOrCreate,
}

/// A function whose results are cached under `key_builder(name, args)`.
pub struct CachedFn<'a, C: CachePort + ?Sized, F> {
    cached: &'a Cached<C>,
    name: String,
    strategy: Strategy,
    func: F,
}

impl<'a, C: CachePort + ?Sized + 'static, F> CachedFn<'a, C, F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cache key a call with `args` reads and writes.
    pub fn key_for<A: KeyArgs>(&self, args: &A) -> String {
        self.cached.key_for(&self.name, &args.key_parts())
    }

    /// Invoke through the cache.
    pub async fn call<A, V, E, Fut>(&self, args: A) -> Result<Option<V>, E>
    where
        A: KeyArgs,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
        V: Serialize + DeserializeOwned,
        E: From<CorralError>,
    {
        let key = self.key_for(&args);
        let create = move || (self.func)(args);
        match self.strategy {
            Strategy::GetOrAdd => self.cached.get_or_add(&key, create, None).await,
            Strategy::GetOrSet => self.cached.get_or_set(&key, create, None).await,
            Strategy::GetOrCreate => self.cached.get_or_create(&key, create, None).await,
        }
    }
}

impl<C: CachePort + ?Sized, F> Debug for CachedFn<'_, C, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedFn")
            .field("name", &self.name)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// A batch function whose per-id results are cached under
/// `key_builder(name, [id])`.
pub struct CachedMultiFn<'a, C: CachePort + ?Sized, F> {
    cached: &'a Cached<C>,
    name: String,
    func: F,
}

impl<'a, C: CachePort + ?Sized + 'static, F> CachedMultiFn<'a, C, F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_for<Id: Debug>(&self, id: &Id) -> String {
        self.cached.key_for(&self.name, &(id,).key_parts())
    }

    /// Resolve `ids`, calling the wrapped function once with the misses.
    pub async fn call<Id, V, E, Fut>(&self, ids: &[Id]) -> Result<HashMap<Id, V>, E>
    where
        Id: Debug + Eq + Hash + Clone,
        F: Fn(Vec<Id>) -> Fut,
        Fut: Future<Output = Result<HashMap<Id, V>, E>>,
        V: Serialize + DeserializeOwned,
        E: From<CorralError>,
    {
        self.cached
            .get_or_set_multi(|id| self.key_for(id), |missing| (self.func)(missing), ids)
            .await
    }
}

impl<C: CachePort + ?Sized, F> Debug for CachedMultiFn<'_, C, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedMultiFn")
            .field("name", &self.name)
            .finish()
    }
}

impl<C: CachePort + ?Sized + 'static> Cached<C> {
    /// Wrap `func` with [`get_or_add`](Cached::get_or_add).
    pub fn wraps_get_or_add<F>(&self, name: impl Into<String>, func: F) -> CachedFn<'_, C, F> {
        self.wrap(name, Strategy::GetOrAdd, func)
    }

    /// Wrap `func` with [`get_or_set`](Cached::get_or_set).
    pub fn wraps_get_or_set<F>(&self, name: impl Into<String>, func: F) -> CachedFn<'_, C, F> {
        self.wrap(name, Strategy::GetOrSet, func)
    }

    /// Plain read-through wrapping. Same as [`wraps_get_or_set`](Self::wraps_get_or_set).
    pub fn wraps<F>(&self, name: impl Into<String>, func: F) -> CachedFn<'_, C, F> {
        self.wrap(name, Strategy::GetOrSet, func)
    }

    /// Wrap `func` with single-flight [`get_or_create`](Cached::get_or_create).
    pub fn wraps_get_or_create<F>(&self, name: impl Into<String>, func: F) -> CachedFn<'_, C, F> {
        self.wrap(name, Strategy::GetOrCreate, func)
    }

    /// Wrap a batch function with [`get_or_set_multi`](Cached::get_or_set_multi).
    pub fn wraps_get_or_set_multi<F>(
        &self,
        name: impl Into<String>,
        func: F,
    ) -> CachedMultiFn<'_, C, F> {
        CachedMultiFn {
            cached: self,
            name: name.into(),
            func,
        }
    }

    fn wrap<F>(&self, name: impl Into<String>, strategy: Strategy, func: F) -> CachedFn<'_, C, F> {
        CachedFn {
            cached: self,
            name: name.into(),
            strategy,
            func,
        }
    }
}
