//! Windowed failure counting and lock enforcement.
//!
//! Each dimension of a lockout moves through three states per subject:
//!
//! ```text
//! Open ── event ──→ Counting ── count reached ──→ Locked
//!   ↑                  │                             │
//!   └── period lapses ─┘         duration lapses, reset, force_reset
//!   ↑                                                │
//!   └────────────────────────────────────────────────┘
//! ```
//!
//! Keys, with `P` the locker prefix and `L` the lockout name:
//!
//! - count: `P:L:{key_func(subject)}`, TTL = `period`
//! - lock:  `P:L:lock:{key_func(subject)}`, TTL = `duration`

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use corral_core::{unix_timestamp, CachePort, CacheValue, CorralResult};
use tracing::{debug, warn};

use crate::counter::Counter;
use crate::guard::LockoutGuard;

/// Produces the answer given to a locked subject.
pub type ForbidAction<S, R> = Arc<dyn Fn(&S) -> R + Send + Sync>;

/// A named set of dimensions guarding one kind of action.
pub struct Lockout<C: CachePort + ?Sized, S, R> {
    name: String,
    cache: Arc<C>,
    key_prefix: String,
    namespace: Option<String>,
    dimensions: Vec<(String, Counter<S>)>,
    forbid_action: ForbidAction<S, R>,
}

impl<C: CachePort + ?Sized, S, R> Lockout<C, S, R> {
    pub(crate) fn new(
        name: String,
        cache: Arc<C>,
        key_prefix: String,
        namespace: Option<String>,
        dimensions: Vec<(String, Counter<S>)>,
        forbid_action: ForbidAction<S, R>,
    ) -> Self {
        Self {
            name,
            cache,
            key_prefix,
            namespace,
            dimensions,
            forbid_action,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimensions in definition order.
    pub fn dimensions(&self) -> impl Iterator<Item = (&str, &Counter<S>)> {
        self.dimensions.iter().map(|(name, c)| (name.as_str(), c))
    }

    pub fn count_key(&self, counter: &Counter<S>, subject: &S) -> String {
        format!("{}:{}:{}", self.key_prefix, self.name, counter.key(subject))
    }

    pub fn lock_key(&self, counter: &Counter<S>, subject: &S) -> String {
        format!("{}:{}:lock:{}", self.key_prefix, self.name, counter.key(subject))
    }

    fn ns(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl<C: CachePort + ?Sized, S: Sync, R: Send> Lockout<C, S, R> {
    /// Whether any dimension currently locks `subject`.
    pub async fn is_locked(&self, subject: &S) -> CorralResult<bool> {
        if self.dimensions.is_empty() {
            return Ok(false);
        }
        let lock_keys: Vec<String> = self
            .dimensions
            .iter()
            .map(|(_, counter)| self.lock_key(counter, subject))
            .collect();
        let locked = self.cache.get_multi(&lock_keys, self.ns()).await?;
        Ok(!locked.is_empty())
    }

    async fn count_event(
        &self,
        dimension: &str,
        counter: &Counter<S>,
        subject: &S,
    ) -> CorralResult<()> {
        let count_key = self.count_key(counter, subject);
        let first = CacheValue::from(1u64);

        let count = if self
            .cache
            .add(&count_key, first.clone(), counter.period(), self.ns())
            .await?
        {
            1
        } else {
            match self.cache.incr(&count_key, 1, self.ns(), None).await? {
                Some(count) => count,
                None => {
                    // Window lapsed between add and incr.
                    self.cache
                        .add(&count_key, first, counter.period(), self.ns())
                        .await?;
                    1
                }
            }
        };
        debug!(lockout = %self.name, dimension, count, "Counted lockout event");

        if count < counter.count() {
            return Ok(());
        }

        let lock_key = self.lock_key(counter, subject);
        let marker = CacheValue::from(unix_timestamp());
        let engaged = self
            .cache
            .add(&lock_key, marker, counter.duration(), self.ns())
            .await?;
        if engaged {
            warn!(
                lockout = %self.name,
                dimension,
                duration = ?counter.duration(),
                "Lockout engaged"
            );
            counter.alert(subject, &self.name);
            self.cache.delete(&count_key, self.ns()).await?;
        }
        Ok(())
    }

    async fn clear(&self, subject: &S, resettable_only: bool) -> CorralResult<()> {
        let keys: Vec<String> = self
            .dimensions
            .iter()
            .filter(|(_, counter)| !resettable_only || counter.resettable())
            .flat_map(|(_, counter)| [self.count_key(counter, subject), self.lock_key(counter, subject)])
            .collect();
        if keys.is_empty() {
            return Ok(());
        }
        debug!(lockout = %self.name, keys = keys.len(), resettable_only, "Clearing lockout");
        self.cache.delete_multi(&keys, self.ns()).await?;
        Ok(())
    }
}

#[async_trait]
impl<C, S, R> LockoutGuard<S, R> for Lockout<C, S, R>
where
    C: CachePort + ?Sized,
    S: Sync,
    R: Send,
{
    async fn forbid_locked<F, Fut>(&self, subject: &S, action: F) -> CorralResult<R>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = R> + Send,
    {
        if self.is_locked(subject).await? {
            debug!(lockout = %self.name, "Action forbidden by lockout");
            return Ok((self.forbid_action)(subject));
        }
        Ok(action().await)
    }

    async fn forbid_locked_with<G, F, Fut>(
        &self,
        subject: &S,
        forbid: G,
        action: F,
    ) -> CorralResult<R>
    where
        G: FnOnce(&S) -> R + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = R> + Send,
    {
        if self.is_locked(subject).await? {
            debug!(lockout = %self.name, "Action forbidden by lockout");
            return Ok(forbid(subject));
        }
        Ok(action().await)
    }

    async fn guard<F, Fut>(&self, subject: &S, action: F) -> CorralResult<bool>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = bool> + Send,
    {
        let succeeded = action().await;
        if succeeded {
            self.clear(subject, true).await?;
        } else {
            self.incr(subject).await?;
        }
        Ok(succeeded)
    }

    async fn quota<F, Fut>(&self, subject: &S, action: F) -> CorralResult<bool>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = bool> + Send,
    {
        let result = action().await;
        self.incr(subject).await?;
        Ok(result)
    }

    async fn incr(&self, subject: &S) -> CorralResult<()> {
        for (dimension, counter) in &self.dimensions {
            self.count_event(dimension, counter, subject).await?;
        }
        Ok(())
    }

    async fn reset(&self, subject: &S) -> CorralResult<()> {
        self.clear(subject, true).await
    }

    async fn force_reset(&self, subject: &S) -> CorralResult<()> {
        self.clear(subject, false).await
    }
}

impl<C: CachePort + ?Sized, S, R> fmt::Debug for Lockout<C, S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lockout")
            .field("name", &self.name)
            .field("key_prefix", &self.key_prefix)
            .field("namespace", &self.namespace)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}
