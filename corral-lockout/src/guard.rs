//! The capability set shared by real and disabled lockouts.

use std::future::Future;

use async_trait::async_trait;
use corral_core::CorralResult;

/// Wraps actions performed on behalf of a subject `S` whose results are `R`.
///
/// Swapping a [`Lockout`](crate::Lockout) for a
/// [`NullLockout`](crate::NullLockout) disables enforcement without touching
/// call sites.
#[async_trait]
pub trait LockoutGuard<S: Sync, R: Send>: Send + Sync {
    /// Run `action` unless the subject is locked in any dimension, in which
    /// case the configured forbid action answers instead.
    async fn forbid_locked<F, Fut>(&self, subject: &S, action: F) -> CorralResult<R>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = R> + Send;

    /// [`forbid_locked`](Self::forbid_locked) with a per-call forbid action.
    async fn forbid_locked_with<G, F, Fut>(
        &self,
        subject: &S,
        forbid: G,
        action: F,
    ) -> CorralResult<R>
    where
        G: FnOnce(&S) -> R + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = R> + Send;

    /// Count a failure when `action` returns `false`; reset resettable
    /// dimensions when it returns `true`.
    async fn guard<F, Fut>(&self, subject: &S, action: F) -> CorralResult<bool>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = bool> + Send;

    /// Count every call regardless of outcome. Never resets.
    async fn quota<F, Fut>(&self, subject: &S, action: F) -> CorralResult<bool>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = bool> + Send;

    /// Count one event in every dimension.
    async fn incr(&self, subject: &S) -> CorralResult<()>;

    /// Clear counters and locks of resettable dimensions.
    async fn reset(&self, subject: &S) -> CorralResult<()>;

    /// Clear counters and locks of every dimension.
    async fn force_reset(&self, subject: &S) -> CorralResult<()>;
}
