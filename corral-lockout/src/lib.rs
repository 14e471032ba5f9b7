//! Corral Lockout - Failure Counters and Locks
//!
//! Throttles subjects (users, addresses, user/address pairs) that fail too
//! often. A [`Locker`] holds named dimension templates; each
//! [`Lockout`] defined from it counts events per dimension in a cache port
//! and locks a dimension once its threshold is reached within the period.
//!
//! All state lives in the cache, so every process sharing it enforces the
//! same locks.

pub mod counter;
pub mod guard;
pub mod locker;
pub mod lockout;
pub mod null;

pub use counter::{Alert, Counter, CounterOverrides, KeyFunc};
pub use guard::LockoutGuard;
pub use locker::Locker;
pub use lockout::{ForbidAction, Lockout};
pub use null::{NullLocker, NullLockout};
