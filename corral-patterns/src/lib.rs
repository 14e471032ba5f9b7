//! Corral Patterns - Cache Coordination
//!
//! Coordination patterns written against [`corral_core::CachePort`]:
//!
//! - [`one_pass`]: single-flight lease so one caller computes a missing entry
//! - [`dependency`]: groups of keys invalidated together
//! - [`cached`]: cache-aside orchestration (`get_or_add`, `get_or_set`,
//!   `get_or_create`, `get_or_set_multi`)
//! - [`wraps`]: function wrappers keyed by their arguments
//! - [`keys`]: key derivation
//! - [`emitter`]: at-most-once-per-period message emission

pub mod cached;
pub mod dependency;
pub mod emitter;
pub mod keys;
pub mod one_pass;
pub mod wraps;

pub use cached::{depends_on, Cached, DependencyKeyFactory};
pub use dependency::CacheDependency;
pub use emitter::OnePassEmitter;
pub use keys::{KeyArgs, KeyBuilder, PrefixKeyBuilder};
pub use one_pass::{Lease, OnePass, Pass, Waiter};
pub use wraps::{CachedFn, CachedMultiFn};
