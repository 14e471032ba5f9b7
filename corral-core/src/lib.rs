//! Corral Core - Cache Port Contract
//!
//! The cache port trait that every coordination pattern is written against,
//! the error taxonomy, configuration, logging bootstrap, and the bundled
//! ports: an in-process [`MemoryCache`], a storage-less [`NullCache`], and a
//! namespace-routing [`CacheClient`].

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod null;
pub mod port;

pub use client::CacheClient;
pub use config::{CachedConfig, CorralConfig, CounterConfig, LockerConfig};
pub use error::{CacheError, CodecError, ConfigError, CorralError, CorralResult};
pub use logging::{init_tracing, LogFormat};
pub use memory::{CacheStats, MemoryCache};
pub use null::NullCache;
pub use port::{as_counter, decode_value, encode_value, CachePort, CacheValue, NO_EXPIRY};

/// Current unix time in whole seconds, used as lease and lock markers.
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
