//! Logging bootstrap.
//!
//! The library crates only emit `tracing` events. Applications (and test
//! binaries) that want to see them install a subscriber once at startup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ConfigError, CorralResult};

/// Output format for the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Read `CORRAL_LOG_FORMAT` (`json` or anything else for text).
    pub fn from_env() -> Self {
        match std::env::var("CORRAL_LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; `default_filter` (for example
/// `"corral_patterns=debug,info"`) applies when it is unset.
///
/// # Errors
///
/// Returns [`ConfigError::LoggingInit`] if a global subscriber is already set.
pub fn init_tracing(default_filter: &str, format: LogFormat) -> CorralResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = fmt().with_env_filter(env_filter).with_target(true);
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    result.map_err(|e| {
        ConfigError::LoggingInit {
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing("info", LogFormat::Text);
        assert!(init_tracing("info", LogFormat::Json).is_err());
    }
}
