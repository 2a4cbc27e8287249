//! Demo configuration loaded from environment variables.

use saga::SagaConfig;

/// Demo configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `SAGA_MAX_RETRY_ATTEMPTS`, `SAGA_RETRY_DELAY_MS`: see [`SagaConfig`]
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub saga: SagaConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            saga: SagaConfig::from_lookup(lookup),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            saga: SagaConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.saga, SagaConfig::default());
    }

    #[test]
    fn test_lookup_overrides() {
        let vars = HashMap::from([
            ("RUST_LOG", "debug,saga=trace"),
            ("SAGA_RETRY_DELAY_MS", "250"),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.log_level, "debug,saga=trace");
        assert_eq!(config.saga.retry_delay, Duration::from_millis(250));
        assert_eq!(config.saga.max_retry_attempts, 5);
    }
}
