//! Saga service configuration loaded from environment variables.

use std::time::Duration;

/// Default number of attempts for a completion or compensation action.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 5;

/// Default delay between attempts of a failing action.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5000);

/// Retry settings of the in-memory saga service.
///
/// Reads from environment variables:
/// - `SAGA_MAX_RETRY_ATTEMPTS`: attempts per action (default: `5`)
/// - `SAGA_RETRY_DELAY_MS`: delay between attempts (default: `5000`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    pub max_retry_attempts: u32,
    pub retry_delay: Duration,
}

impl SagaConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            max_retry_attempts: lookup("SAGA_MAX_RETRY_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .filter(|attempts| *attempts > 0)
                .unwrap_or(DEFAULT_MAX_RETRY_ATTEMPTS),
            retry_delay: lookup("SAGA_RETRY_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_DELAY),
        }
    }

    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}
