//! Catalog fetch retry configuration and error classification.

use backon::ExponentialBuilder;
use std::time::Duration;

/// Configuration for catalog fetch retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// Creates a RetryConfig from environment variables.
    ///
    /// Environment variables:
    /// - `RECIBO_CATALOG_MAX_RETRIES`: Maximum retry attempts (default: 3)
    /// - `RECIBO_CATALOG_RETRY_INITIAL_MS`: Initial backoff delay in ms (default: 200)
    /// - `RECIBO_CATALOG_RETRY_MAX_MS`: Maximum backoff delay in ms (default: 5000)
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_retries: std::env::var("RECIBO_CATALOG_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_retries),
            initial_delay_ms: std::env::var("RECIBO_CATALOG_RETRY_INITIAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.initial_delay_ms),
            max_delay_ms: std::env::var("RECIBO_CATALOG_RETRY_MAX_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_delay_ms),
        }
    }

    /// Creates an exponential backoff builder with jitter.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

/// Classifies catalog fetch errors as retryable or not.
///
/// Retryable errors include network issues (timeout, connection reset,
/// connection refused, broken pipe), service unavailability (502/503) and
/// throttling (429).
pub fn is_retryable_fetch_error(err: &str) -> bool {
    let retryable_patterns = [
        "timeout",
        "timed out",
        "connection reset",
        "connection refused",
        "broken pipe",
        "502",
        "503",
        "service unavailable",
        "429",
        "too many requests",
    ];
    let err_lower = err.to_lowercase();
    retryable_patterns.iter().any(|p| err_lower.contains(p))
}
