//! Client configuration
//!
//! Defines the tunables of a `TapClient`: service location, per-call
//! timeout, default output format and the retry/poll schedules.

use std::time::Duration;

use tap_core::OutputFormat;

use crate::backoff::ExponentialBackoff;
use crate::error::{Result, TapError};

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Service base URL (e.g., "https://gea.esac.esa.int/tap-server/tap")
    pub base_url: String,

    /// Timeout applied to every single HTTP call
    pub request_timeout: Duration,

    /// Output format used when a query does not pick one
    pub default_format: OutputFormat,

    /// Formats the service is allowed to be asked for
    pub supported_formats: Vec<OutputFormat>,

    /// First delay between retries of a failed transport call
    pub retry_base: Duration,

    /// Longest delay between retries
    pub retry_cap: Duration,

    /// Attempts per call, including the first
    pub max_attempts: u32,

    /// First pause between status polls
    pub poll_interval: Duration,

    /// Longest pause between status polls
    pub poll_max_interval: Duration,

    pub user_agent: String,
}

impl ClientConfig {
    /// Creates a new configuration with defaults
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(60),
            default_format: OutputFormat::VoTable,
            supported_formats: vec![
                OutputFormat::VoTable,
                OutputFormat::Csv,
                OutputFormat::Json,
                OutputFormat::Fits,
            ],
            retry_base: Duration::from_secs(1),
            retry_cap: Duration::from_secs(30),
            max_attempts: 5,
            poll_interval: Duration::from_secs(1),
            poll_max_interval: Duration::from_secs(30),
            user_agent: format!("tap-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - TAP_URL (required)
    /// - TAP_TIMEOUT (optional, seconds, default: 60)
    /// - TAP_FORMAT (optional, default: votable)
    /// - TAP_MAX_RETRIES (optional, default: 5)
    /// - TAP_POLL_INTERVAL (optional, seconds, default: 1)
    /// - TAP_POLL_MAX_INTERVAL (optional, seconds, default: 30)
    ///
    /// Unparseable optional values fall back to their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup("TAP_URL")
            .ok_or_else(|| TapError::InvalidConfig("TAP_URL environment variable not set".into()))?;

        let mut config = Self::new(base_url);

        let seconds = |key: &str| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        };

        if let Some(timeout) = seconds("TAP_TIMEOUT") {
            config.request_timeout = timeout;
        }
        if let Some(format) = lookup("TAP_FORMAT").and_then(|s| OutputFormat::from_token(&s)) {
            config.default_format = format;
        }
        if let Some(attempts) = lookup("TAP_MAX_RETRIES").and_then(|s| s.trim().parse::<u32>().ok())
        {
            config.max_attempts = attempts;
        }
        if let Some(interval) = seconds("TAP_POLL_INTERVAL") {
            config.poll_interval = interval;
        }
        if let Some(interval) = seconds("TAP_POLL_MAX_INTERVAL") {
            config.poll_max_interval = interval;
        }

        Ok(config)
    }

    /// Check that the configuration can drive a client
    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(TapError::InvalidConfig("base URL is empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TapError::InvalidConfig(format!(
                "base URL '{}' is not an http(s) URL",
                url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(TapError::InvalidConfig("request timeout must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(TapError::InvalidConfig("at least one attempt is required".into()));
        }
        if !self.supported_formats.contains(&self.default_format) {
            return Err(TapError::InvalidConfig(format!(
                "default format {} is not in the supported formats",
                self.default_format
            )));
        }
        Ok(())
    }

    /// Backoff between retries of failed transport calls
    pub fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.retry_base, self.retry_cap, self.max_attempts)
    }

    /// Pause schedule between status polls
    ///
    /// Only delays are used from it; a wait is bounded by its deadline.
    pub fn poll_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.poll_interval, self.poll_max_interval, u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("http://test/tap");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.default_format, OutputFormat::VoTable);
        assert_eq!(config.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("TAP_URL", "https://archive/tap"),
            ("TAP_TIMEOUT", "10"),
            ("TAP_FORMAT", "CSV"),
            ("TAP_MAX_RETRIES", "2"),
            ("TAP_POLL_INTERVAL", "3"),
            ("TAP_POLL_MAX_INTERVAL", "9"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://archive/tap");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.default_format, OutputFormat::Csv);
        assert_eq!(config.max_attempts, 2);
        let pauses: Vec<u64> = config.poll_policy().delays().take(4).map(|d| d.as_secs()).collect();
        assert_eq!(pauses, vec![3, 6, 9, 9]);
    }

    #[test]
    fn test_from_lookup_falls_back_on_bad_values() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("TAP_URL", "http://test"),
            ("TAP_TIMEOUT", "soon"),
            ("TAP_FORMAT", "parquet"),
        ]))
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.default_format, OutputFormat::VoTable);
    }

    #[test]
    fn test_from_lookup_requires_url() {
        let result = ClientConfig::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(TapError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientConfig::new("").validate().is_err());
        assert!(ClientConfig::new("ftp://test").validate().is_err());

        let mut config = ClientConfig::new("http://test");
        config.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::new("http://test");
        config.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::new("http://test");
        config.supported_formats = vec![OutputFormat::Csv];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_uses_knobs() {
        let policy = ClientConfig::new("http://test").retry_policy();
        let delays: Vec<u64> = policy.delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);

        let mut config = ClientConfig::new("http://test");
        config.max_attempts = 9;
        let last = config.retry_policy().delays().last();
        assert_eq!(last, Some(config.retry_cap));
    }
}
