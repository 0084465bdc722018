//! Configuration module
//!
//! Turns the global CLI flags into a configured `TapClient`.

use anyhow::{Context, Result, anyhow};
use std::time::Duration;
use tap_client::{ClientConfig, TapClient};
use tap_core::OutputFormat;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the TAP service
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Format name used when a command does not pick one
    pub default_format: String,
    pub max_retries: u32,
    /// Print JSON instead of coloured text
    pub json: bool,
}

impl Config {
    /// Library configuration for these flags
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::new(&self.base_url);
        config.request_timeout = Duration::from_secs(self.timeout_secs);
        config.max_attempts = self.max_retries;
        config.default_format = OutputFormat::from_token(&self.default_format)
            .ok_or_else(|| anyhow!("Unknown output format '{}'", self.default_format))?;
        Ok(config)
    }

    /// Build a client for the configured service
    pub fn client(&self) -> Result<TapClient> {
        let config = self.client_config()?;
        TapClient::from_config(&config).context("Failed to create TAP client")
    }
}
