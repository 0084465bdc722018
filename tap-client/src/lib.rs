//! TAP Client
//!
//! An asynchronous job client for IVOA Table Access Protocol services.
//!
//! `TapClient` submits ADQL queries, drives async jobs through their UWS
//! lifecycle with injectable backoff, fetches results and turns them into
//! tables. The HTTP connection sits behind the `Transport` trait so the whole
//! engine can run against `mock::MockTransport` (feature `mock`) in tests.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tap_client::TapClient;
//! use tap_core::QuerySpec;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = TapClient::new("https://gea.esac.esa.int/tap-server/tap")?;
//!
//!     let spec = QuerySpec::asynchronous("SELECT TOP 5 * FROM gaiadr3.gaia_source");
//!     let (job, table) = client.query(&spec, Duration::from_secs(300)).await?;
//!
//!     println!("Job {} returned {} rows", job.label(), table.len());
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod config;
pub mod cone;
pub mod dialect;
pub mod encoder;
pub mod error;
pub mod job;
mod jobs;
pub mod materialize;
pub mod metadata;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod transport;
pub mod uws;
mod xml;

// Re-export commonly used types
pub use backoff::{BackoffPolicy, ConstantBackoff, Delays, ExponentialBackoff, NoDelay};
pub use config::ClientConfig;
pub use cone::{BoxQuery, ConeQuery};
pub use dialect::{AbortStyle, TapDialect};
pub use encoder::{EncodedRequest, QueryEncoder};
pub use error::{ResultFetchFailure, Result, TapError};
pub use job::{Job, JobError, ResultLocation};
pub use materialize::{Materializer, ParseError, ResultParser};
pub use metadata::MetadataCache;
pub use transport::{HttpTransport, Transport, TransportError};

use std::sync::Arc;
use std::time::Duration;
use tap_core::OutputFormat;

/// Client for one TAP service
///
/// Cloning is cheap: clones share the transport (and with it any session
/// cookies), the result readers and the backoff policies. A `TapClient`
/// holds no per-job state; every operation works on the `Job` it is given,
/// so many jobs can be driven concurrently from clones of one client.
#[derive(Clone)]
pub struct TapClient {
    /// Service base URL without trailing slash
    base_url: String,
    transport: Arc<dyn Transport>,
    dialect: TapDialect,
    encoder: QueryEncoder,
    materializer: Arc<Materializer>,
    /// Delays between retries of failed transport calls
    retry: Arc<dyn BackoffPolicy>,
    /// Pauses between status polls in `wait_until_done`
    poll_schedule: Arc<dyn BackoffPolicy>,
    /// Timeout applied to each HTTP call
    request_timeout: Option<Duration>,
    default_format: OutputFormat,
}

impl TapClient {
    /// Create a client with default settings and an HTTP transport
    ///
    /// # Example
    /// ```
    /// use tap_client::TapClient;
    ///
    /// let client = TapClient::new("http://localhost:8080/tap").unwrap();
    /// assert_eq!(client.base_url(), "http://localhost:8080/tap");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::from_config(&ClientConfig::new(base_url))
    }

    /// Create a client from a validated configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.user_agent, config.request_timeout)?;

        Ok(Self::with_transport(&config.base_url, Arc::new(transport))
            .with_encoder(QueryEncoder::new(config.supported_formats.clone()))
            .with_retry_policy(config.retry_policy())
            .with_poll_schedule(config.poll_policy())
            .with_request_timeout(Some(config.request_timeout))
            .with_default_format(config.default_format))
    }

    /// Create a client over any transport
    ///
    /// Uses the standard dialect, all built-in formats and the default
    /// backoff; no per-call timeout is set beyond the transport's own.
    pub fn with_transport(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            dialect: TapDialect::standard(),
            encoder: QueryEncoder::default(),
            materializer: Arc::new(Materializer::default()),
            retry: Arc::new(ExponentialBackoff::default()),
            poll_schedule: Arc::new(ExponentialBackoff::new(
                Duration::from_secs(1),
                Duration::from_secs(30),
                u32::MAX,
            )),
            request_timeout: None,
            default_format: OutputFormat::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: TapDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_encoder(mut self, encoder: QueryEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_materializer(mut self, materializer: Materializer) -> Self {
        self.materializer = Arc::new(materializer);
        self
    }

    /// Backoff used when a poll or result fetch fails at the transport level
    pub fn with_retry_policy(mut self, policy: impl BackoffPolicy + 'static) -> Self {
        self.retry = Arc::new(policy);
        self
    }

    /// Pause schedule between polls of `wait_until_done`
    pub fn with_poll_schedule(mut self, policy: impl BackoffPolicy + 'static) -> Self {
        self.poll_schedule = Arc::new(policy);
        self
    }

    /// Timeout of each HTTP call; clone the client to use a different one per call
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Format used by the convenience queries (cone and box searches)
    pub fn with_default_format(mut self, format: OutputFormat) -> Self {
        self.default_format = format;
        self
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn dialect(&self) -> &TapDialect {
        &self.dialect
    }

    pub fn encoder(&self) -> &QueryEncoder {
        &self.encoder
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn default_format(&self) -> OutputFormat {
        self.default_format
    }
}

impl std::fmt::Debug for TapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapClient")
            .field("base_url", &self.base_url)
            .field("dialect", &self.dialect)
            .field("materializer", &self.materializer)
            .field("retry", &self.retry)
            .field("poll_schedule", &self.poll_schedule)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    #[test]
    fn test_client_creation() {
        let client = TapClient::new("http://localhost:8080/tap").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/tap");
        assert_eq!(client.request_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = TapClient::with_transport("http://test/tap/", Arc::new(MockTransport::new()));
        assert_eq!(client.base_url(), "http://test/tap");
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        assert!(matches!(
            TapClient::new("not a url"),
            Err(TapError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_config_applies_settings() {
        let mut config = ClientConfig::new("http://test");
        config.supported_formats = vec![OutputFormat::Csv];
        config.default_format = OutputFormat::Csv;

        let client = TapClient::from_config(&config).unwrap();
        assert_eq!(client.encoder().supported_formats(), &[OutputFormat::Csv]);
        assert_eq!(client.default_format(), OutputFormat::Csv);
    }
}
