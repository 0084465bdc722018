//! Error types for the TAP client

use std::time::Duration;

use tap_core::{OutputFormat, Phase};
use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, TapError>;

/// Longest server body excerpt kept in an error
const SNIPPET_LIMIT: usize = 512;

/// Errors that can occur when driving a TAP service
#[derive(Debug, Error)]
pub enum TapError {
    /// The query could not be encoded (empty text, unsupported format, ...)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The service rejected the submission
    #[error("Submission failed (status {status}): {body}")]
    Submission {
        /// HTTP status code
        status: u16,
        /// Start of the response body
        body: String,
    },

    /// Polling kept failing and the job was marked as locally failed
    #[error("Failed to poll job {job_id} after {attempts} attempt(s): {source}")]
    Poll {
        job_id: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The result of a job could not be retrieved
    #[error("Cannot fetch result of job {job_id}: {cause}")]
    ResultFetch {
        job_id: String,
        #[source]
        cause: ResultFetchFailure,
    },

    /// The result payload could not be read in its declared format
    #[error("Malformed {format} result: {reason}")]
    MalformedResult {
        format: OutputFormat,
        reason: String,
        /// Raw payload as received, for diagnostics
        payload: Vec<u8>,
    },

    /// Waiting for a job exceeded its deadline
    #[error("Job {job_id} still {last_phase} after {waited:?}")]
    Timeout {
        job_id: String,
        last_phase: Phase,
        waited: Duration,
    },

    /// The job could not be aborted
    #[error("Cannot abort job {job_id} in phase {phase}: {message}")]
    Abort {
        job_id: String,
        phase: Phase,
        message: String,
    },

    /// The job ended without a result
    #[error("Job {job_id} ended in phase {phase}: {message}")]
    JobFailed {
        job_id: String,
        phase: Phase,
        message: String,
    },

    /// Transport failure on a request that is never retried
    #[error("HTTP request failed: {0}")]
    Transport(#[from] TransportError),

    /// API returned an unexpected status code
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// A service document could not be understood
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Client configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why a result fetch failed
#[derive(Debug, Error)]
pub enum ResultFetchFailure {
    /// Fetch attempted before the job completed; never retried
    #[error("job is {phase}, not COMPLETED")]
    NotCompleted { phase: Phase },

    /// Transport kept failing past the retry budget
    #[error("transport failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The service answered with an unexpected status
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
}

impl TapError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a submission error, keeping only the start of the body
    pub fn submission(status: u16, body: &[u8]) -> Self {
        Self::Submission {
            status,
            body: snippet(body),
        }
    }

    /// Check if retrying the same call later may succeed
    ///
    /// Malformed queries, malformed results and misuse (fetching an
    /// unfinished job) are never worth retrying.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Poll { .. } | Self::Timeout { .. } | Self::Transport(_) => true,
            Self::ResultFetch { cause, .. } => {
                matches!(cause, ResultFetchFailure::Transport { .. })
            }
            Self::Submission { status, .. } | Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Job identifier carried by the error, if any
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Poll { job_id, .. }
            | Self::ResultFetch { job_id, .. }
            | Self::Timeout { job_id, .. }
            | Self::Abort { job_id, .. }
            | Self::JobFailed { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } | Self::Submission { status, .. } if (400..500).contains(status))
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } | Self::Submission { status, .. } if *status >= 500)
    }
}

/// Lossy text excerpt of a response body
pub(crate) fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() <= SNIPPET_LIMIT {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(SNIPPET_LIMIT).collect();
    cut.push_str("...");
    cut
}
