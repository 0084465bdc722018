//! Transport layer
//!
//! Abstracts the HTTP connection to a TAP service so the job engine can be
//! driven against a real server or an in-process mock:
//! - `Transport` trait: one request in, one response out
//! - `HttpTransport`: reqwest-backed implementation
//! - `crate::mock::MockTransport`: scripted implementation for tests
//!
//! Transports are shared read-only; cookies and credentials held by an
//! implementation are consumed, never changed, by the job engine.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Transport trait for TAP communication
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one HTTP exchange
    ///
    /// Any status code is a successful exchange; only failures to get a
    /// response at all are errors. Redirects must not be followed.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    /// The request could not be built; sending it again will not help
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    /// The service answered with a 5xx status; treated as transient
    #[error("Service unavailable (status {0})")]
    ServerStatus(u16),
}

impl TransportError {
    /// Failures worth another attempt
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Request(_))
    }
}

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// A file part of a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub name: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    /// `application/x-www-form-urlencoded` fields
    Form(Vec<(String, String)>),
    /// `multipart/form-data` text fields followed by file parts
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FilePart>,
    },
}

/// Outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    /// Per-call timeout; `None` leaves the transport default in place
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    fn new(method: Method, url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            body,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url, RequestBody::Empty)
    }

    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self::new(Method::Post, url, body)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url, RequestBody::Empty)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Incoming response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header pairs with lower-cased names
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A 200 response
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    /// A 303 response pointing at `location`
    pub fn see_other(location: impl Into<String>) -> Self {
        Self::new(303, Vec::new()).with_header("Location", location)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    /// Look up a header, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
