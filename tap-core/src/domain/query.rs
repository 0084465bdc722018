//! Query request types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::job::JobMode;

/// Result serialization a service can be asked for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    VoTable,
    Csv,
    Json,
    Fits,
}

impl OutputFormat {
    /// Canonical `FORMAT` token sent on the wire
    pub fn token(&self) -> &'static str {
        match self {
            OutputFormat::VoTable => "votable",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Fits => "fits",
        }
    }

    /// Resolve a caller-supplied format name, accepting common synonyms
    ///
    /// Returns `None` when the name is not a known format.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        let format = match token.as_str() {
            "votable" | "vot" | "xml" | "votable/td" | "application/x-votable+xml" => {
                OutputFormat::VoTable
            }
            "csv" | "text/csv" => OutputFormat::Csv,
            "json" | "application/json" => OutputFormat::Json,
            "fits" | "application/fits" => OutputFormat::Fits,
            _ => return None,
        };
        Some(format)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A table shipped to the service alongside the query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTable {
    /// Logical name, referenced in ADQL as `TAP_UPLOAD.<name>`
    pub name: String,
    /// Serialized table bytes
    pub payload: Vec<u8>,
    /// MIME type of the payload
    pub content_type: String,
}

impl UploadTable {
    pub fn new(
        name: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
            content_type: content_type.into(),
        }
    }

    /// Upload a VOTable document
    pub fn votable(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(name, payload, "application/x-votable+xml")
    }
}

/// Caller-supplied description of one query
///
/// Built once with the consuming `with_*` methods and then only read. The
/// output format is kept as the caller wrote it; resolving and validating it
/// is the encoder's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    query: String,
    mode: JobMode,
    format: String,
    uploads: Vec<UploadTable>,
    job_name: Option<String>,
    max_rec: Option<u64>,
    extra_params: BTreeMap<String, String>,
}

impl QuerySpec {
    pub fn new(query: impl Into<String>, mode: JobMode) -> Self {
        Self {
            query: query.into(),
            mode,
            format: OutputFormat::default().token().to_string(),
            uploads: Vec::new(),
            job_name: None,
            max_rec: None,
            extra_params: BTreeMap::new(),
        }
    }

    /// A synchronous query
    pub fn sync(query: impl Into<String>) -> Self {
        Self::new(query, JobMode::Sync)
    }

    /// An asynchronous query
    pub fn asynchronous(query: impl Into<String>) -> Self {
        Self::new(query, JobMode::Async)
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_upload(mut self, upload: UploadTable) -> Self {
        self.uploads.push(upload);
        self
    }

    pub fn with_job_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = Some(name.into());
        self
    }

    pub fn with_max_rec(mut self, max_rec: u64) -> Self {
        self.max_rec = Some(max_rec);
        self
    }

    /// Add a service-specific protocol parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> JobMode {
        self.mode
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn uploads(&self) -> &[UploadTable] {
        &self.uploads
    }

    pub fn job_name(&self) -> Option<&str> {
        self.job_name.as_deref()
    }

    pub fn max_rec(&self) -> Option<u64> {
        self.max_rec
    }

    pub fn extra_params(&self) -> &BTreeMap<String, String> {
        &self.extra_params
    }
}
