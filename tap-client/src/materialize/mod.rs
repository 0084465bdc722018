//! Result materializer
//!
//! Turns the raw payload of a completed job into a `Table`. The only logic
//! here is choosing a reader for the requested output format and turning
//! reader failures into `TapError::MalformedResult`; the readers themselves
//! live in the submodules.

mod csv_table;
mod json;
mod votable;

pub use csv_table::CsvParser;
pub use json::JsonParser;
pub use votable::{VoTableParser, query_status_error};

use std::collections::HashMap;
use std::sync::Arc;
use tap_core::{OutputFormat, Table};
use thiserror::Error;

use crate::error::{Result, TapError};

/// Why a payload could not be read
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Reader for one serialization format
pub trait ResultParser: Send + Sync {
    fn parse(&self, payload: &[u8]) -> std::result::Result<Table, ParseError>;
}

/// Format-keyed registry of result readers
#[derive(Clone)]
pub struct Materializer {
    parsers: HashMap<OutputFormat, Arc<dyn ResultParser>>,
}

impl Materializer {
    /// A registry with no readers
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Register (or replace) the reader for `format`
    pub fn register(&mut self, format: OutputFormat, parser: Arc<dyn ResultParser>) {
        self.parsers.insert(format, parser);
    }

    pub fn with_parser(mut self, format: OutputFormat, parser: Arc<dyn ResultParser>) -> Self {
        self.register(format, parser);
        self
    }

    pub fn supports(&self, format: OutputFormat) -> bool {
        self.parsers.contains_key(&format)
    }

    /// Read `payload` as a table of the given format
    ///
    /// # Errors
    /// `TapError::MalformedResult`, carrying the payload, when no reader is
    /// registered for the format or the reader rejects the payload.
    pub fn materialize(&self, format: OutputFormat, payload: Vec<u8>) -> Result<Table> {
        let Some(parser) = self.parsers.get(&format) else {
            return Err(TapError::MalformedResult {
                format,
                reason: format!("no reader registered for {}", format),
                payload,
            });
        };

        match parser.parse(&payload) {
            Ok(table) => Ok(table),
            Err(e) => Err(TapError::MalformedResult {
                format,
                reason: e.0,
                payload,
            }),
        }
    }
}

impl Default for Materializer {
    /// Readers for VOTable, CSV and JSON
    fn default() -> Self {
        Self::empty()
            .with_parser(OutputFormat::VoTable, Arc::new(VoTableParser))
            .with_parser(OutputFormat::Csv, Arc::new(CsvParser))
            .with_parser(OutputFormat::Json, Arc::new(JsonParser))
    }
}

impl std::fmt::Debug for Materializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut formats: Vec<_> = self.parsers.keys().map(|f| f.token()).collect();
        formats.sort_unstable();
        f.debug_struct("Materializer")
            .field("formats", &formats)
            .finish()
    }
}
