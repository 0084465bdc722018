//! Query encoder
//!
//! Turns a `QuerySpec` into TAP protocol parameters. Encoding is a pure
//! function of its input: parameter keys are canonical upper-case names kept
//! in sorted order, so equivalent specs always encode to identical requests.

use std::collections::BTreeMap;

use tap_core::{OutputFormat, QuerySpec};

use crate::error::{Result, TapError};
use crate::transport::{FilePart, RequestBody};

/// Parameters a caller may not set through extra parameters
const RESERVED: [&str; 6] = ["REQUEST", "LANG", "FORMAT", "PHASE", "QUERY", "UPLOAD"];

/// Encoded upload part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUpload {
    pub part_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Wire form of one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRequest {
    params: BTreeMap<String, String>,
    uploads: Vec<EncodedUpload>,
    format: OutputFormat,
}

impl EncodedRequest {
    /// Protocol parameters, keyed by canonical name
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn uploads(&self) -> &[EncodedUpload] {
        &self.uploads
    }

    /// Resolved output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_multipart(&self) -> bool {
        !self.uploads.is_empty()
    }

    /// Request body: a form, or multipart when tables are uploaded
    pub fn to_body(&self) -> RequestBody {
        let fields: Vec<(String, String)> = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if self.uploads.is_empty() {
            return RequestBody::Form(fields);
        }

        let files = self
            .uploads
            .iter()
            .map(|upload| FilePart {
                name: upload.part_name.clone(),
                file_name: format!("{}.{}", upload.part_name, extension(&upload.content_type)),
                content_type: upload.content_type.clone(),
                bytes: upload.bytes.clone(),
            })
            .collect();

        RequestBody::Multipart { fields, files }
    }
}

/// Maps query specifications to protocol parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEncoder {
    supported: Vec<OutputFormat>,
}

impl QueryEncoder {
    /// Creates an encoder accepting only the given output formats
    pub fn new(supported: Vec<OutputFormat>) -> Self {
        Self { supported }
    }

    pub fn supported_formats(&self) -> &[OutputFormat] {
        &self.supported
    }

    /// Encode a query specification
    ///
    /// # Errors
    /// `TapError::InvalidQuery` when the query text is blank, the format is
    /// unknown or not accepted by this encoder, an upload name is not a valid
    /// ADQL identifier, or an extra parameter collides with another one.
    pub fn encode(&self, spec: &QuerySpec) -> Result<EncodedRequest> {
        if spec.query().trim().is_empty() {
            return Err(TapError::InvalidQuery("query text is empty".to_string()));
        }

        let format = OutputFormat::from_token(spec.format()).ok_or_else(|| {
            TapError::InvalidQuery(format!("unknown output format '{}'", spec.format()))
        })?;
        if !self.supported.contains(&format) {
            return Err(TapError::InvalidQuery(format!(
                "output format '{}' is not supported by this service",
                format
            )));
        }

        let mut params = BTreeMap::new();
        params.insert("REQUEST".to_string(), "doQuery".to_string());
        params.insert("LANG".to_string(), "ADQL".to_string());
        params.insert("FORMAT".to_string(), format.token().to_string());
        params.insert("PHASE".to_string(), "RUN".to_string());
        params.insert("QUERY".to_string(), spec.query().to_string());

        if let Some(name) = spec.job_name() {
            params.insert("JOBNAME".to_string(), name.to_string());
        }
        if let Some(max_rec) = spec.max_rec() {
            params.insert("MAXREC".to_string(), max_rec.to_string());
        }

        for (key, value) in spec.extra_params() {
            let canonical = key.trim().to_ascii_uppercase();
            if canonical.is_empty() {
                return Err(TapError::InvalidQuery("empty parameter name".to_string()));
            }
            if RESERVED.contains(&canonical.as_str()) {
                return Err(TapError::InvalidQuery(format!(
                    "parameter {} is set by the client",
                    canonical
                )));
            }
            if params.insert(canonical.clone(), value.clone()).is_some() {
                return Err(TapError::InvalidQuery(format!(
                    "parameter {} given more than once",
                    canonical
                )));
            }
        }

        let mut uploads = Vec::with_capacity(spec.uploads().len());
        let mut references = Vec::with_capacity(spec.uploads().len());
        for upload in spec.uploads() {
            if !is_adql_identifier(&upload.name) {
                return Err(TapError::InvalidQuery(format!(
                    "upload name '{}' is not a valid table name",
                    upload.name
                )));
            }
            if uploads
                .iter()
                .any(|u: &EncodedUpload| u.part_name.eq_ignore_ascii_case(&upload.name))
            {
                return Err(TapError::InvalidQuery(format!(
                    "upload '{}' given more than once",
                    upload.name
                )));
            }
            references.push(format!("{},param:{}", upload.name, upload.name));
            uploads.push(EncodedUpload {
                part_name: upload.name.clone(),
                content_type: upload.content_type.clone(),
                bytes: upload.payload.clone(),
            });
        }
        if !references.is_empty() {
            params.insert("UPLOAD".to_string(), references.join(";"));
        }

        Ok(EncodedRequest {
            params,
            uploads,
            format,
        })
    }
}

impl Default for QueryEncoder {
    fn default() -> Self {
        Self::new(vec![
            OutputFormat::VoTable,
            OutputFormat::Csv,
            OutputFormat::Json,
            OutputFormat::Fits,
        ])
    }
}

/// File extension for an upload part, from its media type
fn extension(content_type: &str) -> &'static str {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match media.as_str() {
        "text/csv" => "csv",
        "text/tab-separated-values" => "tsv",
        "application/json" => "json",
        "application/fits" | "image/fits" => "fits",
        _ if media.ends_with("xml") || media.contains("votable") => "xml",
        _ => "dat",
    }
}

fn is_adql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tap_core::UploadTable;

    fn is_invalid(result: Result<EncodedRequest>) -> bool {
        matches!(result, Err(TapError::InvalidQuery(_)))
    }

    #[test]
    fn test_minimal_parameters() {
        let encoded = QueryEncoder::default()
            .encode(&QuerySpec::asynchronous("SELECT TOP 5 * FROM table"))
            .unwrap();

        assert_eq!(encoded.param("REQUEST"), Some("doQuery"));
        assert_eq!(encoded.param("LANG"), Some("ADQL"));
        assert_eq!(encoded.param("FORMAT"), Some("votable"));
        assert_eq!(encoded.param("PHASE"), Some("RUN"));
        assert_eq!(encoded.param("QUERY"), Some("SELECT TOP 5 * FROM table"));
        assert_eq!(encoded.param("UPLOAD"), None);
        assert_eq!(encoded.params().len(), 5);
        assert!(!encoded.is_multipart());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let spec = QuerySpec::sync("SELECT * FROM t")
            .with_format("csv")
            .with_job_name("run-1")
            .with_max_rec(100)
            .with_param("RUNID", "abc");
        let encoder = QueryEncoder::default();

        let first = encoder.encode(&spec).unwrap();
        let second = encoder.encode(&spec).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_body(), second.to_body());
    }

    #[test]
    fn test_format_synonyms_encode_identically() {
        let encoder = QueryEncoder::default();
        let a = encoder
            .encode(&QuerySpec::sync("SELECT 1").with_format("votable"))
            .unwrap();
        let b = encoder
            .encode(&QuerySpec::sync("SELECT 1").with_format("VOT"))
            .unwrap();
        assert_eq!(a.params(), b.params());
    }

    #[test]
    fn test_extra_parameter_keys_are_canonical() {
        let encoder = QueryEncoder::default();
        let lower = encoder
            .encode(&QuerySpec::sync("SELECT 1").with_param("runid", "x"))
            .unwrap();
        let upper = encoder
            .encode(&QuerySpec::sync("SELECT 1").with_param("RUNID", "x"))
            .unwrap();
        assert_eq!(lower.params(), upper.params());
        assert_eq!(lower.param("RUNID"), Some("x"));
    }

    #[test]
    fn test_rejects_invalid_specs() {
        let encoder = QueryEncoder::default();
        assert!(is_invalid(encoder.encode(&QuerySpec::sync(""))));
        assert!(is_invalid(encoder.encode(&QuerySpec::sync("   \n"))));
        assert!(is_invalid(
            encoder.encode(&QuerySpec::sync("SELECT 1").with_format("parquet"))
        ));
        assert!(is_invalid(
            encoder.encode(&QuerySpec::sync("SELECT 1").with_param("query", "x"))
        ));
        assert!(is_invalid(encoder.encode(
            &QuerySpec::sync("SELECT 1")
                .with_max_rec(5)
                .with_param("maxrec", "10")
        )));
        assert!(is_invalid(encoder.encode(
            &QuerySpec::sync("SELECT 1").with_param("a", "1").with_param("A", "2")
        )));
    }

    #[test]
    fn test_allow_list_is_enforced() {
        let encoder = QueryEncoder::new(vec![OutputFormat::VoTable]);
        assert!(encoder.encode(&QuerySpec::sync("SELECT 1")).is_ok());
        assert!(is_invalid(
            encoder.encode(&QuerySpec::sync("SELECT 1").with_format("csv"))
        ));
    }

    #[test]
    fn test_upload_encoding() {
        let spec = QuerySpec::asynchronous("SELECT * FROM TAP_UPLOAD.targets")
            .with_upload(UploadTable::votable("targets", b"<VOTABLE/>".to_vec()))
            .with_upload(UploadTable::new("extra_1", b"a,b\n".to_vec(), "text/csv"));

        let encoded = QueryEncoder::default().encode(&spec).unwrap();
        assert_eq!(
            encoded.param("UPLOAD"),
            Some("targets,param:targets;extra_1,param:extra_1")
        );
        assert!(encoded.is_multipart());

        match encoded.to_body() {
            RequestBody::Multipart { fields, files } => {
                assert!(fields.contains(&("UPLOAD".into(), "targets,param:targets;extra_1,param:extra_1".into())));
                assert_eq!(files.len(), 2);
                assert_eq!(files[0].name, "targets");
                assert_eq!(files[0].bytes, b"<VOTABLE/>".to_vec());
                assert_eq!(files[0].file_name, "targets.xml");
                assert_eq!(files[1].content_type, "text/csv");
                assert_eq!(files[1].file_name, "extra_1.csv");
            }
            other => panic!("expected multipart body, got {:?}", other),
        }
    }

    #[test]
    fn test_upload_extension_follows_content_type() {
        assert_eq!(extension("application/x-votable+xml"), "xml");
        assert_eq!(extension("text/xml; charset=utf-8"), "xml");
        assert_eq!(extension("TEXT/CSV"), "csv");
        assert_eq!(extension("application/json"), "json");
        assert_eq!(extension("application/fits"), "fits");
        assert_eq!(extension("application/octet-stream"), "dat");
    }

    #[test]
    fn test_rejects_bad_upload_names() {
        let encoder = QueryEncoder::default();
        for name in ["", "1table", "my table", "drop;"] {
            let spec = QuerySpec::sync("SELECT 1").with_upload(UploadTable::votable(name, vec![]));
            assert!(is_invalid(encoder.encode(&spec)), "{name:?}");
        }

        let duplicate = QuerySpec::sync("SELECT 1")
            .with_upload(UploadTable::votable("t", vec![]))
            .with_upload(UploadTable::votable("T", vec![]));
        assert!(is_invalid(encoder.encode(&duplicate)));
    }
}
