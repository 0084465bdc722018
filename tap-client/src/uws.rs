//! UWS documents
//!
//! Readers for the two XML documents of the Universal Worker Service
//! pattern that TAP async endpoints expose: the job list (`GET /async`) and
//! the job description (`GET /async/<id>`).

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use tap_core::{JobList, JobSummary, Phase};

use crate::dialect::TapDialect;
use crate::xml::{Node, attribute, walk};

/// Job description document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobInfo {
    pub id: String,
    pub phase_token: String,
    pub owner: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub parameters: BTreeMap<String, String>,
    /// `(id, href)` of every listed result
    pub results: Vec<(String, String)>,
    pub error_message: Option<String>,
}

impl JobInfo {
    /// Link of the result named `result`, or of the first result
    pub fn result_href(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|(id, _)| id == "result")
            .or_else(|| self.results.first())
            .map(|(_, href)| href.as_str())
    }
}

/// Read a UWS job list
pub fn parse_job_list(document: &[u8], dialect: &TapDialect) -> Result<JobList, String> {
    let mut jobs = Vec::new();
    let mut current: Option<JobSummary> = None;
    let mut element = String::new();

    walk(document, |node| {
        match node {
            Node::Open { name, attributes } => {
                if name == "jobref" {
                    let id = attribute(&attributes, "id")
                        .ok_or_else(|| "jobref without id attribute".to_string())?;
                    current = Some(JobSummary {
                        id: id.to_string(),
                        phase: Phase::Unknown,
                        owner: None,
                        creation_time: None,
                    });
                }
                element = name;
            }
            Node::Text(text) => {
                if let Some(job) = current.as_mut() {
                    match element.as_str() {
                        "phase" => job.phase = dialect.parse_phase(&text),
                        "ownerId" => job.owner = Some(text),
                        "creationTime" => job.creation_time = parse_time(&text),
                        _ => {}
                    }
                }
            }
            Node::Close(name) => {
                if name == "jobref" {
                    if let Some(job) = current.take() {
                        jobs.push(job);
                    }
                }
                element.clear();
            }
        }
        Ok(())
    })?;

    Ok(JobList::new(jobs))
}

/// Read a UWS job description
pub fn parse_job_info(document: &[u8]) -> Result<JobInfo, String> {
    let mut info = JobInfo::default();
    let mut stack: Vec<String> = Vec::new();
    let mut parameter: Option<String> = None;
    let mut saw_job = false;

    walk(document, |node| {
        match node {
            Node::Open { name, attributes } => {
                match name.as_str() {
                    "job" => saw_job = true,
                    "parameter" => {
                        let id = attribute(&attributes, "id").unwrap_or_default();
                        parameter = Some(id.to_ascii_uppercase());
                    }
                    "result" => {
                        if let Some(href) = attribute(&attributes, "href") {
                            let id = attribute(&attributes, "id").unwrap_or("result");
                            info.results.push((id.to_string(), href.to_string()));
                        }
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Node::Text(text) => {
                let current = stack.last().map(String::as_str);
                let parent = stack.iter().rev().nth(1).map(String::as_str);
                match (parent, current) {
                    (Some("job"), Some("jobId")) => info.id = text,
                    (Some("job"), Some("phase")) => info.phase_token = text,
                    (Some("job"), Some("ownerId")) => info.owner = Some(text),
                    (Some("job"), Some("creationTime")) => info.creation_time = parse_time(&text),
                    (Some("errorSummary"), Some("message")) => info.error_message = Some(text),
                    (_, Some("parameter")) => {
                        if let Some(key) = parameter.as_ref() {
                            info.parameters.insert(key.clone(), text);
                        }
                    }
                    _ => {}
                }
            }
            Node::Close(name) => {
                if name == "parameter" {
                    parameter = None;
                }
                stack.pop();
            }
        }
        Ok(())
    })?;

    if !saw_job {
        return Err("document is not a UWS job".to_string());
    }
    if info.id.is_empty() {
        return Err("job document has no jobId".to_string());
    }
    Ok(info)
}

/// Parse a UWS timestamp; zone-less values are taken as UTC
fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|t| t.and_utc())
        })
}
