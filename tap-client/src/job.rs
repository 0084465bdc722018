//! Job entity and state machine
//!
//! A `Job` is one query execution. Callers read it; only the job engine in
//! this crate moves it between phases, and only along valid transitions:
//!
//! ```text
//! PENDING -> QUEUED -> EXECUTING -> COMPLETED | ERROR | ABORTED
//!              \-> HELD | SUSPENDED | UNKNOWN -/   (non-terminal, polled again)
//! ```
//!
//! Synchronous jobs jump from PENDING straight to COMPLETED or ERROR.
//! Terminal phases are absorbing.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use tap_core::{ErrorOrigin, JobMode, OutputFormat, Phase};
use tracing::debug;
use uuid::Uuid;

/// Where the result of a completed job can be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultLocation {
    /// URL of the result resource of an async job
    Remote(String),
    /// Payload of a sync job, already received
    Inline(Vec<u8>),
}

// Inline payloads serialize as their size only
impl Serialize for ResultLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResultLocation::Remote(url) => {
                serializer.serialize_newtype_variant("ResultLocation", 0, "remote", url)
            }
            ResultLocation::Inline(bytes) => {
                serializer.serialize_newtype_variant("ResultLocation", 1, "inline", &bytes.len())
            }
        }
    }
}

/// Failure details of a job in the ERROR phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobError {
    pub origin: ErrorOrigin,
    pub message: String,
}

/// One query execution
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    local_id: Uuid,
    id: Option<String>,
    mode: JobMode,
    phase: Phase,
    job_url: Option<String>,
    result_location: Option<ResultLocation>,
    parameters: BTreeMap<String, String>,
    output_format: OutputFormat,
    created_at: DateTime<Utc>,
    last_polled_at: Option<DateTime<Utc>>,
    error: Option<JobError>,
}

impl Job {
    /// A job that exists locally but has not been accepted by a service
    pub(crate) fn pending(
        mode: JobMode,
        parameters: BTreeMap<String, String>,
        output_format: OutputFormat,
    ) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            id: None,
            mode,
            phase: Phase::Pending,
            job_url: None,
            result_location: None,
            parameters,
            output_format,
            created_at: Utc::now(),
            last_polled_at: None,
            error: None,
        }
    }

    /// Rebuild an async job that already exists on a service
    pub(crate) fn attached(
        id: String,
        job_url: String,
        parameters: BTreeMap<String, String>,
        output_format: OutputFormat,
        created_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut job = Self::pending(JobMode::Async, parameters, output_format);
        job.id = Some(id);
        job.job_url = Some(job_url);
        if let Some(created_at) = created_at {
            job.created_at = created_at;
        }
        job
    }

    /// Client-side handle, unique per `Job` value
    pub fn local_id(&self) -> Uuid {
        self.local_id
    }

    /// Server-assigned identifier; set only for accepted async jobs
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Identifier for messages: the server id, or the local handle
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("local-{}", self.local_id),
        }
    }

    pub fn mode(&self) -> JobMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn job_url(&self) -> Option<&str> {
        self.job_url.as_deref()
    }

    /// Set if and only if the job is COMPLETED
    pub fn result_location(&self) -> Option<&ResultLocation> {
        self.result_location.as_ref()
    }

    /// Protocol parameters the job was submitted with
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_polled_at(&self) -> Option<DateTime<Utc>> {
        self.last_polled_at
    }

    /// Set if and only if the job is in the ERROR phase
    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    // State transitions, driven by the job engine

    fn transition(&mut self, target: Phase) -> bool {
        if !self.phase.can_transition_to(target) {
            return false;
        }
        debug!(job = %self.label(), from = %self.phase, to = %target, "Phase transition");
        self.phase = target;
        true
    }

    /// The service accepted an async submission
    pub(crate) fn accept(&mut self, id: String, job_url: String) -> bool {
        if self.phase != Phase::Pending {
            return false;
        }
        self.id = Some(id);
        self.job_url = Some(job_url);
        self.transition(Phase::Queued)
    }

    /// Record a non-terminal phase or ABORTED as reported by the service
    ///
    /// COMPLETED and ERROR carry data and go through `complete` and `fail`.
    pub(crate) fn advance(&mut self, phase: Phase) -> bool {
        if matches!(phase, Phase::Completed | Phase::Error) {
            return false;
        }
        self.transition(phase)
    }

    pub(crate) fn complete(&mut self, location: ResultLocation) -> bool {
        if !self.transition(Phase::Completed) {
            return false;
        }
        self.result_location = Some(location);
        true
    }

    pub(crate) fn fail(&mut self, origin: ErrorOrigin, message: impl Into<String>) -> bool {
        if !self.transition(Phase::Error) {
            return false;
        }
        self.error = Some(JobError {
            origin,
            message: message.into(),
        });
        true
    }

    pub(crate) fn mark_polled(&mut self) {
        self.last_polled_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn async_job() -> Job {
        let mut job = Job::pending(JobMode::Async, BTreeMap::new(), OutputFormat::VoTable);
        assert!(job.accept("12345".into(), "http://test/async/12345".into()));
        job
    }

    #[test]
    fn test_pending_job_has_no_id_or_result() {
        let job = Job::pending(JobMode::Sync, BTreeMap::new(), OutputFormat::Csv);
        assert_eq!(job.phase(), Phase::Pending);
        assert!(job.id().is_none());
        assert!(job.result_location().is_none());
        assert!(job.error().is_none());
        assert!(job.label().starts_with("local-"));
    }

    #[test]
    fn test_accept_sets_id_and_queues() {
        let job = async_job();
        assert_eq!(job.phase(), Phase::Queued);
        assert_eq!(job.id(), Some("12345"));
        assert_eq!(job.job_url(), Some("http://test/async/12345"));
        assert_eq!(job.label(), "12345");
    }

    #[test]
    fn test_accept_only_from_pending() {
        let mut job = async_job();
        assert!(!job.accept("other".into(), "http://test/async/other".into()));
        assert_eq!(job.id(), Some("12345"));
    }

    #[test]
    fn test_result_location_only_when_completed() {
        let mut job = async_job();
        assert!(job.advance(Phase::Executing));
        assert!(job.result_location().is_none());

        assert!(job.complete(ResultLocation::Remote("http://test/r".into())));
        assert_eq!(job.phase(), Phase::Completed);
        assert_eq!(
            job.result_location(),
            Some(&ResultLocation::Remote("http://test/r".into()))
        );
    }

    #[test]
    fn test_terminal_phases_are_absorbing() {
        let mut job = async_job();
        assert!(job.complete(ResultLocation::Remote("http://test/r".into())));

        assert!(!job.advance(Phase::Executing));
        assert!(!job.fail(ErrorOrigin::Server, "late"));
        assert!(!job.advance(Phase::Aborted));
        assert_eq!(job.phase(), Phase::Completed);
        assert!(job.error().is_none());
    }

    #[test]
    fn test_fail_records_origin() {
        let mut job = async_job();
        assert!(job.fail(ErrorOrigin::Local, "network down"));
        assert_eq!(job.phase(), Phase::Error);
        assert_eq!(job.error().unwrap().origin, ErrorOrigin::Local);
        assert_eq!(job.error_message(), Some("network down"));
        assert!(job.result_location().is_none());
    }

    #[test]
    fn test_advance_refuses_data_carrying_phases() {
        let mut job = async_job();
        assert!(!job.advance(Phase::Completed));
        assert!(!job.advance(Phase::Error));
        assert_eq!(job.phase(), Phase::Queued);
    }

    #[test]
    fn test_parked_phases_keep_job_alive() {
        let mut job = async_job();
        assert!(job.advance(Phase::Held));
        assert!(job.advance(Phase::Executing));
        assert!(job.advance(Phase::Suspended));
        assert!(!job.is_terminal());
        assert!(job.advance(Phase::Aborted));
        assert!(job.is_terminal());
    }

    #[test]
    fn test_attached_job_keeps_server_identity() {
        let job = Job::attached(
            "99".into(),
            "http://test/async/99".into(),
            BTreeMap::new(),
            OutputFormat::Json,
            None,
        );
        assert_eq!(job.mode(), JobMode::Async);
        assert_eq!(job.id(), Some("99"));
        assert_eq!(job.phase(), Phase::Pending);
    }
}
