//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution mode of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    /// Single round-trip; the response body is the result
    Sync,
    /// Server-side job that is polled until it reaches a terminal phase
    Async,
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobMode::Sync => write!(f, "sync"),
            JobMode::Async => write!(f, "async"),
        }
    }
}

/// Lifecycle phase of a job
///
/// Terminal phases (`Completed`, `Error`, `Aborted`) are absorbing: once a
/// job reaches one of them no further transition is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Pending,
    Queued,
    Executing,
    Completed,
    Error,
    Aborted,
    Held,
    Suspended,
    Archived,
    Unknown,
}

impl Phase {
    /// All phases, in declaration order
    pub const ALL: [Phase; 10] = [
        Phase::Pending,
        Phase::Queued,
        Phase::Executing,
        Phase::Completed,
        Phase::Error,
        Phase::Aborted,
        Phase::Held,
        Phase::Suspended,
        Phase::Archived,
        Phase::Unknown,
    ];

    /// Check if this phase ends the job lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Error | Phase::Aborted)
    }

    /// Check if this phase means the server has parked the job
    pub fn is_parked(&self) -> bool {
        matches!(self, Phase::Held | Phase::Suspended)
    }

    /// Check if a transition from this phase to `target` is valid
    ///
    /// Non-terminal phases may move to any other phase, since a service can
    /// skip intermediate states between two polls. Terminal phases never move.
    pub fn can_transition_to(&self, target: Phase) -> bool {
        !self.is_terminal() && *self != target
    }

    /// The protocol token for this phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "PENDING",
            Phase::Queued => "QUEUED",
            Phase::Executing => "EXECUTING",
            Phase::Completed => "COMPLETED",
            Phase::Error => "ERROR",
            Phase::Aborted => "ABORTED",
            Phase::Held => "HELD",
            Phase::Suspended => "SUSPENDED",
            Phase::Archived => "ARCHIVED",
            Phase::Unknown => "UNKNOWN",
        }
    }

    /// Map a protocol token to a phase
    ///
    /// Matching ignores case and surrounding whitespace. Anything outside the
    /// standard vocabulary maps to `Unknown`.
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str().eq_ignore_ascii_case(token))
            .unwrap_or(Phase::Unknown)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who declared a job failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOrigin {
    /// The service reported the ERROR phase
    Server,
    /// The client gave up after repeated transport failures
    Local,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorOrigin::Server => write!(f, "server"),
            ErrorOrigin::Local => write!(f, "local"),
        }
    }
}

/// One entry of a job listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub phase: Phase,
    pub owner: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
}

/// Read-only snapshot of the jobs known to a service
///
/// Rebuilt on every listing request; never merged with live jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobList {
    jobs: Vec<JobSummary>,
}

impl JobList {
    pub fn new(jobs: Vec<JobSummary>) -> Self {
        Self { jobs }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobSummary> {
        self.jobs.iter()
    }

    /// Find a job summary by id
    pub fn get(&self, id: &str) -> Option<&JobSummary> {
        self.jobs.iter().find(|job| job.id == id)
    }

    /// Keep only the entries owned by `owner`
    ///
    /// Entries that carry no owner are kept, since older services never
    /// report one and have already filtered server-side.
    pub fn retain_owner(self, owner: &str) -> Self {
        let jobs = self
            .jobs
            .into_iter()
            .filter(|job| job.owner.as_deref().is_none_or(|o| o == owner))
            .collect();
        Self { jobs }
    }
}

impl IntoIterator for JobList {
    type Item = JobSummary;
    type IntoIter = std::vec::IntoIter<JobSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.into_iter()
    }
}
