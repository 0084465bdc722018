//! Per-service protocol conventions
//!
//! TAP services agree on the job lifecycle but differ in small details: how
//! a job is aborted, extra phase words they emit, where the result lives.
//! A `TapDialect` captures those details so one job engine can drive every
//! service.

use tap_core::Phase;

use crate::transport::{HttpRequest, RequestBody};

/// How a running job is aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortStyle {
    /// `POST <jobURL>/phase` with `PHASE=ABORT`
    PhaseAbort,
    /// `DELETE <jobURL>`
    Delete,
}

/// URL layout and vocabulary of one TAP service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapDialect {
    sync_path: String,
    async_path: String,
    phase_suffix: String,
    result_suffix: String,
    abort_style: AbortStyle,
    phase_aliases: Vec<(String, Phase)>,
}

impl TapDialect {
    /// Conventions of the IVOA TAP/UWS recommendations
    pub fn standard() -> Self {
        Self {
            sync_path: "sync".to_string(),
            async_path: "async".to_string(),
            phase_suffix: "phase".to_string(),
            result_suffix: "results/result".to_string(),
            abort_style: AbortStyle::PhaseAbort,
            phase_aliases: Vec::new(),
        }
    }

    /// ESA Gaia archive: standard layout, abort through the phase resource
    pub fn gaia() -> Self {
        Self::standard().with_abort_style(AbortStyle::PhaseAbort)
    }

    /// CADC services: jobs are aborted by deleting them
    pub fn cadc() -> Self {
        Self::standard().with_abort_style(AbortStyle::Delete)
    }

    pub fn with_sync_path(mut self, path: impl Into<String>) -> Self {
        self.sync_path = trim_slashes(path.into());
        self
    }

    pub fn with_async_path(mut self, path: impl Into<String>) -> Self {
        self.async_path = trim_slashes(path.into());
        self
    }

    pub fn with_result_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.result_suffix = trim_slashes(suffix.into());
        self
    }

    pub fn with_abort_style(mut self, style: AbortStyle) -> Self {
        self.abort_style = style;
        self
    }

    /// Map a service-specific phase word onto a standard phase
    pub fn with_phase_alias(mut self, token: impl Into<String>, phase: Phase) -> Self {
        self.phase_aliases.push((token.into(), phase));
        self
    }

    pub fn abort_style(&self) -> AbortStyle {
        self.abort_style
    }

    pub fn sync_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url, self.sync_path)
    }

    pub fn async_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url, self.async_path)
    }

    pub fn job_url(&self, base_url: &str, job_id: &str) -> String {
        format!("{}/{}", self.async_url(base_url), job_id)
    }

    pub fn phase_url(&self, job_url: &str) -> String {
        format!("{}/{}", job_url.trim_end_matches('/'), self.phase_suffix)
    }

    pub fn result_url(&self, job_url: &str) -> String {
        format!("{}/{}", job_url.trim_end_matches('/'), self.result_suffix)
    }

    /// Map a phase token, trying aliases before the standard vocabulary
    ///
    /// Unrecognized tokens become `Phase::Unknown`.
    pub fn parse_phase(&self, token: &str) -> Phase {
        let token = token.trim();
        self.phase_aliases
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(token))
            .map(|(_, phase)| *phase)
            .unwrap_or_else(|| Phase::from_token(token))
    }

    /// Build the request that aborts the job at `job_url`
    pub fn abort_request(&self, job_url: &str) -> HttpRequest {
        match self.abort_style {
            AbortStyle::PhaseAbort => HttpRequest::post(
                self.phase_url(job_url),
                RequestBody::Form(vec![("PHASE".to_string(), "ABORT".to_string())]),
            ),
            AbortStyle::Delete => HttpRequest::delete(job_url),
        }
    }
}

impl Default for TapDialect {
    fn default() -> Self {
        Self::standard()
    }
}

fn trim_slashes(path: String) -> String {
    path.trim_matches('/').to_string()
}
