//! Job lifecycle operations

use backon::Retryable;
use reqwest::Url;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tap_core::{ErrorOrigin, JobList, JobMode, OutputFormat, Phase, QuerySpec, Table};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::TapClient;
use crate::backoff::Schedule;
use crate::error::{ResultFetchFailure, Result, TapError, snippet};
use crate::job::{Job, ResultLocation};
use crate::materialize::query_status_error;
use crate::transport::{HttpRequest, HttpResponse, TransportError};
use crate::uws;

/// Message of a server-side failure whose details could not be read
const SERVER_ERROR_FALLBACK: &str = "service reported ERROR";

impl TapClient {
    // =============================================================================
    // Submission
    // =============================================================================

    /// Submit a query
    ///
    /// A sync job comes back terminal: COMPLETED with its payload inline, or
    /// ERROR when the service answered with a `QUERY_STATUS=ERROR` document.
    /// An async job comes back QUEUED with the id taken from the job URL the
    /// service redirected to.
    ///
    /// # Errors
    /// - `TapError::InvalidQuery` if the query cannot be encoded (nothing is sent)
    /// - `TapError::Submission` on any status other than 2xx/3xx
    /// - `TapError::Transport` if the service could not be reached
    pub async fn submit(&self, spec: &QuerySpec) -> Result<Job> {
        let encoded = self.encoder.encode(spec)?;
        let mut job = Job::pending(spec.mode(), encoded.params().clone(), encoded.format());

        let url = match spec.mode() {
            JobMode::Sync => self.dialect.sync_url(&self.base_url),
            JobMode::Async => self.dialect.async_url(&self.base_url),
        };
        info!(mode = %spec.mode(), format = %encoded.format(), url = %url, "Submitting query");

        let request = HttpRequest::post(url.as_str(), encoded.to_body())
            .with_timeout(self.request_timeout);
        let response = self.transport.execute(request).await?;

        match spec.mode() {
            JobMode::Sync => self.finish_sync(&mut job, &url, response).await?,
            JobMode::Async => self.accept_async(&mut job, &url, response)?,
        }
        Ok(job)
    }

    async fn finish_sync(&self, job: &mut Job, url: &str, response: HttpResponse) -> Result<()> {
        // Some services redirect sync queries to where the result is written
        let response = if response.is_redirect() {
            let target = location(&response, url)?;
            debug!(location = %target, "Following sync redirect");
            let request = HttpRequest::get(target).with_timeout(self.request_timeout);
            self.transport.execute(request).await?
        } else {
            response
        };

        if !response.is_success() {
            return Err(TapError::submission(response.status, &response.body));
        }

        match query_status_error(&response.body) {
            Some(message) => job.fail(ErrorOrigin::Server, message),
            None => job.complete(ResultLocation::Inline(response.body)),
        };
        log_finished(job);
        Ok(())
    }

    fn accept_async(&self, job: &mut Job, url: &str, response: HttpResponse) -> Result<()> {
        if response.is_redirect() {
            let job_url = location(&response, url)?;
            let id = job_id_from_url(&job_url).ok_or_else(|| {
                TapError::Protocol(format!("cannot read a job id from '{}'", job_url))
            })?;
            job.accept(id, job_url);
        } else if response.is_success() {
            let info = uws::parse_job_info(&response.body).map_err(|e| {
                TapError::Protocol(format!("submission accepted without a job location: {}", e))
            })?;
            let job_url = self.dialect.job_url(&self.base_url, &info.id);
            job.accept(info.id, job_url);
        } else {
            return Err(TapError::submission(response.status, &response.body));
        }

        info!(job = %job.label(), "Job accepted");
        Ok(())
    }

    // =============================================================================
    // Polling
    // =============================================================================

    /// Ask the service for the current phase of a job
    ///
    /// Terminal and sync jobs are returned as they are, without a request.
    /// Transport failures are retried with the retry policy; when the budget
    /// runs out the job moves to ERROR with `ErrorOrigin::Local` and
    /// `TapError::Poll` is returned.
    ///
    /// # Errors
    /// - `TapError::Poll` after repeated transport failures
    /// - `TapError::Api` on an unexpected status; the job is left unchanged
    pub async fn poll(&self, job: &mut Job) -> Result<Phase> {
        if job.is_terminal() || job.mode() == JobMode::Sync {
            return Ok(job.phase());
        }
        let job_url = job
            .job_url()
            .ok_or_else(|| {
                TapError::Protocol(format!("job {} has no job URL", job.label()))
            })?
            .to_string();

        let request =
            HttpRequest::get(self.dialect.phase_url(&job_url)).with_timeout(self.request_timeout);
        let response = match self.execute_with_retry(request).await {
            Ok(response) => response,
            Err((attempts, source)) => {
                let job_id = job.label();
                error!(job = %job_id, attempts, error = %source, "Giving up on polling job");
                job.fail(
                    ErrorOrigin::Local,
                    format!("could not determine job phase: {}", source),
                );
                return Err(TapError::Poll {
                    job_id,
                    attempts,
                    source,
                });
            }
        };

        if !response.is_success() {
            return Err(TapError::api_error(response.status, snippet(&response.body)));
        }
        job.mark_polled();

        let token = response.text();
        let phase = self.dialect.parse_phase(&token);
        debug!(job = %job.label(), phase = %phase, "Polled job phase");

        match phase {
            Phase::Completed => {
                job.complete(ResultLocation::Remote(self.dialect.result_url(&job_url)));
            }
            Phase::Error => {
                let message = self.error_summary(&job_url).await;
                job.fail(ErrorOrigin::Server, message);
            }
            other => {
                if other.is_parked() || other == Phase::Unknown {
                    warn!(job = %job.label(), phase = %other, token = %token.trim(), "Job is not progressing");
                }
                job.advance(other);
            }
        }

        if job.is_terminal() {
            log_finished(job);
        }
        Ok(job.phase())
    }

    /// Best-effort read of the error message of a failed job
    async fn error_summary(&self, job_url: &str) -> String {
        let request = HttpRequest::get(job_url).with_timeout(self.request_timeout);
        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => uws::parse_job_info(&response.body)
                .ok()
                .and_then(|info| info.error_message)
                .unwrap_or_else(|| SERVER_ERROR_FALLBACK.to_string()),
            _ => SERVER_ERROR_FALLBACK.to_string(),
        }
    }

    /// Poll until the job is terminal or `timeout` elapses
    ///
    /// Pauses between polls follow the poll schedule, shortened so the
    /// deadline is never overshot. A poll still in flight at the deadline is
    /// cancelled; the job then keeps its last observed phase.
    ///
    /// # Errors
    /// - `TapError::Timeout` when the deadline passes; the job is not aborted
    /// - any error of `poll`
    pub async fn wait_until_done(&self, job: &mut Job, timeout: Duration) -> Result<Phase> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut polls = 0u32;
        let mut pauses = self.poll_schedule.delays();
        let mut pause = Duration::ZERO;

        loop {
            if job.is_terminal() {
                return Ok(job.phase());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out(job, started.elapsed()));
            }
            match tokio::time::timeout(remaining, self.poll(job)).await {
                Ok(result) => result?,
                Err(_) => return Err(timed_out(job, started.elapsed())),
            };
            polls += 1;

            if job.is_terminal() {
                debug!(job = %job.label(), polls, "Wait finished");
                return Ok(job.phase());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out(job, started.elapsed()));
            }
            pause = pauses.next().unwrap_or(pause);
            tokio::time::sleep(pause.min(remaining)).await;
        }
    }

    // =============================================================================
    // Results
    // =============================================================================

    /// Retrieve the raw result payload of a COMPLETED job
    ///
    /// Sync jobs return their inline payload without a request. Remote
    /// results are fetched with the retry policy; one redirect is followed.
    ///
    /// # Errors
    /// `TapError::ResultFetch` when the job is not COMPLETED (no request is
    /// made), on repeated transport failure, or on an unexpected status.
    pub async fn fetch_result(&self, job: &Job) -> Result<Vec<u8>> {
        let not_completed = || TapError::ResultFetch {
            job_id: job.label(),
            cause: ResultFetchFailure::NotCompleted { phase: job.phase() },
        };
        if job.phase() != Phase::Completed {
            return Err(not_completed());
        }

        let url = match job.result_location() {
            Some(ResultLocation::Inline(payload)) => return Ok(payload.clone()),
            Some(ResultLocation::Remote(url)) => url.clone(),
            None => return Err(not_completed()),
        };
        debug!(job = %job.label(), url = %url, "Fetching result");

        let mut response = self.fetch_with_retry(job, HttpRequest::get(url.as_str())).await?;
        if response.is_redirect() {
            let target = location(&response, &url)?;
            debug!(job = %job.label(), location = %target, "Following result redirect");
            response = self.fetch_with_retry(job, HttpRequest::get(target)).await?;
        }

        if !response.is_success() {
            return Err(TapError::ResultFetch {
                job_id: job.label(),
                cause: ResultFetchFailure::Status {
                    status: response.status,
                    body: snippet(&response.body),
                },
            });
        }

        info!(job = %job.label(), bytes = response.body.len(), "Fetched result");
        Ok(response.body)
    }

    async fn fetch_with_retry(&self, job: &Job, request: HttpRequest) -> Result<HttpResponse> {
        let request = request.with_timeout(self.request_timeout);
        self.execute_with_retry(request)
            .await
            .map_err(|(attempts, source)| TapError::ResultFetch {
                job_id: job.label(),
                cause: ResultFetchFailure::Transport { attempts, source },
            })
    }

    /// Read a result payload as a table in the job's output format
    pub fn materialize(&self, job: &Job, payload: Vec<u8>) -> Result<Table> {
        self.materializer.materialize(job.output_format(), payload)
    }

    /// Submit, wait, fetch and materialize in one call
    ///
    /// # Errors
    /// `TapError::JobFailed` when the job ends in ERROR or ABORTED, plus the
    /// errors of the individual steps.
    pub async fn query(&self, spec: &QuerySpec, timeout: Duration) -> Result<(Job, Table)> {
        let mut job = self.submit(spec).await?;
        if job.mode() == JobMode::Async {
            self.wait_until_done(&mut job, timeout).await?;
        }

        if job.phase() != Phase::Completed {
            return Err(TapError::JobFailed {
                job_id: job.label(),
                phase: job.phase(),
                message: job
                    .error_message()
                    .unwrap_or("job did not complete")
                    .to_string(),
            });
        }

        let payload = self.fetch_result(&job).await?;
        let table = self.materialize(&job, payload)?;
        Ok((job, table))
    }

    // =============================================================================
    // Cancellation and listing
    // =============================================================================

    /// Abort a job
    ///
    /// The job is marked ABORTED as soon as the service accepts the request.
    /// Aborting an ABORTED job is a no-op and sends nothing. A transport
    /// failure leaves the job unchanged.
    ///
    /// # Errors
    /// - `TapError::Abort` for COMPLETED or ERROR jobs, or if the service
    ///   refuses the request
    /// - `TapError::Transport` if the service could not be reached
    pub async fn abort(&self, job: &mut Job) -> Result<Phase> {
        let phase = job.phase();
        if phase == Phase::Aborted {
            return Ok(phase);
        }
        if phase.is_terminal() {
            return Err(TapError::Abort {
                job_id: job.label(),
                phase,
                message: "job has already finished".to_string(),
            });
        }
        let Some(job_url) = job.job_url().map(str::to_string) else {
            return Err(TapError::Abort {
                job_id: job.label(),
                phase,
                message: "job was never accepted by the service".to_string(),
            });
        };

        let request = self
            .dialect
            .abort_request(&job_url)
            .with_timeout(self.request_timeout);
        let response = self.transport.execute(request).await?;

        if !(response.is_success() || response.is_redirect()) {
            return Err(TapError::Abort {
                job_id: job.label(),
                phase,
                message: format!("status {}: {}", response.status, snippet(&response.body)),
            });
        }

        job.advance(Phase::Aborted);
        info!(job = %job.label(), "Job aborted");
        Ok(job.phase())
    }

    /// List the async jobs of the service, optionally for one owner
    ///
    /// Read-only: no existing `Job` is touched. With an owner, entries the
    /// service reports for other owners are dropped; entries without an
    /// owner are kept, since anonymous services do not report one.
    pub async fn list_jobs(&self, owner: Option<&str>) -> Result<JobList> {
        let mut request = HttpRequest::get(self.dialect.async_url(&self.base_url))
            .with_timeout(self.request_timeout);
        if let Some(owner) = owner {
            request = request.with_query("owner", owner);
        }

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(TapError::api_error(response.status, snippet(&response.body)));
        }

        let list =
            uws::parse_job_list(&response.body, &self.dialect).map_err(TapError::Protocol)?;
        debug!(jobs = list.len(), "Listed jobs");

        // Not every service filters by owner
        Ok(match owner {
            Some(owner) => list.retain_owner(owner),
            None => list,
        })
    }

    /// Rebuild a `Job` for an async job that already exists on the service
    ///
    /// Reads the job document once; nothing is submitted.
    pub async fn attach(&self, job_id: &str) -> Result<Job> {
        let job_url = self.dialect.job_url(&self.base_url, job_id);
        let request = HttpRequest::get(job_url.as_str()).with_timeout(self.request_timeout);
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(TapError::api_error(response.status, snippet(&response.body)));
        }

        let info = uws::parse_job_info(&response.body).map_err(TapError::Protocol)?;
        let phase = self.dialect.parse_phase(&info.phase_token);
        let format = info
            .parameters
            .get("FORMAT")
            .and_then(|token| OutputFormat::from_token(token))
            .unwrap_or_default();
        let result_url = info
            .result_href()
            .map(str::to_string)
            .unwrap_or_else(|| self.dialect.result_url(&job_url));

        let mut job = Job::attached(
            info.id,
            job_url,
            info.parameters,
            format,
            info.creation_time,
        );
        match phase {
            Phase::Pending => {}
            Phase::Completed => {
                job.complete(ResultLocation::Remote(result_url));
            }
            Phase::Error => {
                let message = info
                    .error_message
                    .unwrap_or_else(|| SERVER_ERROR_FALLBACK.to_string());
                job.fail(ErrorOrigin::Server, message);
            }
            other => {
                job.advance(other);
            }
        }
        job.mark_polled();

        info!(job = %job.label(), phase = %job.phase(), "Attached to job");
        Ok(job)
    }

    // =============================================================================
    // Retry
    // =============================================================================

    /// Execute a request, retrying transient failures and 5xx answers
    ///
    /// Returns the number of attempts made alongside the last failure.
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<HttpResponse, (u32, TransportError)> {
        let attempts = AtomicU32::new(0);
        let transport = &self.transport;
        let counter = &attempts;
        let sent = &request;

        let outcome = (|| async move {
            counter.fetch_add(1, Ordering::Relaxed);
            match transport.execute(sent.clone()).await {
                Ok(response) if response.is_server_error() => {
                    Err(TransportError::ServerStatus(response.status))
                }
                other => other,
            }
        })
        .retry(Schedule::of(self.retry.as_ref()))
        .when(TransportError::is_transient)
        .notify(|err, dur| {
            warn!(
                url = %request.url,
                error = %err,
                "Request failed. Retrying in {:.1}s",
                dur.as_secs_f32()
            );
        })
        .await;

        let attempts = attempts.load(Ordering::Relaxed);
        match outcome {
            Ok(response) => {
                if attempts > 1 {
                    debug!(url = %request.url, attempts, "Request succeeded after retry");
                }
                Ok(response)
            }
            Err(e) => Err((attempts, e)),
        }
    }
}

/// Absolute target of a redirect, resolved against the request URL
fn location(response: &HttpResponse, request_url: &str) -> Result<String> {
    let raw = response.header("location").ok_or_else(|| {
        TapError::Protocol(format!("status {} without a Location header", response.status))
    })?;

    Url::parse(request_url)
        .and_then(|base| base.join(raw.trim()))
        .map(String::from)
        .map_err(|e| TapError::Protocol(format!("invalid Location '{}': {}", raw, e)))
}

/// Last non-empty path segment of a job URL
fn job_id_from_url(job_url: &str) -> Option<String> {
    Url::parse(job_url)
        .ok()?
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
}

fn timed_out(job: &Job, waited: Duration) -> TapError {
    warn!(job = %job.label(), phase = %job.phase(), "Timed out waiting for job");
    TapError::Timeout {
        job_id: job.label(),
        last_phase: job.phase(),
        waited,
    }
}

fn log_finished(job: &Job) {
    match job.error() {
        Some(failure) => info!(
            job = %job.label(),
            phase = %job.phase(),
            origin = ?failure.origin,
            message = %failure.message,
            "Job finished"
        ),
        None => info!(job = %job.label(), phase = %job.phase(), "Job finished"),
    }
}
