//! ID resolver module
//!
//! Lets users name async jobs by an unambiguous prefix of their id. Services
//! assign long opaque ids, so prefixes are matched against the job list.

use anyhow::{Result, anyhow};
use tap_client::TapClient;
use tap_core::JobList;
use tracing::debug;

/// Resolve a job id or prefix to a full job id
///
/// An exact match wins. When the service does not allow listing jobs the
/// input is used as given.
///
/// # Errors
/// Returns an error if no listed job starts with the prefix, or if several do.
pub async fn resolve_job_id(client: &TapClient, id_or_prefix: &str) -> Result<String> {
    let jobs = match client.list_jobs(None).await {
        Ok(jobs) => jobs,
        Err(e) => {
            debug!(error = %e, "Job listing unavailable, using id as given");
            return Ok(id_or_prefix.to_string());
        }
    };

    match_prefix(&jobs, id_or_prefix)
}

fn match_prefix(jobs: &JobList, id_or_prefix: &str) -> Result<String> {
    if jobs.get(id_or_prefix).is_some() {
        return Ok(id_or_prefix.to_string());
    }

    let prefix = id_or_prefix.to_lowercase();
    let matches: Vec<_> = jobs
        .iter()
        .filter(|j| j.id.to_lowercase().starts_with(&prefix))
        .collect();

    match matches.len() {
        0 => Err(anyhow!("No job found with ID starting with '{}'", id_or_prefix)),
        1 => Ok(matches[0].id.clone()),
        _ => {
            let ids: Vec<&str> = matches.iter().map(|j| j.id.as_str()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple jobs: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tap_core::{JobSummary, Phase};

    fn jobs(ids: &[&str]) -> JobList {
        JobList::new(
            ids.iter()
                .map(|id| JobSummary {
                    id: id.to_string(),
                    phase: Phase::Completed,
                    owner: None,
                    creation_time: None,
                })
                .collect(),
        )
    }

    #[test]
    fn test_exact_and_unique_prefix() {
        let list = jobs(&["1700000001A", "1700000002B", "17"]);
        assert_eq!(match_prefix(&list, "17").unwrap(), "17");
        assert_eq!(match_prefix(&list, "1700000002").unwrap(), "1700000002B");
        assert_eq!(match_prefix(&list, "1700000001a").unwrap(), "1700000001A");
    }

    #[test]
    fn test_missing_and_ambiguous_prefix() {
        let list = jobs(&["1700000001A", "1700000002B"]);
        assert!(match_prefix(&list, "99").is_err());

        let err = match_prefix(&list, "1700").unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));
    }
}
