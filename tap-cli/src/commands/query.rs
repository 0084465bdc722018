//! Query command handler
//!
//! Submits a query, waits for async jobs and prints or saves the result.

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use colored::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tap_client::{Job, TapClient, TapError};
use tap_core::{JobMode, Phase, QuerySpec, UploadTable};

use crate::config::Config;
use crate::output::{print_job_details, print_json, print_table};

/// Arguments of `tap query`
#[derive(Args)]
pub struct QueryArgs {
    /// ADQL query text
    pub adql: String,

    /// Run as a synchronous query instead of an async job
    #[arg(long)]
    pub sync: bool,

    /// Output format (votable, csv, json, fits)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Upload a VOTable as name=path; reference it as TAP_UPLOAD.name
    #[arg(short, long, value_parser = parse_key_val)]
    pub upload: Vec<(String, String)>,

    /// Job name shown by the service
    #[arg(long)]
    pub job_name: Option<String>,

    /// Maximum number of rows the service should return
    #[arg(long)]
    pub maxrec: Option<u64>,

    /// Seconds to wait for an async job before giving up
    #[arg(long, default_value_t = 600)]
    pub wait: u64,

    /// Write the raw result to a file instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Rows to print
    #[arg(long, default_value_t = 20)]
    pub rows: usize,
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow!("invalid NAME=path: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Handle `tap query`
pub async fn handle_query(args: QueryArgs, config: &Config) -> Result<()> {
    let client = config.client()?;

    let mode = if args.sync {
        JobMode::Sync
    } else {
        JobMode::Async
    };
    let format = args
        .format
        .unwrap_or_else(|| config.default_format.clone());

    let mut spec = QuerySpec::new(args.adql, mode).with_format(format);
    for (name, path) in args.upload {
        let payload = std::fs::read(&path)
            .with_context(|| format!("Failed to read upload file: {}", path))?;
        spec = spec.with_upload(UploadTable::votable(name, payload));
    }
    if let Some(name) = args.job_name {
        spec = spec.with_job_name(name);
    }
    if let Some(max_rec) = args.maxrec {
        spec = spec.with_max_rec(max_rec);
    }

    let mut job = client.submit(&spec).await.context("Failed to submit query")?;
    if !config.json {
        eprintln!("{} {}", "✓ Submitted job".green(), job.label().cyan());
    }

    if job.mode() == JobMode::Async {
        wait_for(&client, &mut job, Duration::from_secs(args.wait)).await?;
    }

    show_result(
        &client,
        &job,
        args.output.as_deref(),
        args.rows,
        config.json,
    )
    .await
}

/// Wait for a job, pointing at `tap job wait` when the deadline passes
pub(super) async fn wait_for(client: &TapClient, job: &mut Job, timeout: Duration) -> Result<()> {
    match client.wait_until_done(job, timeout).await {
        Ok(_) => Ok(()),
        Err(e @ TapError::Timeout { .. }) => {
            eprintln!(
                "{}",
                format!(
                    "Job {} is still running; resume with `tap job wait {}` or stop it with `tap job abort {}`",
                    job.label(),
                    job.label(),
                    job.label()
                )
                .yellow()
            );
            Err(e.into())
        }
        Err(e) => Err(e).context("Failed while waiting for job"),
    }
}

/// Fetch and print (or save) the result of a finished job
pub(super) async fn show_result(
    client: &TapClient,
    job: &Job,
    output: Option<&Path>,
    rows: usize,
    json: bool,
) -> Result<()> {
    if job.phase() != Phase::Completed {
        if json {
            print_json(job)?;
        } else {
            print_job_details(job);
        }
        bail!(
            "Job {} ended in phase {}{}",
            job.label(),
            job.phase(),
            job.error_message()
                .map(|m| format!(": {}", m))
                .unwrap_or_default()
        );
    }

    let payload = client
        .fetch_result(job)
        .await
        .context("Failed to fetch result")?;

    if let Some(path) = output {
        std::fs::write(path, &payload)
            .with_context(|| format!("Failed to write result to {}", path.display()))?;
        if !json {
            eprintln!(
                "{} {} bytes to {}",
                "✓ Wrote".green(),
                payload.len(),
                path.display()
            );
        }
        return Ok(());
    }

    let table = client
        .materialize(job, payload)
        .context("Failed to read result table")?;

    if json {
        print_json(&json!({ "job": job, "table": table }))
    } else {
        print_table(&table, rows);
        Ok(())
    }
}
