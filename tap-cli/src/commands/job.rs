//! Job command handlers
//!
//! Handles async job commands: status, waiting, aborting, results and
//! listing. Job ids may be given as unambiguous prefixes.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use std::path::PathBuf;
use std::time::Duration;
use tap_client::TapClient;

use super::query::{show_result, wait_for};
use crate::config::Config;
use crate::id_resolver::resolve_job_id;
use crate::output::{print_job_details, print_job_summary, print_json};

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Show the current phase of a job
    Status {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Wait until a job finishes
    Wait {
        /// Job ID or unambiguous prefix
        id: String,

        /// Seconds to wait before giving up
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },
    /// Abort a job
    Abort {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Print or save the result of a completed job
    Results {
        /// Job ID or unambiguous prefix
        id: String,

        /// Write the raw result to a file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rows to print
        #[arg(long, default_value_t = 20)]
        rows: usize,
    },
    /// List jobs
    List {
        /// Only jobs of this owner
        #[arg(long)]
        owner: Option<String>,
    },
}

/// Handle job commands
///
/// Routes job subcommands to their respective handlers.
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = config.client()?;

    match command {
        JobCommands::Status { id } => job_status(&client, &id, config.json).await,
        JobCommands::Wait { id, timeout } => wait_job(&client, &id, timeout, config.json).await,
        JobCommands::Abort { id } => abort_job(&client, &id, config.json).await,
        JobCommands::Results { id, output, rows } => {
            let id = resolve_job_id(&client, &id).await?;
            let job = client
                .attach(&id)
                .await
                .with_context(|| format!("Failed to read job {}", id))?;
            show_result(&client, &job, output.as_deref(), rows, config.json).await
        }
        JobCommands::List { owner } => list_jobs(&client, owner.as_deref(), config.json).await,
    }
}

/// Get and display a single job
async fn job_status(client: &TapClient, id: &str, json: bool) -> Result<()> {
    let id = resolve_job_id(client, id).await?;
    let job = client
        .attach(&id)
        .await
        .with_context(|| format!("Failed to read job {}", id))?;

    if json {
        print_json(&job)
    } else {
        print_job_details(&job);
        Ok(())
    }
}

async fn wait_job(client: &TapClient, id: &str, timeout: u64, json: bool) -> Result<()> {
    let id = resolve_job_id(client, id).await?;
    let mut job = client
        .attach(&id)
        .await
        .with_context(|| format!("Failed to read job {}", id))?;

    wait_for(client, &mut job, Duration::from_secs(timeout)).await?;

    if json {
        print_json(&job)
    } else {
        print_job_details(&job);
        Ok(())
    }
}

async fn abort_job(client: &TapClient, id: &str, json: bool) -> Result<()> {
    let id = resolve_job_id(client, id).await?;
    let mut job = client
        .attach(&id)
        .await
        .with_context(|| format!("Failed to read job {}", id))?;

    client
        .abort(&mut job)
        .await
        .with_context(|| format!("Failed to abort job {}", id))?;

    if json {
        print_json(&job)
    } else {
        println!("{} {}", "✓ Aborted job".green(), job.label().cyan());
        Ok(())
    }
}

/// List jobs, optionally for one owner
async fn list_jobs(client: &TapClient, owner: Option<&str>, json: bool) -> Result<()> {
    let jobs = client
        .list_jobs(owner)
        .await
        .context("Failed to list jobs")?;

    if json {
        return print_json(&jobs);
    }

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in jobs.iter() {
            print_job_summary(job);
        }
    }

    Ok(())
}
