//! Cone search command handler

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::path::PathBuf;
use std::time::Duration;
use tap_client::ConeQuery;
use tap_core::JobMode;

use super::query::{show_result, wait_for};
use crate::config::Config;

/// Arguments of `tap cone`
#[derive(Args)]
pub struct ConeArgs {
    /// Table to search
    #[arg(long)]
    pub table: String,

    /// Right ascension of the centre, degrees
    #[arg(long)]
    pub ra: f64,

    /// Declination of the centre, degrees
    #[arg(long, allow_negative_numbers = true)]
    pub dec: f64,

    /// Search radius, degrees
    #[arg(long)]
    pub radius: f64,

    #[arg(long, default_value = "ra")]
    pub ra_column: String,

    #[arg(long, default_value = "dec")]
    pub dec_column: String,

    /// Return at most this many rows
    #[arg(long)]
    pub top: Option<u64>,

    /// Run as an async job
    #[arg(long = "async")]
    pub run_async: bool,

    /// Seconds to wait for an async job
    #[arg(long, default_value_t = 600)]
    pub wait: u64,

    /// Write the raw result to a file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Rows to print
    #[arg(long, default_value_t = 20)]
    pub rows: usize,
}

/// Handle `tap cone`
pub async fn handle_cone(args: ConeArgs, config: &Config) -> Result<()> {
    let client = config.client()?;

    let mut cone = ConeQuery::new(&args.table, args.ra, args.dec, args.radius)
        .with_position_columns(&args.ra_column, &args.dec_column);
    if let Some(top) = args.top {
        cone = cone.with_top(top);
    }
    if args.run_async {
        cone = cone.with_mode(JobMode::Async);
    }

    let spec = cone
        .to_spec()?
        .with_format(client.default_format().token());
    let mut job = client
        .submit(&spec)
        .await
        .context("Failed to submit cone search")?;
    if !config.json {
        eprintln!(
            "{} {} around ({}, {}) r={}",
            "✓ Cone search on".green(),
            args.table.cyan(),
            args.ra,
            args.dec,
            args.radius
        );
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
