//! Terminal output helpers shared by the command handlers

use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use tap_client::{Job, ResultLocation};
use tap_core::{JobSummary, Phase, Table};

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

/// Colorize a job phase for display
pub fn colorize_phase(phase: Phase) -> ColoredString {
    let text = phase.as_str();
    match phase {
        Phase::Pending | Phase::Queued => text.yellow(),
        Phase::Executing => text.cyan(),
        Phase::Completed => text.green(),
        Phase::Error => text.red(),
        Phase::Aborted | Phase::Archived => text.dimmed(),
        Phase::Held | Phase::Suspended | Phase::Unknown => text.magenta(),
    }
}

/// Print detailed job information
pub fn print_job_details(job: &Job) {
    println!("{}", "Job Details:".bold());
    println!("  ID:        {}", job.label().cyan());
    println!("  Mode:      {}", job.mode());
    println!("  Phase:     {}", colorize_phase(job.phase()));
    println!("  Format:    {}", job.output_format());
    println!(
        "  Created:   {}",
        job.created_at().format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(polled) = job.last_polled_at() {
        println!("  Polled:    {}", polled.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(url) = job.job_url() {
        println!("  URL:       {}", url.dimmed());
    }

    match job.result_location() {
        Some(ResultLocation::Remote(url)) => println!("  Result:    {}", url),
        Some(ResultLocation::Inline(payload)) => {
            println!("  Result:    {} bytes received", payload.len())
        }
        None => {}
    }

    if let Some(error) = job.error() {
        println!("\n{}", "Error:".bold());
        println!("  Origin:    {:?}", error.origin);
        println!("  {}", error.message.red());
    }

    if let Some(query) = job.parameters().get("QUERY") {
        println!("\n{}", "Query:".bold());
        println!("  {}", query);
    }
}

/// Print one entry of a job listing
pub fn print_job_summary(job: &JobSummary) {
    println!("  {} Job {}", "▸".cyan(), job.id.dimmed());
    println!("    Phase:   {}", colorize_phase(job.phase));
    if let Some(owner) = &job.owner {
        println!("    Owner:   {}", owner);
    }
    if let Some(created) = job.creation_time {
        println!(
            "    Created: {}",
            created.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    println!();
}

/// Print a table with aligned columns, at most `max_rows` rows
pub fn print_table(table: &Table, max_rows: usize) {
    let names = table.column_names();
    let shown = &table.rows()[..table.len().min(max_rows)];

    let widths: Vec<usize> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            shown
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = names
        .iter()
        .zip(&widths)
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect();
    println!("{}", header.join("  ").bold());

    for row in shown {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        println!("{}", cells.join("  "));
    }

    if table.len() > shown.len() {
        println!(
            "{}",
            format!("... {} more row(s)", table.len() - shown.len()).dimmed()
        );
    }
    println!(
        "{}",
        format!("{} row(s), {} column(s)", table.len(), names.len()).dimmed()
    );
}
