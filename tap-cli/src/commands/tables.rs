//! Tables command handler

use anyhow::{Context, Result, anyhow};
use colored::*;
use tap_client::MetadataCache;
use tap_core::TableMeta;

use crate::config::Config;
use crate::output::print_json;

/// Handle `tap tables`
pub async fn handle_tables(table: Option<String>, config: &Config) -> Result<()> {
    let client = config.client()?;
    let mut cache = MetadataCache::new();

    match table {
        Some(name) => {
            let table = cache
                .table(&client, &name)
                .await
                .context("Failed to read table metadata")?
                .ok_or_else(|| anyhow!("No table named '{}'", name))?;

            if config.json {
                print_json(table)
            } else {
                print_table_details(table);
                Ok(())
            }
        }
        None => {
            let tables = cache
                .get_or_fetch(&client)
                .await
                .context("Failed to read table metadata")?;

            if config.json {
                return print_json(&tables);
            }
            if tables.is_empty() {
                println!("{}", "No tables published.".yellow());
            } else {
                println!("{}", format!("Found {} table(s):", tables.len()).bold());
                for table in tables {
                    println!(
                        "  {} {} {}",
                        "▸".cyan(),
                        table.qualified_name(),
                        format!("({} columns)", table.columns.len()).dimmed()
                    );
                }
            }
            Ok(())
        }
    }
}

fn print_table_details(table: &TableMeta) {
    println!("{}", table.qualified_name().bold());
    if let Some(description) = &table.description {
        println!("  {}", description.dimmed());
    }
    println!();
    for column in &table.columns {
        println!(
            "  {:<32} {:<10} {:<8} {}",
            column.name.cyan(),
            column.datatype.as_deref().unwrap_or("-"),
            column.unit.as_deref().unwrap_or(""),
            column.description.as_deref().unwrap_or("").dimmed()
        );
    }
}
