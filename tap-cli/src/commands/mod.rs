//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod cone;
mod job;
mod query;
mod tables;

pub use cone::ConeArgs;
pub use job::JobCommands;
pub use query::QueryArgs;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run an ADQL query and print its result
    Query(QueryArgs),
    /// Async job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Search a table around a sky position
    Cone(ConeArgs),
    /// List published tables, or the columns of one table
    Tables {
        /// Table name, with or without schema prefix
        table: Option<String>,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Query(args) => query::handle_query(args, config).await,
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Cone(args) => cone::handle_cone(args, config).await,
        Commands::Tables { table } => tables::handle_tables(table, config).await,
    }
}
