//! TAP CLI
//!
//! Command-line interface for querying Table Access Protocol services.

mod commands;
mod config;
mod id_resolver;
mod output;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tap")]
#[command(about = "Table Access Protocol query client", long_about = None)]
struct Cli {
    /// TAP service base URL
    #[arg(long, env = "TAP_URL")]
    url: String,

    /// Timeout of each HTTP request, in seconds
    #[arg(long, env = "TAP_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Output format used when a command does not pick one
    #[arg(long, env = "TAP_FORMAT", default_value = "votable")]
    default_format: String,

    /// Attempts per request when polling or fetching results
    #[arg(long, env = "TAP_MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,

    /// Print jobs and listings as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tap_client=info,tap_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        base_url: cli.url,
        timeout_secs: cli.timeout,
        default_format: cli.default_format,
        max_retries: cli.max_retries,
        json: cli.json,
    };

    handle_command(cli.command, &config).await
}
