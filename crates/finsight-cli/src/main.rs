//! Finsight CLI - Personal finance analytics
//!
//! Usage:
//!   finsight analyze --file CSV   Analyze a transaction export
//!   finsight seed                 Show the sample report
//!   finsight config --check       Validate the analytics config
//!   finsight serve --port 3000    Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Analyze { file, json } => commands::cmd_analyze(config, &file, json),
        Commands::Seed { json } => commands::cmd_seed(config, json),
        Commands::Config { check } => commands::cmd_config(config, check),
        Commands::Serve {
            port,
            host,
            allowed_origins,
        } => commands::cmd_serve(config, &host, port, allowed_origins).await,
    }
}
