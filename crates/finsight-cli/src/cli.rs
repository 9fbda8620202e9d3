//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Finsight - Cash-flow analytics for your transaction history
#[derive(Parser)]
#[command(name = "finsight")]
#[command(about = "Personal finance analytics: cash flow, risk, anomalies and forecasts", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Analytics config file (defaults to the data-dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a transaction CSV and print the report
    Analyze {
        /// CSV file with date, description, amount and optional category columns
        #[arg(short, long)]
        file: PathBuf,

        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the report for the built-in sample data
    Seed {
        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Only validate the configuration
        #[arg(long)]
        check: bool,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Allowed CORS origin (repeatable)
        #[arg(long = "allow-origin")]
        allowed_origins: Vec<String>,
    },
}
