//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `analyze` - Report rendering for ingested files and the seed data
//! - `config` - Show or validate the analytics configuration
//! - `serve` - Web server command

pub mod analyze;
pub mod config;
pub mod serve;

// Re-export command functions for main.rs
pub use analyze::*;
pub use config::*;
pub use serve::*;

use std::path::Path;

use anyhow::{Context, Result};
use finsight_core::{AnalyticsConfig, AnalyticsFacade};

/// Load and validate the analytics config
pub fn load_config(path: Option<&Path>) -> Result<AnalyticsConfig> {
    match path {
        Some(p) => AnalyticsConfig::load(Some(p))
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => AnalyticsConfig::load(None).context("Failed to load analytics config"),
    }
}

/// Build a facade from the resolved config
pub fn open_facade(config_path: Option<&Path>) -> Result<AnalyticsFacade> {
    let config = load_config(config_path)?;
    AnalyticsFacade::new(config).context("Failed to compute the seed snapshot")
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
