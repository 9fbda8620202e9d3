//! Config command implementation

use std::path::Path;

use anyhow::Result;
use finsight_core::config::default_config_path;

use super::load_config;

/// Where the effective configuration comes from
pub fn config_source(path: Option<&Path>) -> String {
    if let Some(p) = path {
        return p.display().to_string();
    }
    match default_config_path() {
        Some(p) if p.exists() => p.display().to_string(),
        _ => "built-in defaults".to_string(),
    }
}

pub fn cmd_config(config_path: Option<&Path>, check: bool) -> Result<()> {
    let config = load_config(config_path)?;

    if check {
        println!("✅ Configuration is valid ({})", config_source(config_path));
        return Ok(());
    }

    println!("# Source: {}", config_source(config_path));
    print!("{}", config.to_toml()?);
    Ok(())
}
