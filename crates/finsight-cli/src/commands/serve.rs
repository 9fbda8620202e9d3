//! Server command implementation

use std::path::Path;

use anyhow::Result;

use super::open_facade;

pub async fn cmd_serve(
    config_path: Option<&Path>,
    host: &str,
    port: u16,
    allowed_origins: Vec<String>,
) -> Result<()> {
    let facade = open_facade(config_path)?;

    println!("🚀 Starting Finsight web server...");
    println!("   Listening: http://{}:{}", host, port);
    println!(
        "   Serving: {} transactions from the built-in sample until data is ingested",
        facade.current_snapshot().transaction_count
    );
    if !allowed_origins.is_empty() {
        println!("   CORS origins: {}", allowed_origins.join(", "));
    }
    println!();
    println!("   POST a CSV to /api/ingest, read /api/snapshot");
    println!("   Press Ctrl+C to stop");

    let config = finsight_server::ServerConfig { allowed_origins };
    finsight_server::serve_with_config(facade, host, port, config).await?;

    Ok(())
}
