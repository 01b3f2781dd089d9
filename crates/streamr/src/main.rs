//! # streamr
//!
//! Server binary: loads settings, starts logging and metrics, and serves
//! SSE channels until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use streamr_server::{ServerConfig, StreamrServer, telemetry};
use streamr_settings::StreamrSettings;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Server-Sent Events push server.
#[derive(Parser, Debug)]
#[command(name = "streamr", about = "Server-Sent Events push server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.streamr/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<StreamrSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(streamr_settings::settings_path);
        let mut settings = streamr_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

fn init_logging(settings: &StreamrSettings) {
    if settings.logging.json {
        streamr_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        streamr_core::logging::init_subscriber(&settings.logging.level);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    init_logging(&settings);

    let metrics = telemetry::install_recorder().context("Failed to install metrics recorder")?;
    let server = StreamrServer::new(ServerConfig::from(&settings)).with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("streamr listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let outcome = server.shutdown().drain(handle, SHUTDOWN_TIMEOUT).await;
    tracing::info!(?outcome, "Shutdown complete");
    Ok(())
}
