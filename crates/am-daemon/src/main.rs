//! am-daemon: runs the agent execution service until ctrl-c.

use std::path::PathBuf;

use am_core::config::{Config, LogFormat};
use am_telemetry::logging::{init, LogStyle};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Agent execution service: queue, workers and HTTP API.
#[derive(Parser, Debug)]
#[command(name = "am-daemon", version, about)]
struct Args {
    /// Config file; defaults to `AGENTS_CONFIG`, then the standard locations.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = match args.config {
        Some(path) => Config::load_from(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load config")?,
    };

    let style = match config.log.format {
        LogFormat::Json => LogStyle::Json,
        LogFormat::Pretty => LogStyle::Human,
    };
    init("am-daemon", &config.log.level, style);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.app.environment,
        "agent service starting"
    );

    let daemon = am_daemon::daemon::Daemon::new(config)?;
    let shutdown = daemon.shutdown_handle();

    // Wire ctrl-c to trigger graceful shutdown.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger();
    });

    daemon.run().await
}
