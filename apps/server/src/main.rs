//! CineRelay Server - standalone relay for synchronized video playback.
//!
//! Serves the video socket for browser players, the plugin socket for game
//! servers and the admin HTTP routes from a single process.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use cinerelay_core::{bootstrap_services, start_server};
use clap::Parser;
use tokio::signal;

use crate::config::ServerConfig;

/// CineRelay Server - region-aware video playback relay.
#[derive(Parser, Debug)]
#[command(name = "cinerelay-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE", env = "CINERELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "CINERELAY_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file and environment).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Admin key required on /admin routes (overrides config file and environment).
    #[arg(long)]
    admin_key: Option<String>,

    /// Token required on the plugin socket (overrides config file and environment).
    #[arg(long)]
    plugin_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("CineRelay Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(key) = args.admin_key {
        config.admin_key = Some(key);
    }
    if let Some(token) = args.plugin_token {
        config.plugin_token = Some(token);
    }

    let addr = config.socket_addr();
    log::info!(
        "Configuration: bind={}, media_ttl={}s, heartbeat={}s",
        addr,
        config.media_ttl_secs,
        config.heartbeat_interval_secs
    );

    let services =
        bootstrap_services(config.to_core_config()).context("Failed to bootstrap services")?;
    let app_state = services
        .app_state()
        .context("Failed to build application state")?;

    let shutdown = services.cancel_token.clone();
    let mut server_handle =
        tokio::spawn(async move { start_server(app_state, addr, shutdown).await });

    tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
            services.shutdown();
        }
        result = &mut server_handle => {
            // The server only returns on its own when it failed.
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("Server error"),
                Err(e) => Err(e).context("Server task failed"),
            };
        }
    }

    match server_handle.await {
        Ok(result) => result.context("Server error")?,
        Err(e) => log::error!("Server task failed: {}", e),
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
