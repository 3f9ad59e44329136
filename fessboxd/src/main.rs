//! Fessbox daemon
//!
//! Watches for hot-plugged GSM dongles, identifies each one by IMEI/IMSI,
//! publishes `<IMEI>` aliases for the serving ports and exposes the modem
//! list and command execution over a REST API.

mod api;
mod config;
mod devices;

use anyhow::Result;
use api::AppState;
use clap::Parser;
use devices::ModemManager;
use fessbox_core::{resolve_config_path, CONFIG_ENV};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Fessbox modem manager
#[derive(Parser, Debug)]
#[command(name = "fessboxd")]
#[command(version, about = "Hotplug-driven GSM dongle manager", long_about = None)]
struct Args {
    /// Path to configuration file (default: $FESSBOX_CONFIG, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    info!("Fessbox daemon starting...");

    let config_path = resolve_config_path(args.config, std::env::var(CONFIG_ENV).ok());
    info!("Configuration file: {}", config_path.display());

    let static_config = config::load_config(&config_path).await?;
    let modem_config = &static_config.modem;
    info!(
        "Watching {} for *{}* nodes, aliases in {}",
        modem_config.device_dir.display(),
        modem_config.interface_marker,
        modem_config.alias_dir.display()
    );

    let manager = match ModemManager::init(modem_config).await {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("Cannot start modem manager: {}", e);
            return Err(e.into());
        }
    };

    let app = api::create_router(AppState::new(manager.clone()));

    let host = args.bind.unwrap_or_else(|| static_config.server.hostname.clone());
    let port = args.port.unwrap_or(static_config.server.port);
    let bind_addr = format!("{}:{}", host, port);

    info!("Starting server on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server ready!");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
