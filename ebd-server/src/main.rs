//! ebd-server - Event based data service
//!
//! Stores seismic events (QuakeML), station information (SEED, XSEED,
//! RESP) and event bound waveforms (MiniSEED, SAC), and serves them back
//! over HTTP.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use clap::Parser;
use ebd_common::config::{load_toml_config, resolve_root_folder, ServiceConfig};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ebd_server::AppState;

/// Command-line arguments for ebd-server
#[derive(Parser, Debug)]
#[command(name = "ebd-server")]
#[command(about = "Event based seismological data service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "EBD_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder for the database and the data tree
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to listen on, overrides the configuration file
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level, overrides the configuration file
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Tracing is not installed yet; config loading messages are dropped
    let toml_config = load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let mut config = ServiceConfig::resolve(root_folder, toml_config);
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    init_tracing(&config)?;

    info!("Starting ebd-server (event based data) v{}", env!("CARGO_PKG_VERSION"));
    info!("Root folder: {}", config.root_folder.display());
    info!("Waveforms: {}", config.waveform_filepath.display());
    info!("Station information: {}", config.station_filepath.display());

    config.ensure_directories().context("Failed to create storage directories")?;

    info!("Database: {}", config.database_path.display());
    let db_pool = ebd_common::db::init_database(&config.database_path)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    let state = AppState::from_config(db_pool, &config);
    let app = ebd_server::build_router(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(config: &ServiceConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ebd_server={0},ebd_common={0},tower_http=info", config.log_level)));

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
