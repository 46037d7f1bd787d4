//! biblio-ingest - Bibliographic Harvesting Service
//!
//! **Startup order:**
//! 1. Load TOML configuration (missing file means defaults)
//! 2. Resolve and create the root folder, open the database
//! 3. Build application state, restore scheduled harvests
//! 4. Serve the HTTP API until Ctrl+C / SIGTERM

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use biblio_common::config::{
    default_config_path, load_toml_config, RootFolderInitializer, RootFolderResolver,
};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use biblio_ingest::services::ScheduledHarvestRestorer;
use biblio_ingest::AppState;

const MODULE_NAME: &str = "biblio-ingest";

/// Command-line arguments for biblio-ingest
#[derive(Parser, Debug)]
#[command(name = "biblio-ingest")]
#[command(about = "Bibliographic harvesting and import service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "BIBLIO_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, env = "BIBLIO_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Listen address, overrides the configured one
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(MODULE_NAME));
    let config = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {} v{}", MODULE_NAME, env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", config_path.display());

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db = biblio_common::db::init_database(&db_path).await?;

    let bind_address = args.bind.clone().unwrap_or_else(|| config.bind_address.clone());
    let state = AppState::new(db.clone(), config, config_path).await?;

    match ScheduledHarvestRestorer::new(db, Arc::clone(&state.scheduler))
        .restore()
        .await
    {
        Ok(count) => info!("Restored {} scheduled harvest(s)", count),
        Err(e) => error!("Scheduled harvest restore failed: {}", e),
    }

    let app = biblio_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
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
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
