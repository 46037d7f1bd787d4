//! biblio-ingest library interface
//!
//! Harvests bibliographic records from citation databases, repositories and
//! uploaded files, deduplicates them into one import store, and serves the
//! loader wizard that turns import records into catalogue entries.

pub mod adapters;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use biblio_common::config::TomlConfig;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::adapters::ConverterRegistry;
use crate::db::entities::{SqliteEntityStore, SqliteUserDirectory};
use crate::db::progress::ProgressStore;
use crate::loader::{EntityResolver, LoaderWizard};
use crate::services::{
    ConfiguredSources, DisabledEmbedder, Embedder, HarvestCoordinator, HarvestLauncher,
    HttpEmbedder, RecordPipeline, Scheduler, SourceFactory, TaskRunner, TokioScheduler,
    HARVEST_TASK_TYPE,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<TomlConfig>,
    /// TOML file that API-key updates are mirrored to
    pub config_path: PathBuf,
    /// Record pipeline for file uploads
    pub pipeline: RecordPipeline,
    pub launcher: HarvestLauncher,
    pub scheduler: Arc<dyn Scheduler>,
    pub wizard: LoaderWizard,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// State with sources built from configuration
    pub async fn new(
        db: SqlitePool,
        config: TomlConfig,
        config_path: PathBuf,
    ) -> biblio_common::Result<Self> {
        let config = Arc::new(config);
        let sources = Arc::new(ConfiguredSources::new(db.clone(), config.clone()));
        Self::build(db, config, config_path, sources).await
    }

    /// State with an explicit source factory
    pub async fn build(
        db: SqlitePool,
        config: Arc<TomlConfig>,
        config_path: PathBuf,
        sources: Arc<dyn SourceFactory>,
    ) -> biblio_common::Result<Self> {
        let max_lock_wait_ms = crate::db::settings::get_max_lock_wait_ms(&db).await?;

        let pipeline = RecordPipeline::new(
            db.clone(),
            Arc::new(SqliteUserDirectory::new(db.clone())),
            embedder(&config),
        )
        .with_max_lock_wait(max_lock_wait_ms);

        let coordinator = HarvestCoordinator::new(
            ProgressStore::new(db.clone()),
            pipeline.clone(),
            Arc::new(ConverterRegistry::standard()),
            config.harvest.max_restarts,
        );
        let launcher = HarvestLauncher::new(coordinator, sources);

        let mut runners: HashMap<String, Arc<dyn TaskRunner>> = HashMap::new();
        runners.insert(HARVEST_TASK_TYPE.to_string(), Arc::new(launcher.clone()));
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new(db.clone(), runners));

        let resolver = Arc::new(EntityResolver::new(Arc::new(SqliteEntityStore::new(db.clone()))));
        let wizard = LoaderWizard::new(db.clone(), resolver);

        Ok(Self {
            db,
            config,
            config_path,
            pipeline,
            launcher,
            scheduler,
            wizard,
            startup_time: Utc::now(),
        })
    }
}

fn embedder(config: &TomlConfig) -> Arc<dyn Embedder> {
    match config.harvest.embedding_endpoint.as_deref() {
        Some(endpoint) => match HttpEmbedder::new(endpoint) {
            Ok(embedder) => {
                info!("Similarity dedup enabled, embedding endpoint {}", endpoint);
                Arc::new(embedder)
            }
            Err(e) => {
                warn!("Embedding client unavailable, similarity dedup disabled: {}", e);
                Arc::new(DisabledEmbedder)
            }
        },
        None => Arc::new(DisabledEmbedder),
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::harvest_routes())
        .merge(api::file_import_routes())
        .merge(api::loader_routes())
        .merge(api::settings_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
