//! Background harvest jobs
//!
//! [`HarvestLauncher`] turns [`HarvestTaskParameters`] into a configured
//! [`HarvestSource`] and runs the coordinator on it, either inline (the
//! scheduler) or on a spawned tokio task (the HTTP API). Configuration
//! errors surface before anything is spawned or written.
//!
//! Background jobs stay queryable until they have been finished for longer
//! than the retention window; at most `max_finished` finished jobs are kept.

use async_trait::async_trait;
use biblio_common::config::TomlConfig;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use super::fetchers::{HarvestSource, JsonApiProfile, JsonApiSource, OaiPmhSource};
use super::harvest_coordinator::HarvestCoordinator;
use super::scheduler::TaskRunner;
use crate::models::{HarvestError, HarvestReport, HarvestTaskParameters, SourceKind};

const SCOPUS_BASE_URL: &str = "https://api.elsevier.com";
const OPENALEX_BASE_URL: &str = "https://api.openalex.org";
const WOS_BASE_URL: &str = "https://api.clarivate.com/apis/wos-starter/v1";

const DEFAULT_JOB_RETENTION_HOURS: i64 = 24;
const DEFAULT_MAX_FINISHED_JOBS: usize = 1000;

/// Builds the source a harvest reads from
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn build(&self, params: &HarvestTaskParameters) -> Result<Box<dyn HarvestSource>, HarvestError>;
}

/// Sources from the TOML configuration, API keys resolved per tier
pub struct ConfiguredSources {
    pool: SqlitePool,
    config: Arc<TomlConfig>,
}

impl ConfiguredSources {
    pub fn new(pool: SqlitePool, config: Arc<TomlConfig>) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl SourceFactory for ConfiguredSources {
    async fn build(&self, params: &HarvestTaskParameters) -> Result<Box<dyn HarvestSource>, HarvestError> {
        let settings = &self.config.harvest;
        let sources = &self.config.sources;
        let endpoint_name = params.endpoint.as_deref().unwrap_or_default();

        let source: Box<dyn HarvestSource> = match params.source {
            SourceKind::OaiPmh => {
                let endpoint = sources
                    .oai_pmh_endpoint(endpoint_name)
                    .ok_or_else(|| HarvestError::EndpointNotConfigured(endpoint_name.to_string()))?;
                Box::new(
                    OaiPmhSource::new(
                        &endpoint.name,
                        &endpoint.base_url,
                        &endpoint.metadata_prefix,
                        settings.requests_per_second,
                    )?
                    .with_set(params.dataset.clone())
                    .with_dates(params.from, params.until),
                )
            }
            SourceKind::SkgIf => {
                let endpoint = sources
                    .skg_if_endpoint(endpoint_name)
                    .ok_or_else(|| HarvestError::EndpointNotConfigured(endpoint_name.to_string()))?;
                let scope = match &params.dataset {
                    Some(dataset) => format!("{}:{}", endpoint.name, dataset),
                    None => endpoint.name.clone(),
                };
                Box::new(
                    JsonApiSource::new(
                        JsonApiProfile::for_source(SourceKind::SkgIf)?,
                        &endpoint.base_url,
                        settings.page_size,
                        settings.requests_per_second,
                    )?
                    .with_filter(params.dataset.clone())
                    .with_scope(scope)
                    .with_dates(params.from, params.until),
                )
            }
            kind => {
                let (section, default_url, key_required) = match kind {
                    SourceKind::Scopus => (sources.scopus.as_ref(), SCOPUS_BASE_URL, true),
                    SourceKind::OpenAlex => (sources.open_alex.as_ref(), OPENALEX_BASE_URL, false),
                    _ => (sources.web_of_science.as_ref(), WOS_BASE_URL, true),
                };
                let base_url = section.map_or(default_url, |s| s.base_url.as_str());
                let api_key = crate::config::resolve_api_key(&self.pool, &self.config, kind).await?;
                if key_required && api_key.is_none() {
                    return Err(HarvestError::EndpointNotConfigured(format!(
                        "{} API key not configured",
                        kind
                    )));
                }
                Box::new(
                    JsonApiSource::new(
                        JsonApiProfile::for_source(kind)?,
                        base_url,
                        settings.page_size,
                        settings.requests_per_second,
                    )?
                    .with_api_key(api_key)
                    .with_filter(params.dataset.clone())
                    .with_dates(params.from, params.until),
                )
            }
        };
        Ok(source)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarvestJobState {
    Running,
    Completed { report: HarvestReport },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestJob {
    pub job_id: Uuid,
    pub parameters: HarvestTaskParameters,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub state: HarvestJobState,
}

/// Drop finished jobs past `retention`, then the oldest beyond `max_finished`
///
/// Running jobs are never dropped.
fn prune_finished_jobs(
    jobs: &mut HashMap<Uuid, HarvestJob>,
    now: DateTime<Utc>,
    retention: Duration,
    max_finished: usize,
) {
    jobs.retain(|_, job| job.finished_at.map_or(true, |finished| now - finished < retention));

    let mut finished: Vec<(DateTime<Utc>, Uuid)> = jobs
        .values()
        .filter_map(|job| job.finished_at.map(|at| (at, job.job_id)))
        .collect();
    if finished.len() > max_finished {
        finished.sort();
        let excess = finished.len() - max_finished;
        for (_, job_id) in finished.into_iter().take(excess) {
            jobs.remove(&job_id);
        }
    }
}

#[derive(Clone)]
pub struct HarvestLauncher {
    coordinator: HarvestCoordinator,
    sources: Arc<dyn SourceFactory>,
    jobs: Arc<RwLock<HashMap<Uuid, HarvestJob>>>,
    retention: Duration,
    max_finished: usize,
}

impl HarvestLauncher {
    pub fn new(coordinator: HarvestCoordinator, sources: Arc<dyn SourceFactory>) -> Self {
        Self {
            coordinator,
            sources,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention: Duration::hours(DEFAULT_JOB_RETENTION_HOURS),
            max_finished: DEFAULT_MAX_FINISHED_JOBS,
        }
    }

    /// How long, and how many, finished background jobs stay queryable
    pub fn with_job_retention(mut self, retention: Duration, max_finished: usize) -> Self {
        self.retention = retention;
        self.max_finished = max_finished;
        self
    }

    /// Run a harvest to completion on the current task
    pub async fn run(&self, params: &HarvestTaskParameters) -> Result<HarvestReport, HarvestError> {
        params.validate()?;
        let source = self.sources.build(params).await?;
        self.coordinator.run(source.as_ref(), params.requester).await
    }

    /// Validate and build the source now, harvest in the background
    pub async fn start(&self, params: HarvestTaskParameters) -> Result<Uuid, HarvestError> {
        params.validate()?;
        let source = self.sources.build(&params).await?;

        let job_id = Uuid::new_v4();
        let mut jobs = self.jobs.write().await;
        prune_finished_jobs(&mut jobs, Utc::now(), self.retention, self.max_finished);
        jobs.insert(
            job_id,
            HarvestJob {
                job_id,
                parameters: params.clone(),
                started_at: Utc::now(),
                finished_at: None,
                state: HarvestJobState::Running,
            },
        );
        drop(jobs);

        let coordinator = self.coordinator.clone();
        let jobs = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            info!(job_id = %job_id, source = %params.source, "Background harvest started");
            let state = match coordinator.run(source.as_ref(), params.requester).await {
                Ok(report) => HarvestJobState::Completed { report },
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Background harvest failed");
                    HarvestJobState::Failed { error: e.to_string() }
                }
            };
            if let Some(job) = jobs.write().await.get_mut(&job_id) {
                job.finished_at = Some(Utc::now());
                job.state = state;
            }
        });

        Ok(job_id)
    }

    pub async fn job(&self, job_id: Uuid) -> Option<HarvestJob> {
        self.jobs.read().await.get(&job_id).cloned()
    }
}

#[async_trait]
impl TaskRunner for HarvestLauncher {
    async fn run_task(&self, parameters: &serde_json::Value) -> anyhow::Result<()> {
        let params: HarvestTaskParameters = serde_json::from_value(parameters.clone())?;
        let report = self.run(&params).await?;
        info!(
            source = %params.source,
            created = report.created,
            merged = report.merged,
            "Scheduled harvest finished"
        );
        Ok(())
    }
}
