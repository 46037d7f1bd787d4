//! Harvest API handlers
//!
//! POST /harvest/start, GET /harvest/jobs/:job_id, POST /harvest/schedule
//!
//! Parameters are validated and the source is built before anything is
//! spawned or persisted, so configuration errors come back as 400 with no
//! state written.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{HarvestTaskParameters, Owner, SourceKind};
use crate::services::{HarvestJob, Recurrence, ScheduledTask, HARVEST_TASK_TYPE};
use crate::{ApiError, ApiResult, AppState};

/// Harvest request body
///
/// `source` is a free-form name so unknown sources are a 400, not a
/// deserialization failure.
#[derive(Debug, Deserialize)]
pub struct HarvestRequest {
    pub source: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// OAI-PMH set or API identifier filter
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub until: Option<NaiveDate>,
    #[serde(default)]
    pub requester: Option<Owner>,
}

impl HarvestRequest {
    fn into_parameters(self) -> ApiResult<HarvestTaskParameters> {
        let source: SourceKind = self.source.parse()?;
        let params = HarvestTaskParameters {
            source,
            endpoint: self.endpoint,
            dataset: self.dataset,
            from: self.from,
            until: self.until,
            requester: self.requester,
        };
        params.validate()?;
        Ok(params)
    }
}

#[derive(Debug, Serialize)]
pub struct StartHarvestResponse {
    pub job_id: Uuid,
    pub dataset: String,
}

/// POST /harvest/start
pub async fn start_harvest(
    State(state): State<AppState>,
    Json(request): Json<HarvestRequest>,
) -> ApiResult<(StatusCode, Json<StartHarvestResponse>)> {
    let params = request.into_parameters()?;
    let dataset = params.dataset_key().to_string();
    let job_id = state.launcher.start(params).await?;

    tracing::info!(job_id = %job_id, dataset = %dataset, "Harvest started");
    Ok((StatusCode::ACCEPTED, Json(StartHarvestResponse { job_id, dataset })))
}

/// GET /harvest/jobs/:job_id
pub async fn get_harvest_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<HarvestJob>> {
    state
        .launcher
        .job(job_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Harvest job not found: {}", job_id)))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleHarvestRequest {
    #[serde(flatten)]
    pub harvest: HarvestRequest,
    /// Defaults to now
    #[serde(default)]
    pub time_to_run: Option<DateTime<Utc>>,
    #[serde(default = "default_recurrence")]
    pub recurrence: Recurrence,
}

fn default_recurrence() -> Recurrence {
    Recurrence::Once
}

#[derive(Debug, Serialize)]
pub struct ScheduleHarvestResponse {
    pub task_id: String,
    pub time_to_run: DateTime<Utc>,
    pub recurrence: Recurrence,
}

/// POST /harvest/schedule
pub async fn schedule_harvest(
    State(state): State<AppState>,
    Json(request): Json<ScheduleHarvestRequest>,
) -> ApiResult<Json<ScheduleHarvestResponse>> {
    let params = request.harvest.into_parameters()?;
    let time_to_run = request.time_to_run.unwrap_or_else(Utc::now);
    let parameters = serde_json::to_value(&params)
        .map_err(|e| ApiError::Internal(format!("Serialize harvest parameters: {}", e)))?;

    let task_id = state
        .scheduler
        .schedule(
            ScheduledTask::new(HARVEST_TASK_TYPE, parameters),
            time_to_run,
            request.recurrence,
        )
        .await?;

    Ok(Json(ScheduleHarvestResponse {
        task_id,
        time_to_run,
        recurrence: request.recurrence,
    }))
}

/// Build harvest routes
pub fn harvest_routes() -> Router<AppState> {
    Router::new()
        .route("/harvest/start", post(start_harvest))
        .route("/harvest/jobs/:job_id", get(get_harvest_job))
        .route("/harvest/schedule", post(schedule_harvest))
}
