//! File upload API
//!
//! POST /import/file/:format with the file text as body. Records go through
//! the same attribution, dedup and merge pipeline as harvested ones.

use axum::{
    extract::{Path, Query, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::adapters::files::{parse_file, FileFormat};
use crate::models::{HarvestReport, Owner};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct FileImportQuery {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub institution_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FileImportResponse {
    pub format: String,
    pub records: usize,
    pub created: usize,
    pub merged: usize,
    pub duplicates: usize,
    pub discarded: usize,
}

/// POST /import/file/:format
pub async fn import_file(
    State(state): State<AppState>,
    Path(format): Path<String>,
    Query(query): Query<FileImportQuery>,
    body: String,
) -> ApiResult<Json<FileImportResponse>> {
    let format: FileFormat = format.parse().map_err(ApiError::BadRequest)?;
    let requester = match (query.user_id, query.institution_id) {
        (Some(user_id), _) => Owner::User(user_id),
        (None, Some(institution_id)) => Owner::Institution(institution_id),
        (None, None) => {
            return Err(ApiError::BadRequest(
                "user_id or institution_id is required".to_string(),
            ))
        }
    };

    let records = parse_file(format, &body);
    let total = records.len();
    let mut report = HarvestReport::default();
    for record in records {
        let outcome = state.pipeline.process(record, Some(requester)).await?;
        report.record(&outcome);
    }

    tracing::info!(
        format = %format,
        requester = %requester,
        records = total,
        created = report.created,
        merged = report.merged,
        "File imported"
    );

    Ok(Json(FileImportResponse {
        format: format.to_string(),
        records: total,
        created: report.created,
        merged: report.merged,
        duplicates: report.duplicates,
        discarded: report.discarded,
    }))
}

/// Build file import routes
pub fn file_import_routes() -> Router<AppState> {
    Router::new().route("/import/file/:format", post(import_file))
}
