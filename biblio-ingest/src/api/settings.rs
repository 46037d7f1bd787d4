//! Settings API endpoint
//!
//! POST /settings/api-key/:source stores a source API key.

use crate::models::SourceKind;
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SetApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct SetApiKeyResponse {
    pub success: bool,
    pub message: String,
}

/// POST /settings/api-key/:source
///
/// **Behavior:**
/// 1. Validate key (non-empty, non-whitespace)
/// 2. Write to database (authoritative)
/// 3. Sync to TOML (best-effort backup)
pub async fn set_api_key(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Json(payload): Json<SetApiKeyRequest>,
) -> ApiResult<Json<SetApiKeyResponse>> {
    let source: SourceKind = source.parse()?;
    if !crate::config::is_valid_key(&payload.api_key) {
        return Err(ApiError::BadRequest(
            "API key cannot be empty or whitespace-only".to_string(),
        ));
    }

    crate::config::store_api_key(&state.db, source, payload.api_key, &state.config_path).await?;
    info!(source = %source, "API key configured via settings API");

    Ok(Json(SetApiKeyResponse {
        success: true,
        message: format!("{} API key configured successfully", source),
    }))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/settings/api-key/:source", post(set_api_key))
}
