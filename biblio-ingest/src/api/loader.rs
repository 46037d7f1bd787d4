//! Loader wizard API
//!
//! Per-owner review under `/loader/:owner_kind/:owner_id/...` plus entity
//! resolution under `/loader/resolve/...`.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::loader::{JournalStub, LoadPreview};
use crate::models::{EventStub, InstitutionStub, Owner, PersonStub};
use crate::{ApiError, ApiResult, AppState};

fn owner(owner_kind: &str, owner_id: i64) -> ApiResult<Owner> {
    Owner::from_parts(owner_kind, owner_id)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown owner kind: {}", owner_kind)))
}

#[derive(Debug, Serialize)]
pub struct NextResponse {
    /// `None` once every visible record is loaded or skipped
    pub record: Option<LoadPreview>,
    pub remaining: i64,
}

#[derive(Debug, Serialize)]
pub struct SkipResponse {
    /// Record now under review, if any remain after the skipped one
    pub current: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MarkLoadedResponse {
    pub identifier: String,
}

#[derive(Debug, Serialize)]
pub struct RemainingResponse {
    pub remaining: i64,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub id: i64,
}

/// GET /loader/:owner_kind/:owner_id/next
pub async fn next_record(
    State(state): State<AppState>,
    Path((owner_kind, owner_id)): Path<(String, i64)>,
) -> ApiResult<Json<NextResponse>> {
    let owner = owner(&owner_kind, owner_id)?;
    let record = state.wizard.next(&owner).await?;
    let remaining = state.wizard.remaining(&owner).await?;
    Ok(Json(NextResponse { record, remaining }))
}

/// POST /loader/:owner_kind/:owner_id/skip
pub async fn skip_record(
    State(state): State<AppState>,
    Path((owner_kind, owner_id)): Path<(String, i64)>,
) -> ApiResult<Json<SkipResponse>> {
    let owner = owner(&owner_kind, owner_id)?;
    let current = state.wizard.skip(&owner).await?;
    Ok(Json(SkipResponse { current }))
}

/// POST /loader/:owner_kind/:owner_id/mark-loaded
pub async fn mark_loaded(
    State(state): State<AppState>,
    Path((owner_kind, owner_id)): Path<(String, i64)>,
) -> ApiResult<Json<MarkLoadedResponse>> {
    let owner = owner(&owner_kind, owner_id)?;
    let identifier = state.wizard.mark_loaded(&owner).await?;
    Ok(Json(MarkLoadedResponse { identifier }))
}

/// POST /loader/:owner_kind/:owner_id/reset
pub async fn reset(
    State(state): State<AppState>,
    Path((owner_kind, owner_id)): Path<(String, i64)>,
) -> ApiResult<Json<RemainingResponse>> {
    let owner = owner(&owner_kind, owner_id)?;
    state.wizard.reset(&owner).await?;
    let remaining = state.wizard.remaining(&owner).await?;
    Ok(Json(RemainingResponse { remaining }))
}

/// GET /loader/:owner_kind/:owner_id/remaining
pub async fn remaining(
    State(state): State<AppState>,
    Path((owner_kind, owner_id)): Path<(String, i64)>,
) -> ApiResult<Json<RemainingResponse>> {
    let owner = owner(&owner_kind, owner_id)?;
    let remaining = state.wizard.remaining(&owner).await?;
    Ok(Json(RemainingResponse { remaining }))
}

/// POST /loader/resolve/institution
pub async fn resolve_institution(
    State(state): State<AppState>,
    Json(stub): Json<InstitutionStub>,
) -> ApiResult<Json<ResolveResponse>> {
    let id = state.wizard.resolver().resolve_or_create_institution(&stub).await?;
    Ok(Json(ResolveResponse { id }))
}

/// POST /loader/resolve/person
pub async fn resolve_person(
    State(state): State<AppState>,
    Json(stub): Json<PersonStub>,
) -> ApiResult<Json<ResolveResponse>> {
    let id = state.wizard.resolver().resolve_or_create_person(&stub).await?;
    Ok(Json(ResolveResponse { id }))
}

/// POST /loader/resolve/journal
pub async fn resolve_journal(
    State(state): State<AppState>,
    Json(stub): Json<JournalStub>,
) -> ApiResult<Json<ResolveResponse>> {
    let id = state.wizard.resolver().resolve_or_create_journal(&stub).await?;
    Ok(Json(ResolveResponse { id }))
}

/// POST /loader/resolve/event
pub async fn resolve_event(
    State(state): State<AppState>,
    Json(stub): Json<EventStub>,
) -> ApiResult<Json<ResolveResponse>> {
    let id = state.wizard.resolver().resolve_or_create_event(&stub).await?;
    Ok(Json(ResolveResponse { id }))
}

/// Build loader routes
pub fn loader_routes() -> Router<AppState> {
    Router::new()
        .route("/loader/:owner_kind/:owner_id/next", get(next_record))
        .route("/loader/:owner_kind/:owner_id/skip", post(skip_record))
        .route("/loader/:owner_kind/:owner_id/mark-loaded", post(mark_loaded))
        .route("/loader/:owner_kind/:owner_id/reset", post(reset))
        .route("/loader/:owner_kind/:owner_id/remaining", get(remaining))
        .route("/loader/resolve/institution", post(resolve_institution))
        .route("/loader/resolve/person", post(resolve_person))
        .route("/loader/resolve/journal", post(resolve_journal))
        .route("/loader/resolve/event", post(resolve_event))
}
