//! Error types for biblio-ingest's HTTP API
//!
//! Every error body is `{"error": {"code", "message"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::loader::LoaderError;
use crate::models::HarvestError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a record that is already loaded
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream source unusable after retries (502)
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// biblio-common error
    #[error("Common error: {0}")]
    Common(#[from] biblio_common::Error),
}

impl From<HarvestError> for ApiError {
    fn from(err: HarvestError) -> Self {
        match err {
            e if e.is_configuration() => ApiError::BadRequest(e.to_string()),
            HarvestError::Storage(e) => ApiError::Common(e),
            e @ (HarvestError::NetworkExhausted { .. } | HarvestError::Transient(_)) => {
                ApiError::BadGateway(e.to_string())
            }
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<LoaderError> for ApiError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::NoActiveRecord => ApiError::NotFound(err.to_string()),
            LoaderError::NotFound(_) => ApiError::NotFound(err.to_string()),
            LoaderError::AlreadyLoaded(_) => ApiError::Conflict(err.to_string()),
            LoaderError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            LoaderError::Storage(e) => ApiError::Common(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => match err {
                biblio_common::Error::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
                biblio_common::Error::InvalidInput(_) => {
                    (StatusCode::BAD_REQUEST, "BAD_REQUEST", err.to_string())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "COMMON_ERROR",
                    err.to_string(),
                ),
            },
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harvest_error_statuses() {
        let config = ApiError::from(HarvestError::UnknownSource("crossref".to_string()));
        assert_eq!(config.into_response().status(), StatusCode::BAD_REQUEST);

        let exhausted = ApiError::from(HarvestError::NetworkExhausted {
            attempts: 3,
            last_error: "refused".to_string(),
        });
        assert_eq!(exhausted.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_loader_error_statuses() {
        let loaded = ApiError::from(LoaderError::AlreadyLoaded("X".to_string()));
        assert_eq!(loaded.into_response().status(), StatusCode::CONFLICT);

        let missing = ApiError::from(LoaderError::NotFound("X".to_string()));
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let invalid = ApiError::from(LoaderError::InvalidRequest("no name".to_string()));
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
