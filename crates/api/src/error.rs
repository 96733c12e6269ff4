//! API error type and HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pawcare_blocking::BlockingError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Blocking(#[from] BlockingError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Blocking(e) => match e {
                BlockingError::NotFound(_, _) => (StatusCode::NOT_FOUND, e.to_string()),
                BlockingError::Validation(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                BlockingError::InvalidTransition { .. } => (StatusCode::CONFLICT, e.to_string()),
                BlockingError::ExternalService { .. } | BlockingError::Timeout { .. } => {
                    (StatusCode::BAD_GATEWAY, e.to_string())
                }
                BlockingError::Database(_) => {
                    tracing::error!(error = %e, "Database error in request handler");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_string(),
                    )
                }
            },
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
