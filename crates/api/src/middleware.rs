//! Blocking enforcement middleware
//!
//! Mounted on provider-scoped routes. Level 3 blocks the request outright;
//! level 2 lets it through but marks the response so search indexing and
//! listing layers can exclude the provider; level 1 is informational only
//! and adds nothing here.

use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pawcare_blocking::BlockingLevel;
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

/// Response header set when the provider is excluded from search (level 2)
pub const SEARCH_EXCLUDED_HEADER: &str = "x-provider-search-excluded";

pub async fn enforce_provider_blocking(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
    request: Request,
    next: Next,
) -> Response {
    let status = match state.blocking.status.get(provider_id).await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(provider_id = %provider_id, error = %e, "Blocking status lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match status.blocking_level() {
        BlockingLevel::Full => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "provider is blocked",
                "provider_id": provider_id,
                "reasons": status.reasons,
            })),
        )
            .into_response(),
        BlockingLevel::SearchExcluded => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(SEARCH_EXCLUDED_HEADER, HeaderValue::from_static("true"));
            response
        }
        BlockingLevel::Warning | BlockingLevel::None => next.run(request).await,
    }
}
