//! Route definitions

pub mod admin;
pub mod blockings;

use axum::http::HeaderMap;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::enforce_provider_blocking;
use crate::state::AppState;

/// Operator identity header set by the platform gateway after authentication
const OPERATOR_ID_HEADER: &str = "x-operator-id";

/// Extract the authenticated operator from the gateway-set header
pub fn operator_id(headers: &HeaderMap) -> ApiResult<Uuid> {
    let raw = headers
        .get(OPERATOR_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing operator identity".into()))?;
    raw.parse()
        .map_err(|_| ApiError::Unauthorized("malformed operator identity".into()))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

pub fn create_router(state: AppState) -> Router {
    // Provider-facing routes that blocking enforcement applies to
    let enforced = Router::new()
        .route("/api/providers/{provider_id}", get(blockings::provider_profile))
        .layer(from_fn_with_state(state.clone(), enforce_provider_blocking));

    Router::new()
        .route("/health", get(health))
        .merge(enforced)
        // Blocking status and history (readable even while blocked)
        .route(
            "/api/providers/{provider_id}/blocking-status",
            get(blockings::blocking_status),
        )
        .route(
            "/api/providers/{provider_id}/blocking-history",
            get(blockings::blocking_history),
        )
        // Payment webhook
        .route("/api/payments/settled", post(blockings::payment_settled))
        // Operator actions on episodes
        .route("/api/admin/blockings/{episode_id}/resolve", post(admin::resolve_episode))
        .route("/api/admin/blockings/{episode_id}/override", post(admin::override_episode))
        .route("/api/admin/blockings/{episode_id}/reopen", post(admin::reopen_episode))
        .route(
            "/api/admin/providers/{provider_id}/reactivate-locations",
            post(admin::reactivate_locations),
        )
        // Rules
        .route("/api/admin/blocking/rules", get(admin::list_rules).post(admin::create_rule))
        .route("/api/admin/blocking/rules/{rule_id}", axum::routing::delete(admin::delete_rule))
        .route(
            "/api/admin/blocking/rules/{rule_id}/deactivate",
            post(admin::deactivate_rule),
        )
        // Templates
        .route(
            "/api/admin/blocking/templates",
            get(admin::list_templates).post(admin::create_template),
        )
        .route("/api/admin/blocking/templates/{template_id}", put(admin::update_template))
        .route(
            "/api/admin/blocking/templates/{template_id}/deactivate",
            post(admin::deactivate_template),
        )
        .route(
            "/api/admin/blocking/templates/{template_id}/history",
            get(admin::template_history),
        )
        // Schedules
        .route(
            "/api/admin/blocking/schedules",
            get(admin::list_schedules).post(admin::create_schedule),
        )
        .route("/api/admin/blocking/schedules/{schedule_id}", put(admin::update_schedule))
        .route(
            "/api/admin/blocking/schedules/{schedule_id}/activate",
            post(admin::activate_schedule),
        )
        .route(
            "/api/admin/blocking/schedules/{schedule_id}/deactivate",
            post(admin::deactivate_schedule),
        )
        .route("/api/admin/blocking/schedules/{schedule_id}/run", post(admin::run_schedule))
        // Settings
        .route(
            "/api/admin/blocking/settings",
            get(admin::get_settings).put(admin::update_settings),
        )
        // Notifications
        .route(
            "/api/admin/notifications/{notification_id}/retry",
            post(admin::retry_notification),
        )
        // Invariants
        .route("/api/admin/invariants", get(admin::run_invariants))
        .route("/api/admin/invariants/{name}", get(admin::run_invariant))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_operator_id_requires_header() {
        let headers = HeaderMap::new();
        assert!(operator_id(&headers).is_err());
    }

    #[test]
    fn test_operator_id_parses_uuid() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            OPERATOR_ID_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        assert_eq!(operator_id(&headers).unwrap(), id);
    }

    #[test]
    fn test_operator_id_rejects_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(OPERATOR_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(operator_id(&headers).is_err());
    }
}
