//! Platform admin routes for the blocking engine
//!
//! Protected upstream by the platform gateway; handlers read the operator
//! identity from the forwarded header and record it on every mutation.

use std::sync::atomic::AtomicBool;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use pawcare_blocking::{
    BlockingNotification, BlockingRule, BlockingSchedule, BlockingSystemSettings, BlockingTemplate,
    InvariantCheckSummary, InvariantViolation, ProviderBlocking, RuleInput, ScheduleInput,
    SettingsPatch, TemplateInput,
};

use crate::error::ApiResult;
use crate::routes::operator_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EpisodeActionRequest {
    #[serde(default)]
    pub notes: String,
}

// =============================================================================
// Episode operator actions
// =============================================================================

pub async fn resolve_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<EpisodeActionRequest>,
) -> ApiResult<Json<ProviderBlocking>> {
    let actor = operator_id(&headers)?;
    let settings = state.blocking.settings.get().await?;
    let episode = state
        .blocking
        .coordinator
        .resolve_blocking(episode_id, actor, &request.notes, &settings)
        .await?;
    Ok(Json(episode))
}

pub async fn override_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<EpisodeActionRequest>,
) -> ApiResult<Json<ProviderBlocking>> {
    let actor = operator_id(&headers)?;
    let episode = state
        .blocking
        .coordinator
        .manual_override(episode_id, actor, &request.notes)
        .await?;
    Ok(Json(episode))
}

pub async fn reopen_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<EpisodeActionRequest>,
) -> ApiResult<Json<ProviderBlocking>> {
    let actor = operator_id(&headers)?;
    let settings = state.blocking.settings.get().await?;
    let episode = state
        .blocking
        .coordinator
        .reopen_blocking(episode_id, actor, &request.notes, &settings)
        .await?;
    Ok(Json(episode))
}

/// Bring a provider's locations back after a resolved full block. Resolution
/// never does this automatically.
pub async fn reactivate_locations(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = operator_id(&headers)?;
    let reactivated =
        pawcare_blocking::side_effects::reactivate_locations(&state.pool, provider_id).await?;
    tracing::info!(provider_id = %provider_id, actor_id = %actor, "Locations reactivated");
    Ok(Json(json!({ "provider_id": provider_id, "locations_reactivated": reactivated })))
}

// =============================================================================
// Rules
// =============================================================================

pub async fn list_rules(State(state): State<AppState>) -> ApiResult<Json<Vec<BlockingRule>>> {
    Ok(Json(state.blocking.rules.list_active().await?))
}

pub async fn create_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RuleInput>,
) -> ApiResult<Json<BlockingRule>> {
    operator_id(&headers)?;
    Ok(Json(state.blocking.rules.create(input).await?))
}

pub async fn deactivate_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    operator_id(&headers)?;
    state.blocking.rules.deactivate(rule_id).await?;
    Ok(Json(json!({ "deactivated": rule_id })))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    operator_id(&headers)?;
    state.blocking.rules.delete(rule_id).await?;
    Ok(Json(json!({ "deleted": rule_id })))
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    #[serde(flatten)]
    pub template: TemplateInput,
    #[serde(default)]
    pub change_reason: String,
}

pub async fn list_templates(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<BlockingTemplate>>> {
    Ok(Json(state.blocking.templates.list_active().await?))
}

pub async fn create_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TemplateRequest>,
) -> ApiResult<Json<BlockingTemplate>> {
    let actor = operator_id(&headers)?;
    let template = state
        .blocking
        .templates
        .create(request.template, Some(actor), &request.change_reason)
        .await?;
    Ok(Json(template))
}

pub async fn update_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<TemplateRequest>,
) -> ApiResult<Json<BlockingTemplate>> {
    let actor = operator_id(&headers)?;
    let template = state
        .blocking
        .templates
        .update(template_id, request.template, Some(actor), &request.change_reason)
        .await?;
    Ok(Json(template))
}

#[derive(Debug, Deserialize)]
pub struct DeactivateTemplateRequest {
    #[serde(default)]
    pub change_reason: String,
}

pub async fn deactivate_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<DeactivateTemplateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = operator_id(&headers)?;
    state
        .blocking
        .templates
        .deactivate(template_id, Some(actor), &request.change_reason)
        .await?;
    Ok(Json(json!({ "deactivated": template_id })))
}

pub async fn template_history(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let history = state.blocking.templates.history(template_id).await?;
    Ok(Json(json!({ "template_id": template_id, "history": history })))
}

// =============================================================================
// Schedules
// =============================================================================

pub async fn list_schedules(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<BlockingSchedule>>> {
    Ok(Json(state.blocking.schedules.list().await?))
}

pub async fn create_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ScheduleInput>,
) -> ApiResult<Json<BlockingSchedule>> {
    operator_id(&headers)?;
    Ok(Json(state.blocking.schedules.create(input).await?))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<ScheduleInput>,
) -> ApiResult<Json<BlockingSchedule>> {
    operator_id(&headers)?;
    Ok(Json(state.blocking.schedules.update(schedule_id, input).await?))
}

pub async fn activate_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<BlockingSchedule>> {
    operator_id(&headers)?;
    Ok(Json(state.blocking.schedules.set_active(schedule_id, true).await?))
}

pub async fn deactivate_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<BlockingSchedule>> {
    operator_id(&headers)?;
    Ok(Json(state.blocking.schedules.set_active(schedule_id, false).await?))
}

/// Fire a schedule immediately. The sweep runs in the background; the
/// response confirms the trigger, not the sweep result.
pub async fn run_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    operator_id(&headers)?;
    let schedule = state.blocking.schedules.run_now(schedule_id).await?;

    let blocking = state.blocking.clone();
    tokio::spawn(async move {
        let cancel = AtomicBool::new(false);
        let settings = match blocking.settings.get().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load settings for manual sweep");
                return;
            }
        };
        if let Err(e) = blocking.coordinator.sweep(&settings, &cancel).await {
            tracing::error!(schedule_id = %schedule.id, error = %e, "Manual sweep failed");
        }
    });

    Ok(Json(json!({ "triggered": schedule_id, "next_run": schedule.next_run })))
}

// =============================================================================
// Settings
// =============================================================================

pub async fn get_settings(
    State(state): State<AppState>,
) -> ApiResult<Json<BlockingSystemSettings>> {
    Ok(Json(state.blocking.settings.get().await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(patch): Json<SettingsPatch>,
) -> ApiResult<Json<BlockingSystemSettings>> {
    let actor = operator_id(&headers)?;
    Ok(Json(state.blocking.settings.update(patch, Some(actor)).await?))
}

// =============================================================================
// Notifications
// =============================================================================

pub async fn retry_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<BlockingNotification>> {
    operator_id(&headers)?;
    Ok(Json(state.blocking.notifications.retry(notification_id).await?))
}

// =============================================================================
// Invariants
// =============================================================================

pub async fn run_invariants(
    State(state): State<AppState>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    Ok(Json(state.blocking.invariants.run_all_checks().await?))
}

pub async fn run_invariant(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<InvariantViolation>>> {
    Ok(Json(state.blocking.invariants.run_check(&name).await?))
}
