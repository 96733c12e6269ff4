//! Provider-facing blocking routes and the payment webhook

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use pawcare_blocking::{BlockingError, BlockingStatus, ProviderBlocking, ReconcileOutcome};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize, FromRow)]
pub struct ProviderProfile {
    pub id: Uuid,
    pub name: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub created_at: OffsetDateTime,
}

/// Public provider profile; blocking enforcement runs before this handler
pub async fn provider_profile(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
) -> ApiResult<Json<ProviderProfile>> {
    let profile: ProviderProfile = sqlx::query_as(
        "SELECT id, name, country, region, city, created_at FROM providers WHERE id = $1",
    )
    .bind(provider_id)
    .fetch_optional(&state.pool)
    .await
    .map_err(BlockingError::from)?
    .ok_or(BlockingError::NotFound("provider", provider_id))?;

    Ok(Json(profile))
}

pub async fn blocking_status(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
) -> ApiResult<Json<BlockingStatus>> {
    let status = state.blocking.status.get(provider_id).await?;
    Ok(Json(status))
}

pub async fn blocking_history(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ProviderBlocking>>> {
    let history = state.blocking.episodes.history_for_provider(provider_id).await?;
    Ok(Json(history))
}

#[derive(Debug, Deserialize)]
pub struct PaymentSettledRequest {
    pub provider_id: Uuid,
}

/// Payment-system webhook: a settled payment triggers an immediate
/// reconciliation so a cleared debt resolves without waiting for the sweep.
pub async fn payment_settled(
    State(state): State<AppState>,
    Json(request): Json<PaymentSettledRequest>,
) -> ApiResult<Json<ReconcileOutcome>> {
    let settings = state.blocking.settings.get().await?;
    let outcome = state
        .blocking
        .coordinator
        .handle_payment_settled(request.provider_id, &settings)
        .await?;
    Ok(Json(outcome))
}
