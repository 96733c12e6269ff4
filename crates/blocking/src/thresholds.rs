//! Threshold resolution
//!
//! Precedence: provider-specific override, then the best matching geographic
//! template, then the global settings defaults, then hard-coded fallbacks.
//! Read-only and deterministic; used by the coordinator and the status API.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BlockingResult;
use crate::models::{
    BlockingSystemSettings, BlockingTemplate, ProviderThresholdOverride, ResolvedThresholds,
};
use crate::settings::{
    DEFAULT_DEBT_THRESHOLD_CENTS, DEFAULT_OVERDUE_THRESHOLD_1, DEFAULT_OVERDUE_THRESHOLD_2,
    DEFAULT_OVERDUE_THRESHOLD_3,
};
use crate::templates::TemplateService;

/// Merge the threshold sources in precedence order.
///
/// Field-wise: an override may set only some fields, with the rest falling
/// through to the template/global/fallback chain.
pub fn merge_thresholds(
    override_row: Option<&ProviderThresholdOverride>,
    template: Option<&BlockingTemplate>,
    settings: &BlockingSystemSettings,
) -> ResolvedThresholds {
    let debt_threshold_cents = override_row
        .and_then(|o| o.debt_threshold_cents)
        .or(template.map(|t| t.debt_threshold_cents))
        .or(settings.global_debt_threshold_cents)
        .or(Some(DEFAULT_DEBT_THRESHOLD_CENTS));

    let overdue_days_1 = override_row
        .and_then(|o| o.threshold1_days)
        .or(template.map(|t| t.threshold1_days))
        .or(settings.global_overdue_threshold_1)
        .unwrap_or(DEFAULT_OVERDUE_THRESHOLD_1);

    let overdue_days_2 = override_row
        .and_then(|o| o.threshold2_days)
        .or(template.map(|t| t.threshold2_days))
        .or(settings.global_overdue_threshold_2)
        .unwrap_or(DEFAULT_OVERDUE_THRESHOLD_2);

    let overdue_days_3 = override_row
        .and_then(|o| o.threshold3_days)
        .or(template.map(|t| t.threshold3_days))
        .or(settings.global_overdue_threshold_3)
        .unwrap_or(DEFAULT_OVERDUE_THRESHOLD_3);

    let notification_delay_hours = template
        .map(|t| t.notification_delay_hours)
        .unwrap_or(settings.notification_delay_hours);

    ResolvedThresholds {
        debt_threshold_cents,
        overdue_days_1,
        overdue_days_2,
        overdue_days_3,
        notification_delay_hours,
    }
}

pub struct ThresholdResolver {
    pool: PgPool,
    templates: TemplateService,
}

impl ThresholdResolver {
    pub fn new(pool: PgPool) -> Self {
        let templates = TemplateService::new(pool.clone());
        Self { pool, templates }
    }

    /// Resolve the thresholds applicable to one provider
    pub async fn resolve(
        &self,
        provider_id: Uuid,
        settings: &BlockingSystemSettings,
    ) -> BlockingResult<ResolvedThresholds> {
        let override_row: Option<ProviderThresholdOverride> = sqlx::query_as(
            "SELECT * FROM provider_threshold_overrides WHERE provider_id = $1",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        let template = self.templates.find_for_provider(provider_id).await?;

        Ok(merge_thresholds(override_row.as_ref(), template.as_ref(), settings))
    }
}
