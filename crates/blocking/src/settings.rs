//! Blocking system settings (singleton row)
//!
//! The settings row is lazily created on first access and constrained to a
//! single row (`CHECK (id = 1)`). The sweep fetches it once per cycle and
//! threads it through all calls rather than consulting a process-wide global.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BlockingError, BlockingResult};
use crate::models::BlockingSystemSettings;

/// Hard-coded fallbacks used when no override, template or global default
/// defines a threshold.
pub const DEFAULT_DEBT_THRESHOLD_CENTS: i64 = 100_000;
pub const DEFAULT_OVERDUE_THRESHOLD_1: i32 = 7;
pub const DEFAULT_OVERDUE_THRESHOLD_2: i32 = 14;
pub const DEFAULT_OVERDUE_THRESHOLD_3: i32 = 30;

/// Fields an operator may change through the settings-update operation
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SettingsPatch {
    pub is_system_enabled: Option<bool>,
    pub check_frequency_hours: Option<i32>,
    pub notification_delay_hours: Option<i32>,
    pub notify_billing_managers: Option<bool>,
    pub notify_provider_admins: Option<bool>,
    pub auto_resolve_on_payment: Option<bool>,
    pub working_days: Option<Vec<i16>>,
    pub sweep_concurrency: Option<i32>,
    pub global_debt_threshold_cents: Option<i64>,
    pub global_overdue_threshold_1: Option<i32>,
    pub global_overdue_threshold_2: Option<i32>,
    pub global_overdue_threshold_3: Option<i32>,
}

pub struct SettingsService {
    pool: PgPool,
}

impl SettingsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the settings row with defaults if it does not exist yet.
    /// Called once at startup; safe to call concurrently.
    pub async fn ensure(&self) -> BlockingResult<BlockingSystemSettings> {
        sqlx::query(
            r#"
            INSERT INTO blocking_system_settings (id)
            VALUES (1)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .execute(&self.pool)
        .await?;

        self.get().await
    }

    pub async fn get(&self) -> BlockingResult<BlockingSystemSettings> {
        let settings: BlockingSystemSettings =
            sqlx::query_as("SELECT * FROM blocking_system_settings WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(settings)
    }

    /// Apply an operator settings update. The only write path for settings.
    pub async fn update(
        &self,
        patch: SettingsPatch,
        actor_id: Option<Uuid>,
    ) -> BlockingResult<BlockingSystemSettings> {
        validate_patch(&patch)?;

        let settings: BlockingSystemSettings = sqlx::query_as(
            r#"
            UPDATE blocking_system_settings
            SET is_system_enabled = COALESCE($1, is_system_enabled),
                check_frequency_hours = COALESCE($2, check_frequency_hours),
                notification_delay_hours = COALESCE($3, notification_delay_hours),
                notify_billing_managers = COALESCE($4, notify_billing_managers),
                notify_provider_admins = COALESCE($5, notify_provider_admins),
                auto_resolve_on_payment = COALESCE($6, auto_resolve_on_payment),
                working_days = COALESCE($7, working_days),
                sweep_concurrency = COALESCE($8, sweep_concurrency),
                global_debt_threshold_cents = COALESCE($9, global_debt_threshold_cents),
                global_overdue_threshold_1 = COALESCE($10, global_overdue_threshold_1),
                global_overdue_threshold_2 = COALESCE($11, global_overdue_threshold_2),
                global_overdue_threshold_3 = COALESCE($12, global_overdue_threshold_3),
                updated_by = $13,
                updated_at = NOW()
            WHERE id = 1
            RETURNING *
            "#,
        )
        .bind(patch.is_system_enabled)
        .bind(patch.check_frequency_hours)
        .bind(patch.notification_delay_hours)
        .bind(patch.notify_billing_managers)
        .bind(patch.notify_provider_admins)
        .bind(patch.auto_resolve_on_payment)
        .bind(patch.working_days)
        .bind(patch.sweep_concurrency)
        .bind(patch.global_debt_threshold_cents)
        .bind(patch.global_overdue_threshold_1)
        .bind(patch.global_overdue_threshold_2)
        .bind(patch.global_overdue_threshold_3)
        .bind(actor_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(actor_id = ?actor_id, "Blocking system settings updated");
        Ok(settings)
    }
}

fn validate_patch(patch: &SettingsPatch) -> BlockingResult<()> {
    if let Some(hours) = patch.check_frequency_hours {
        if hours < 1 {
            return Err(BlockingError::Validation(
                "check_frequency_hours must be at least 1".into(),
            ));
        }
    }
    if let Some(hours) = patch.notification_delay_hours {
        if hours < 0 {
            return Err(BlockingError::Validation(
                "notification_delay_hours must not be negative".into(),
            ));
        }
    }
    if let Some(concurrency) = patch.sweep_concurrency {
        if concurrency < 1 {
            return Err(BlockingError::Validation(
                "sweep_concurrency must be at least 1".into(),
            ));
        }
    }
    if let Some(days) = &patch.working_days {
        if days.iter().any(|d| !(0..=6).contains(d)) {
            return Err(BlockingError::Validation(
                "working_days entries must be 0..=6 (0 = Monday)".into(),
            ));
        }
    }
    if let Some(cents) = patch.global_debt_threshold_cents {
        if cents < 0 {
            return Err(BlockingError::Validation(
                "global_debt_threshold_cents must not be negative".into(),
            ));
        }
    }
    // A zero-day threshold would block providers with no overdue debt at all
    for days in [
        patch.global_overdue_threshold_1,
        patch.global_overdue_threshold_2,
        patch.global_overdue_threshold_3,
    ]
    .into_iter()
    .flatten()
    {
        if days < 1 {
            return Err(BlockingError::Validation(
                "overdue thresholds must be at least 1 day".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_patch_rejects_zero_frequency() {
        let patch = SettingsPatch {
            check_frequency_hours: Some(0),
            ..Default::default()
        };
        assert!(validate_patch(&patch).is_err());
    }

    #[test]
    fn test_validate_patch_rejects_bad_weekday() {
        let patch = SettingsPatch {
            working_days: Some(vec![0, 7]),
            ..Default::default()
        };
        assert!(validate_patch(&patch).is_err());
    }

    #[test]
    fn test_validate_patch_accepts_defaults() {
        assert!(validate_patch(&SettingsPatch::default()).is_ok());
    }

    #[test]
    fn test_validate_patch_rejects_zero_overdue_threshold() {
        // A zero-day global threshold would put debt-free providers at level 3
        for field in 0..3 {
            let mut patch = SettingsPatch::default();
            match field {
                0 => patch.global_overdue_threshold_1 = Some(0),
                1 => patch.global_overdue_threshold_2 = Some(0),
                _ => patch.global_overdue_threshold_3 = Some(-5),
            }
            assert!(validate_patch(&patch).is_err());
        }
    }

    #[test]
    fn test_validate_patch_rejects_negative_debt_threshold() {
        let patch = SettingsPatch {
            global_debt_threshold_cents: Some(-1),
            ..Default::default()
        };
        assert!(validate_patch(&patch).is_err());
    }

    #[test]
    fn test_validate_patch_accepts_positive_thresholds() {
        let patch = SettingsPatch {
            global_debt_threshold_cents: Some(0),
            global_overdue_threshold_1: Some(1),
            global_overdue_threshold_2: Some(14),
            global_overdue_threshold_3: Some(30),
            ..Default::default()
        };
        assert!(validate_patch(&patch).is_ok());
    }
}
