//! Blocking Invariants Module
//!
//! Provides runnable consistency checks for the blocking engine.
//! These invariants can be run after any sweep or operator action to ensure
//! the system is in a valid state.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write
//! 4. **Complete**: Covers all critical blocking consistency requirements

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BlockingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Provider(s) affected
    pub provider_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - providers may be blocked or unblocked incorrectly
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    /// When the check was run
    pub checked_at: OffsetDateTime,
    /// Total number of checks run
    pub checks_run: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
    /// Number of checks that failed
    pub checks_failed: usize,
    /// List of all violations found
    pub violations: Vec<InvariantViolation>,
    /// Overall health status
    pub healthy: bool,
}

/// Row type for multiple active episodes violation
#[derive(Debug, sqlx::FromRow)]
struct MultipleActiveRow {
    provider_id: Uuid,
    episode_count: i64,
}

/// Row type for settled episode without resolution stamp
#[derive(Debug, sqlx::FromRow)]
struct UnstampedSettlementRow {
    episode_id: Uuid,
    provider_id: Uuid,
    status: String,
}

/// Row type for override without actor
#[derive(Debug, sqlx::FromRow)]
struct OverrideNoActorRow {
    episode_id: Uuid,
    provider_id: Uuid,
}

/// Row type for out-of-range level
#[derive(Debug, sqlx::FromRow)]
struct BadLevelRow {
    episode_id: Uuid,
    provider_id: Uuid,
    level: i16,
}

/// Row type for dormant schedule
#[derive(Debug, sqlx::FromRow)]
struct DormantScheduleRow {
    schedule_id: Uuid,
    name: String,
}

/// Row type for stuck pending notifications
#[derive(Debug, sqlx::FromRow)]
struct StuckNotificationRow {
    notification_id: Uuid,
    created_at: OffsetDateTime,
}

/// Service for running blocking invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BlockingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_single_active_episode().await?);
        violations.extend(self.check_settled_has_timestamp().await?);
        violations.extend(self.check_override_has_actor().await?);
        violations.extend(self.check_level_in_range().await?);
        violations.extend(self.check_active_schedules_armed().await?);
        violations.extend(self.check_pending_notifications_drain().await?);

        let checks_run = 6;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: At most 1 active episode per provider
    ///
    /// Two active episodes would make blocking status ambiguous and could
    /// double-fire cascades. The partial unique index should make this
    /// impossible; a violation means the index is missing or was bypassed.
    async fn check_single_active_episode(&self) -> BlockingResult<Vec<InvariantViolation>> {
        let rows: Vec<MultipleActiveRow> = sqlx::query_as(
            r#"
            SELECT provider_id, COUNT(*) as episode_count
            FROM provider_blockings
            WHERE status = 'active'
            GROUP BY provider_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "single_active_episode".to_string(),
                provider_ids: vec![row.provider_id],
                description: format!(
                    "Provider has {} active blocking episodes (expected at most 1)",
                    row.episode_count
                ),
                context: serde_json::json!({
                    "episode_count": row.episode_count,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: Resolved and overridden episodes carry a timestamp
    ///
    /// `resolved_at` is the audit anchor for when the episode left the
    /// active state.
    async fn check_settled_has_timestamp(&self) -> BlockingResult<Vec<InvariantViolation>> {
        let rows: Vec<UnstampedSettlementRow> = sqlx::query_as(
            r#"
            SELECT id as episode_id, provider_id, status
            FROM provider_blockings
            WHERE status IN ('resolved', 'manual_override')
              AND resolved_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "settled_has_timestamp".to_string(),
                provider_ids: vec![row.provider_id],
                description: format!(
                    "Episode in status '{}' has no resolved_at timestamp",
                    row.status
                ),
                context: serde_json::json!({
                    "episode_id": row.episode_id,
                    "status": row.status,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: Manual overrides name the operator
    ///
    /// Overrides are operator-only actions; an override with no actor cannot
    /// be attributed or audited.
    async fn check_override_has_actor(&self) -> BlockingResult<Vec<InvariantViolation>> {
        let rows: Vec<OverrideNoActorRow> = sqlx::query_as(
            r#"
            SELECT id as episode_id, provider_id
            FROM provider_blockings
            WHERE status = 'manual_override'
              AND resolved_by IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "override_has_actor".to_string(),
                provider_ids: vec![row.provider_id],
                description: "Manually overridden episode has no recorded operator".to_string(),
                context: serde_json::json!({
                    "episode_id": row.episode_id,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 4: Episode levels are within 1..=3
    ///
    /// Level 0 never creates an episode, and nothing above 3 exists.
    async fn check_level_in_range(&self) -> BlockingResult<Vec<InvariantViolation>> {
        let rows: Vec<BadLevelRow> = sqlx::query_as(
            r#"
            SELECT id as episode_id, provider_id, level
            FROM provider_blockings
            WHERE level NOT BETWEEN 1 AND 3
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "level_in_range".to_string(),
                provider_ids: vec![row.provider_id],
                description: format!("Episode has out-of-range blocking level {}", row.level),
                context: serde_json::json!({
                    "episode_id": row.episode_id,
                    "level": row.level,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 5: Active schedules have a next run
    ///
    /// An active schedule with a NULL `next_run` will never fire again.
    async fn check_active_schedules_armed(&self) -> BlockingResult<Vec<InvariantViolation>> {
        let rows: Vec<DormantScheduleRow> = sqlx::query_as(
            r#"
            SELECT id as schedule_id, name
            FROM blocking_schedules
            WHERE is_active AND next_run IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "active_schedules_armed".to_string(),
                provider_ids: vec![],
                description: format!("Active schedule '{}' has no next run time", row.name),
                context: serde_json::json!({
                    "schedule_id": row.schedule_id,
                    "name": row.name,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Invariant 6: Pending notifications are being drained
    ///
    /// A pending row far older than any configured delay means the sender
    /// job is not running.
    async fn check_pending_notifications_drain(&self) -> BlockingResult<Vec<InvariantViolation>> {
        let rows: Vec<StuckNotificationRow> = sqlx::query_as(
            r#"
            SELECT id as notification_id, created_at
            FROM blocking_notifications
            WHERE status = 'pending'
              AND created_at < NOW() - INTERVAL '7 days'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "pending_notifications_drain".to_string(),
                provider_ids: vec![],
                description: "Notification has been pending for over 7 days".to_string(),
                context: serde_json::json!({
                    "notification_id": row.notification_id,
                    "created_at": row.created_at.to_string(),
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BlockingResult<Vec<InvariantViolation>> {
        match name {
            "single_active_episode" => self.check_single_active_episode().await,
            "settled_has_timestamp" => self.check_settled_has_timestamp().await,
            "override_has_actor" => self.check_override_has_actor().await,
            "level_in_range" => self.check_level_in_range().await,
            "active_schedules_armed" => self.check_active_schedules_armed().await,
            "pending_notifications_drain" => self.check_pending_notifications_drain().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "single_active_episode",
            "settled_has_timestamp",
            "override_has_actor",
            "level_in_range",
            "active_schedules_armed",
            "pending_notifications_drain",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
        assert_eq!(ViolationSeverity::Low.to_string(), "LOW");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 6);
        assert!(checks.contains(&"single_active_episode"));
        assert!(checks.contains(&"override_has_actor"));
    }
}
