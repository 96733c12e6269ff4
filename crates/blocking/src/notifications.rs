//! Notification pipeline
//!
//! Rows are created synchronously inside the transition transaction, one per
//! recipient per event kind, and drained later by the sender once the
//! configured delay has elapsed (the delay doubles as an undo window).
//! Delivery failures stay on the row; the sender never auto-retries them, so
//! a persistent mail-provider outage cannot turn into a notification storm.
//! An explicit retry operation re-arms a failed row.

use sqlx::{PgConnection, PgPool};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{BlockingError, BlockingResult};
use crate::external::MailTransport;
use crate::models::{
    BlockingLevel, BlockingNotification, NotificationKind, NotificationStatus, ProviderBlocking,
    Recipient,
};

/// Notification rows older than this are purged by the retention sweep
pub const RETENTION_DAYS: i64 = 90;

/// Outcome of one sender pass
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SendStats {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Whether a pending notification's delay window has elapsed
pub fn is_due(created_at: OffsetDateTime, delay_hours: i32, now: OffsetDateTime) -> bool {
    now - created_at >= Duration::hours(delay_hours as i64)
}

/// Subject line for a blocking event
pub fn render_subject(kind: NotificationKind, level: BlockingLevel) -> String {
    match kind {
        NotificationKind::BlockingWarning => {
            format!("Provider blocking warning — level {}", level)
        }
        NotificationKind::BlockingActivated => {
            format!("Provider blocking activated — level {}", level)
        }
        NotificationKind::BlockingResolved => "Provider blocking resolved".to_string(),
    }
}

/// Notification body for a blocking event
pub fn render_body(
    kind: NotificationKind,
    provider_name: &str,
    episode: &ProviderBlocking,
    level: BlockingLevel,
) -> String {
    match kind {
        NotificationKind::BlockingResolved => format!(
            "Blocking for provider {} has been resolved.\nNotes: {}",
            provider_name, episode.notes
        ),
        _ => format!(
            "Provider: {}\nBlocking level: {} ({})\nDebt amount: {} {} (cents)\nOverdue days: {}\nBlocked at: {}\nNotes: {}",
            provider_name,
            level,
            level.describe(),
            episode.debt_amount_cents,
            episode.currency,
            episode.overdue_days,
            episode.blocked_at,
            episode.notes
        ),
    }
}

/// Insert pending notification rows for every recipient, inside the caller's
/// transaction. `delay_hours` is the provider's resolved delay (template or
/// global) and is stamped on the row so the sender honours it per row.
pub async fn enqueue(
    conn: &mut PgConnection,
    episode: &ProviderBlocking,
    kind: NotificationKind,
    level: BlockingLevel,
    provider_name: &str,
    recipients: &[Recipient],
    delay_hours: i32,
) -> BlockingResult<usize> {
    let subject = render_subject(kind, level);
    let body = render_body(kind, provider_name, episode, level);

    for recipient in recipients {
        sqlx::query(
            r#"
            INSERT INTO blocking_notifications (
                episode_id, kind, status, recipient_email, subject, body, delay_hours
            )
            VALUES ($1, $2, 'pending', $3, $4, $5, $6)
            "#,
        )
        .bind(episode.id)
        .bind(kind.as_str())
        .bind(&recipient.email)
        .bind(&subject)
        .bind(&body)
        .bind(delay_hours)
        .execute(&mut *conn)
        .await?;
    }

    Ok(recipients.len())
}

pub struct NotificationService {
    pool: PgPool,
}

impl NotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, notification_id: Uuid) -> BlockingResult<BlockingNotification> {
        sqlx::query_as("SELECT * FROM blocking_notifications WHERE id = $1")
            .bind(notification_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(BlockingError::NotFound("blocking notification", notification_id))
    }

    /// Drain pending notifications whose own delay has elapsed.
    ///
    /// Each row carries the delay resolved at enqueue time, so providers
    /// under a template with a longer undo window are held back longer.
    /// Rows are marked `sent` or `failed`; failed rows are left for the
    /// explicit retry operation.
    pub async fn send_pending(&self, transport: &dyn MailTransport) -> BlockingResult<SendStats> {
        let due: Vec<BlockingNotification> = sqlx::query_as(
            r#"
            SELECT * FROM blocking_notifications
            WHERE status = 'pending'
              AND created_at <= NOW() - (delay_hours * INTERVAL '1 hour')
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = SendStats {
            due: due.len(),
            ..Default::default()
        };

        for notification in due {
            match transport
                .send(&notification.recipient_email, &notification.subject, &notification.body)
                .await
            {
                Ok(()) => {
                    self.mark_sent(notification.id).await?;
                    stats.sent += 1;
                }
                Err(e) => {
                    self.mark_failed(notification.id, &e.to_string()).await?;
                    stats.failed += 1;
                    tracing::error!(
                        notification_id = %notification.id,
                        recipient = %notification.recipient_email,
                        error = %e,
                        "Failed to send blocking notification"
                    );
                }
            }
        }

        tracing::info!(
            due = stats.due,
            sent = stats.sent,
            failed = stats.failed,
            "Notification send cycle complete"
        );
        Ok(stats)
    }

    async fn mark_sent(&self, notification_id: Uuid) -> BlockingResult<()> {
        sqlx::query(
            r#"
            UPDATE blocking_notifications
            SET status = 'sent', sent_at = NOW(), error_message = NULL
            WHERE id = $1
            "#,
        )
        .bind(notification_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, notification_id: Uuid, error: &str) -> BlockingResult<()> {
        sqlx::query(
            r#"
            UPDATE blocking_notifications
            SET status = 'failed', error_message = $2
            WHERE id = $1
            "#,
        )
        .bind(notification_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Re-arm a failed notification for the next sender pass
    pub async fn retry(&self, notification_id: Uuid) -> BlockingResult<BlockingNotification> {
        sqlx::query_as(
            r#"
            UPDATE blocking_notifications
            SET status = 'pending', error_message = NULL
            WHERE id = $1 AND status = 'failed'
            RETURNING *
            "#,
        )
        .bind(notification_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BlockingError::InvalidTransition {
            from: NotificationStatus::Pending.as_str().into(),
            to: NotificationStatus::Pending.as_str().into(),
        })
    }

    /// Retention sweep: delete rows older than `RETENTION_DAYS`, any status
    pub async fn purge_expired(&self) -> BlockingResult<u64> {
        let deleted = sqlx::query(
            "DELETE FROM blocking_notifications WHERE created_at < NOW() - ($1 * INTERVAL '1 day')",
        )
        .bind(RETENTION_DAYS as i32)
        .execute(&self.pool)
        .await?;

        tracing::info!(deleted = deleted.rows_affected(), "Notification retention sweep complete");
        Ok(deleted.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode() -> ProviderBlocking {
        ProviderBlocking {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            blocking_rule_id: None,
            status: "active".into(),
            level: 3,
            debt_amount_cents: 150_000,
            overdue_days: 95,
            currency: "EUR".into(),
            blocked_at: OffsetDateTime::UNIX_EPOCH,
            resolved_at: None,
            resolved_by: None,
            notes: "automatic blocking level 3: critical overdue".into(),
        }
    }

    #[test]
    fn test_is_due_respects_delay() {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::hours(10);
        let created = OffsetDateTime::UNIX_EPOCH + Duration::hours(9);
        assert!(is_due(created, 1, now));
        assert!(!is_due(created, 2, now));
    }

    #[test]
    fn test_is_due_zero_delay() {
        let now = OffsetDateTime::UNIX_EPOCH;
        assert!(is_due(now, 0, now));
    }

    #[test]
    fn test_render_subject_mentions_level() {
        let subject = render_subject(NotificationKind::BlockingActivated, BlockingLevel::Full);
        assert!(subject.contains("3"));
        assert!(subject.contains("activated"));
    }

    #[test]
    fn test_render_body_contains_snapshot() {
        let body = render_body(
            NotificationKind::BlockingActivated,
            "Happy Paws",
            &episode(),
            BlockingLevel::Full,
        );
        assert!(body.contains("Happy Paws"));
        assert!(body.contains("150000"));
        assert!(body.contains("95"));
        assert!(body.contains("full blocking"));
    }

    #[test]
    fn test_render_resolved_body() {
        let body = render_body(
            NotificationKind::BlockingResolved,
            "Happy Paws",
            &episode(),
            BlockingLevel::None,
        );
        assert!(body.contains("resolved"));
        assert!(body.contains("Happy Paws"));
    }
}
