//! Blocking state store: the episode state machine
//!
//! States: `active`, `resolved`, `manual_override`. Creation is the
//! transition into `active`; escalation updates the active row in place;
//! resolution and override stamp the row and leave it as an audit record.
//! Episodes are never deleted.
//!
//! The mutators take `&mut PgConnection` so the escalation coordinator can
//! compose them with side effects and notification enqueues inside a single
//! transaction. A partial unique index on `(provider_id) WHERE status =
//! 'active'` backs the at-most-one-active-episode invariant at the database
//! level.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{BlockingError, BlockingResult};
use crate::models::{BlockingLevel, DebtFacts, EpisodeStatus, ProviderBlocking};

/// Read access over episodes
pub struct EpisodeStore {
    pool: PgPool,
}

impl EpisodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, episode_id: Uuid) -> BlockingResult<ProviderBlocking> {
        sqlx::query_as("SELECT * FROM provider_blockings WHERE id = $1")
            .bind(episode_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(BlockingError::NotFound("blocking episode", episode_id))
    }

    pub async fn active_for_provider(
        &self,
        provider_id: Uuid,
    ) -> BlockingResult<Option<ProviderBlocking>> {
        let episode = sqlx::query_as(
            "SELECT * FROM provider_blockings WHERE provider_id = $1 AND status = 'active'",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(episode)
    }

    /// Full episode history for a provider, newest first
    pub async fn history_for_provider(
        &self,
        provider_id: Uuid,
    ) -> BlockingResult<Vec<ProviderBlocking>> {
        let episodes = sqlx::query_as(
            "SELECT * FROM provider_blockings WHERE provider_id = $1 ORDER BY blocked_at DESC",
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(episodes)
    }
}

/// Most recent episode for a provider regardless of status
pub async fn latest_episode(
    conn: &mut PgConnection,
    provider_id: Uuid,
) -> BlockingResult<Option<ProviderBlocking>> {
    let episode = sqlx::query_as(
        r#"
        SELECT * FROM provider_blockings
        WHERE provider_id = $1
        ORDER BY blocked_at DESC
        LIMIT 1
        "#,
    )
    .bind(provider_id)
    .fetch_optional(conn)
    .await?;
    Ok(episode)
}

/// Initial transition: none -> active. Creates the episode row with the
/// current debt/overdue snapshot.
pub async fn create_episode(
    conn: &mut PgConnection,
    provider_id: Uuid,
    level: BlockingLevel,
    facts: &DebtFacts,
    reason: &str,
    rule_id: Option<Uuid>,
) -> BlockingResult<ProviderBlocking> {
    let episode = sqlx::query_as(
        r#"
        INSERT INTO provider_blockings (
            provider_id, blocking_rule_id, status, level,
            debt_amount_cents, overdue_days, currency, notes
        )
        VALUES ($1, $2, 'active', $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(provider_id)
    .bind(rule_id)
    .bind(level.as_i16())
    .bind(facts.total_debt_cents)
    .bind(facts.max_overdue_days)
    .bind(&facts.currency)
    .bind(format!("automatic blocking level {}: {}", level, reason))
    .fetch_one(conn)
    .await?;
    Ok(episode)
}

/// Re-escalation: active -> active, snapshot update in place. The episode
/// represents a continuous debt condition, so no new row is created.
pub async fn update_snapshot(
    conn: &mut PgConnection,
    episode_id: Uuid,
    level: BlockingLevel,
    facts: &DebtFacts,
    reason: &str,
) -> BlockingResult<ProviderBlocking> {
    sqlx::query_as(
        r#"
        UPDATE provider_blockings
        SET level = $2,
            debt_amount_cents = $3,
            overdue_days = $4,
            currency = $5,
            notes = $6
        WHERE id = $1 AND status = 'active'
        RETURNING *
        "#,
    )
    .bind(episode_id)
    .bind(level.as_i16())
    .bind(facts.total_debt_cents)
    .bind(facts.max_overdue_days)
    .bind(&facts.currency)
    .bind(format!("automatic blocking level {}: {}", level, reason))
    .fetch_optional(conn)
    .await?
    .ok_or(BlockingError::InvalidTransition {
        from: "non-active".into(),
        to: EpisodeStatus::Active.as_str().into(),
    })
}

/// active | manual_override -> resolved. `resolved_by` is NULL for automatic
/// resolutions.
pub async fn resolve_episode(
    conn: &mut PgConnection,
    episode_id: Uuid,
    resolved_by: Option<Uuid>,
    notes: &str,
) -> BlockingResult<ProviderBlocking> {
    sqlx::query_as(
        r#"
        UPDATE provider_blockings
        SET status = 'resolved',
            resolved_at = NOW(),
            resolved_by = $2,
            notes = CASE WHEN $3 = '' THEN notes ELSE $3 END
        WHERE id = $1 AND status IN ('active', 'manual_override')
        RETURNING *
        "#,
    )
    .bind(episode_id)
    .bind(resolved_by)
    .bind(notes)
    .fetch_optional(conn)
    .await?
    .ok_or(BlockingError::InvalidTransition {
        from: EpisodeStatus::Resolved.as_str().into(),
        to: EpisodeStatus::Resolved.as_str().into(),
    })
}

/// active -> manual_override. Operator-only; terminal for the engine, which
/// will not touch the episode again until an operator reopens or resolves it.
pub async fn override_episode(
    conn: &mut PgConnection,
    episode_id: Uuid,
    actor_id: Uuid,
    notes: &str,
) -> BlockingResult<ProviderBlocking> {
    sqlx::query_as(
        r#"
        UPDATE provider_blockings
        SET status = 'manual_override',
            resolved_at = NOW(),
            resolved_by = $2,
            notes = CASE WHEN $3 = '' THEN notes ELSE $3 END
        WHERE id = $1 AND status = 'active'
        RETURNING *
        "#,
    )
    .bind(episode_id)
    .bind(actor_id)
    .bind(notes)
    .fetch_optional(conn)
    .await?
    .ok_or(BlockingError::InvalidTransition {
        from: "non-active".into(),
        to: EpisodeStatus::ManualOverride.as_str().into(),
    })
}

/// manual_override -> active. Operator-only; the partial unique index rejects
/// it if another active episode exists for the provider.
pub async fn reopen_episode(
    conn: &mut PgConnection,
    episode_id: Uuid,
    actor_id: Uuid,
    notes: &str,
) -> BlockingResult<ProviderBlocking> {
    sqlx::query_as(
        r#"
        UPDATE provider_blockings
        SET status = 'active',
            resolved_at = NULL,
            resolved_by = $2,
            notes = CASE WHEN $3 = '' THEN notes ELSE $3 END
        WHERE id = $1 AND status = 'manual_override'
        RETURNING *
        "#,
    )
    .bind(episode_id)
    .bind(actor_id)
    .bind(notes)
    .fetch_optional(conn)
    .await?
    .ok_or(BlockingError::InvalidTransition {
        from: "non-override".into(),
        to: EpisodeStatus::Active.as_str().into(),
    })
}
