//! Cascades applied when a provider enters full blocking
//!
//! Runs inside the same transaction as the state transition: deactivates all
//! of the provider's locations and cancels future/active bookings there,
//! appending a cancellation note. Levels 1–2 have no cascades; they are
//! enforced at the API boundary.
//!
//! Resolving a blocking never reactivates locations. That requires the
//! explicit `reactivate_locations` administrative action.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::BlockingResult;

pub const CANCELLATION_NOTE: &str = "Cancelled due to provider organization blocking.";

/// Booking statuses that are still live and therefore cancelled on full block
const CANCELLABLE_STATUSES: [&str; 3] = ["active", "pending_confirmation", "confirmed"];

/// What the full-block cascade touched
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CascadeOutcome {
    pub locations_deactivated: u64,
    pub bookings_cancelled: u64,
}

/// Deactivate every active location of the provider and cancel the live
/// bookings at those locations.
pub async fn apply_full_block(
    conn: &mut PgConnection,
    provider_id: Uuid,
) -> BlockingResult<CascadeOutcome> {
    let cancelled = sqlx::query(
        r#"
        UPDATE bookings b
        SET status = 'cancelled',
            notes = CASE WHEN b.notes = '' THEN $2 ELSE b.notes || E'\n' || $2 END
        FROM provider_locations l
        WHERE b.location_id = l.id
          AND l.provider_id = $1
          AND l.is_active
          AND b.status = ANY($3)
          AND b.starts_at >= NOW()
        "#,
    )
    .bind(provider_id)
    .bind(CANCELLATION_NOTE)
    .bind(&CANCELLABLE_STATUSES[..])
    .execute(&mut *conn)
    .await?;

    let deactivated = sqlx::query(
        r#"
        UPDATE provider_locations
        SET is_active = FALSE
        WHERE provider_id = $1 AND is_active
        "#,
    )
    .bind(provider_id)
    .execute(&mut *conn)
    .await?;

    let outcome = CascadeOutcome {
        locations_deactivated: deactivated.rows_affected(),
        bookings_cancelled: cancelled.rows_affected(),
    };

    tracing::info!(
        provider_id = %provider_id,
        locations_deactivated = outcome.locations_deactivated,
        bookings_cancelled = outcome.bookings_cancelled,
        "Full block cascade applied"
    );

    Ok(outcome)
}

/// Explicit administrative action; the engine never calls this. Resolving a
/// blocking leaves locations deactivated.
pub async fn reactivate_locations(pool: &PgPool, provider_id: Uuid) -> BlockingResult<u64> {
    let reactivated = sqlx::query(
        "UPDATE provider_locations SET is_active = TRUE WHERE provider_id = $1 AND NOT is_active",
    )
    .bind(provider_id)
    .execute(pool)
    .await?;

    tracing::info!(
        provider_id = %provider_id,
        locations_reactivated = reactivated.rows_affected(),
        "Locations reactivated by administrative action"
    );
    Ok(reactivated.rows_affected())
}
