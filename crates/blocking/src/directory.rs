//! Postgres-backed provider directory
//!
//! Adapter over the platform's `providers` and `provider_contacts` tables.
//! The engine itself only sees the `ProviderDirectory` trait; tests swap in
//! fakes.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::external::{ExternalError, ProviderDirectory};
use crate::models::Recipient;

pub struct PgProviderDirectory {
    pool: PgPool,
}

impl PgProviderDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderDirectory for PgProviderDirectory {
    async fn list_active(&self, exclude_flagged: bool) -> Result<Vec<Uuid>, ExternalError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM providers
            WHERE is_active AND (NOT $1 OR NOT exclude_from_blocking_checks)
            ORDER BY id
            "#,
        )
        .bind(exclude_flagged)
        .fetch_all(&self.pool)
        .await
        .map_err(db_unavailable)?;
        Ok(ids)
    }

    async fn is_excluded(&self, provider_id: Uuid) -> Result<bool, ExternalError> {
        let excluded: Option<bool> =
            sqlx::query_scalar("SELECT exclude_from_blocking_checks FROM providers WHERE id = $1")
                .bind(provider_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_unavailable)?;
        excluded.ok_or(ExternalError::NotFound)
    }

    async fn provider_name(&self, provider_id: Uuid) -> Result<String, ExternalError> {
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM providers WHERE id = $1")
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_unavailable)?;
        name.ok_or(ExternalError::NotFound)
    }

    async fn notification_recipients(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<Recipient>, ExternalError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT email, role FROM provider_contacts
            WHERE provider_id = $1
            ORDER BY email
            "#,
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_unavailable)?;

        Ok(rows
            .into_iter()
            .map(|(email, role)| Recipient { email, role })
            .collect())
    }
}

fn db_unavailable(error: sqlx::Error) -> ExternalError {
    ExternalError::Unavailable(error.to_string())
}
