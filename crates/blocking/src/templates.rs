//! Blocking templates: geographically scoped threshold bundles
//!
//! Resolution specificity: point-radius match beats city, city beats region,
//! region beats country, country beats the global template. Every template
//! mutation appends a history row (previous/new snapshots, reason, actor);
//! history is never updated or deleted.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BlockingError, BlockingResult};
use crate::models::{BlockingTemplate, BlockingTemplateHistory};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Provider geography as the resolver sees it
#[derive(Debug, Clone, Default)]
pub struct ProviderGeo {
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Great-circle distance in kilometers
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

fn eq_ci(a: &str, b: &str) -> bool {
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// Pick the most specific active template for a provider's geography.
///
/// Within the point-radius tier the nearest template wins; within the other
/// tiers ties break on template name for determinism.
pub fn best_match<'a>(
    templates: &'a [BlockingTemplate],
    geo: &ProviderGeo,
) -> Option<&'a BlockingTemplate> {
    let active: Vec<&BlockingTemplate> = templates.iter().filter(|t| t.is_active).collect();

    if let (Some(lat), Some(lon)) = (geo.latitude, geo.longitude) {
        let nearest = active
            .iter()
            .filter_map(|t| match (t.latitude, t.longitude) {
                (Some(t_lat), Some(t_lon)) => {
                    let distance = haversine_km(lat, lon, t_lat, t_lon);
                    (distance <= t.radius_km as f64).then_some((distance, *t))
                }
                _ => None,
            })
            .min_by(|(d1, _), (d2, _)| d1.total_cmp(d2));
        if let Some((_, template)) = nearest {
            return Some(template);
        }
    }

    let by_name = |a: &&&BlockingTemplate, b: &&&BlockingTemplate| a.name.cmp(&b.name);

    if let Some(t) = active.iter().filter(|t| eq_ci(&t.city, &geo.city)).min_by(by_name) {
        return Some(*t);
    }
    if let Some(t) = active.iter().filter(|t| eq_ci(&t.region, &geo.region)).min_by(by_name) {
        return Some(*t);
    }
    if let Some(t) = active.iter().filter(|t| eq_ci(&t.country, &geo.country)).min_by(by_name) {
        return Some(*t);
    }

    // Global template: no geographic constraints at all
    active
        .iter()
        .filter(|t| t.country.is_empty() && t.region.is_empty() && t.city.is_empty())
        .min_by(by_name)
        .copied()
}

/// Parameters for creating or updating a template
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct TemplateInput {
    pub name: String,
    pub description: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_km: i32,
    pub debt_threshold_cents: i64,
    pub threshold1_days: i32,
    pub threshold2_days: i32,
    pub threshold3_days: i32,
    pub notification_delay_hours: i32,
    pub currency: String,
}

pub struct TemplateService {
    pool: PgPool,
}

impl TemplateService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        input: TemplateInput,
        actor_id: Option<Uuid>,
        reason: &str,
    ) -> BlockingResult<BlockingTemplate> {
        validate_template(&input)?;

        let mut tx = self.pool.begin().await?;

        let template: BlockingTemplate = sqlx::query_as(
            r#"
            INSERT INTO blocking_templates (
                name, description, country, region, city, latitude, longitude, radius_km,
                debt_threshold_cents, threshold1_days, threshold2_days, threshold3_days,
                notification_delay_hours, currency, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.country)
        .bind(&input.region)
        .bind(&input.city)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(input.radius_km)
        .bind(input.debt_threshold_cents)
        .bind(input.threshold1_days)
        .bind(input.threshold2_days)
        .bind(input.threshold3_days)
        .bind(input.notification_delay_hours)
        .bind(&input.currency)
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await?;

        append_history(&mut tx, template.id, actor_id, "created", "{}", &template, reason).await?;
        tx.commit().await?;

        tracing::info!(template_id = %template.id, name = %template.name, "Blocking template created");
        Ok(template)
    }

    pub async fn update(
        &self,
        template_id: Uuid,
        input: TemplateInput,
        actor_id: Option<Uuid>,
        reason: &str,
    ) -> BlockingResult<BlockingTemplate> {
        validate_template(&input)?;

        let mut tx = self.pool.begin().await?;

        let previous: BlockingTemplate =
            sqlx::query_as("SELECT * FROM blocking_templates WHERE id = $1 FOR UPDATE")
                .bind(template_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(BlockingError::NotFound("blocking template", template_id))?;
        let previous_json = serde_json::to_string(&previous)
            .map_err(|e| BlockingError::Validation(e.to_string()))?;

        let template: BlockingTemplate = sqlx::query_as(
            r#"
            UPDATE blocking_templates
            SET name = $2, description = $3, country = $4, region = $5, city = $6,
                latitude = $7, longitude = $8, radius_km = $9, debt_threshold_cents = $10,
                threshold1_days = $11, threshold2_days = $12, threshold3_days = $13,
                notification_delay_hours = $14, currency = $15, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(template_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.country)
        .bind(&input.region)
        .bind(&input.city)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(input.radius_km)
        .bind(input.debt_threshold_cents)
        .bind(input.threshold1_days)
        .bind(input.threshold2_days)
        .bind(input.threshold3_days)
        .bind(input.notification_delay_hours)
        .bind(&input.currency)
        .fetch_one(&mut *tx)
        .await?;

        append_history(&mut tx, template.id, actor_id, "updated", &previous_json, &template, reason)
            .await?;
        tx.commit().await?;

        Ok(template)
    }

    /// Templates are never hard-deleted; deactivation is audited like any
    /// other change.
    pub async fn deactivate(
        &self,
        template_id: Uuid,
        actor_id: Option<Uuid>,
        reason: &str,
    ) -> BlockingResult<()> {
        let mut tx = self.pool.begin().await?;

        let previous: BlockingTemplate =
            sqlx::query_as("SELECT * FROM blocking_templates WHERE id = $1 FOR UPDATE")
                .bind(template_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(BlockingError::NotFound("blocking template", template_id))?;
        let previous_json = serde_json::to_string(&previous)
            .map_err(|e| BlockingError::Validation(e.to_string()))?;

        let template: BlockingTemplate = sqlx::query_as(
            "UPDATE blocking_templates SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(template_id)
        .fetch_one(&mut *tx)
        .await?;

        append_history(
            &mut tx,
            template_id,
            actor_id,
            "deactivated",
            &previous_json,
            &template,
            reason,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_active(&self) -> BlockingResult<Vec<BlockingTemplate>> {
        let templates = sqlx::query_as(
            "SELECT * FROM blocking_templates WHERE is_active ORDER BY country, region, city, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(templates)
    }

    /// Best matching active template for a provider, by geographic specificity
    pub async fn find_for_provider(
        &self,
        provider_id: Uuid,
    ) -> BlockingResult<Option<BlockingTemplate>> {
        let geo: Option<ProviderGeo> = sqlx::query_as::<_, (String, String, String, Option<f64>, Option<f64>)>(
            "SELECT country, region, city, latitude, longitude FROM providers WHERE id = $1",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|(country, region, city, latitude, longitude)| ProviderGeo {
            country,
            region,
            city,
            latitude,
            longitude,
        });

        let geo = geo.ok_or(BlockingError::NotFound("provider", provider_id))?;
        let templates = self.list_active().await?;
        Ok(best_match(&templates, &geo).cloned())
    }

    pub async fn history(&self, template_id: Uuid) -> BlockingResult<Vec<BlockingTemplateHistory>> {
        let rows = sqlx::query_as(
            r#"
            SELECT * FROM blocking_template_history
            WHERE template_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

async fn append_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    template_id: Uuid,
    actor_id: Option<Uuid>,
    change_type: &str,
    previous_json: &str,
    new_template: &BlockingTemplate,
    reason: &str,
) -> BlockingResult<()> {
    let new_json =
        serde_json::to_string(new_template).map_err(|e| BlockingError::Validation(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO blocking_template_history (
            template_id, changed_by, change_type, previous_values, new_values, change_reason
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(template_id)
    .bind(actor_id)
    .bind(change_type)
    .bind(previous_json)
    .bind(new_json)
    .bind(reason)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn validate_template(input: &TemplateInput) -> BlockingResult<()> {
    if input.name.trim().is_empty() {
        return Err(BlockingError::Validation("template name must not be empty".into()));
    }
    if !input.city.is_empty() && input.region.is_empty() {
        return Err(BlockingError::Validation(
            "region must be specified if city is provided".into(),
        ));
    }
    if input.radius_km <= 0 {
        return Err(BlockingError::Validation("radius_km must be greater than 0".into()));
    }
    if input.debt_threshold_cents < 0 {
        return Err(BlockingError::Validation(
            "debt_threshold_cents must not be negative".into(),
        ));
    }
    // A zero-day threshold would block providers with no overdue debt at all
    if input.threshold1_days < 1 {
        return Err(BlockingError::Validation(
            "overdue thresholds must be at least 1 day".into(),
        ));
    }
    if input.threshold1_days > input.threshold2_days
        || input.threshold2_days > input.threshold3_days
    {
        return Err(BlockingError::Validation(
            "overdue thresholds must be non-decreasing".into(),
        ));
    }
    if input.notification_delay_hours < 0 {
        return Err(BlockingError::Validation(
            "notification_delay_hours must not be negative".into(),
        ));
    }
    Ok(())
}
