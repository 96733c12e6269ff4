//! Rule evaluation and blocking rule management
//!
//! `evaluate` is the pure core of the engine: given debt facts and resolved
//! thresholds it computes a blocking level and a human-readable reason. It
//! has no side effects and never sees providers that are excluded from
//! automatic checks (the coordinator short-circuits those earlier).

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BlockingError, BlockingResult};
use crate::models::{BlockingLevel, BlockingRule, DebtFacts, ResolvedThresholds};

/// Outcome of evaluating one provider's debt facts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub level: BlockingLevel,
    pub reason: String,
}

impl Evaluation {
    fn none() -> Self {
        Self {
            level: BlockingLevel::None,
            reason: String::new(),
        }
    }
}

/// Compute the blocking level for `facts` under `thresholds`.
///
/// The debt check is evaluated first and wins reason ties: if both the debt
/// cap and the critical overdue threshold put the provider at level 3, the
/// reason records the debt check.
pub fn evaluate(facts: &DebtFacts, thresholds: &ResolvedThresholds) -> Evaluation {
    let mut result = Evaluation::none();

    if let Some(debt_cap) = thresholds.debt_threshold_cents {
        if facts.total_debt_cents > debt_cap {
            result = Evaluation {
                level: BlockingLevel::Full,
                reason: format!(
                    "debt threshold exceeded: {} > {} {}",
                    facts.total_debt_cents, debt_cap, facts.currency
                ),
            };
        }
    }

    let days = facts.max_overdue_days;
    let days_result = if days >= thresholds.overdue_days_3 {
        Some((
            BlockingLevel::Full,
            format!("critical overdue: {} days >= {}", days, thresholds.overdue_days_3),
        ))
    } else if days >= thresholds.overdue_days_2 {
        Some((
            BlockingLevel::SearchExcluded,
            format!("high overdue: {} days >= {}", days, thresholds.overdue_days_2),
        ))
    } else if days >= thresholds.overdue_days_1 {
        Some((
            BlockingLevel::Warning,
            format!("information overdue: {} days >= {}", days, thresholds.overdue_days_1),
        ))
    } else {
        None
    };

    if let Some((level, reason)) = days_result {
        // Strictly greater keeps the debt reason on ties
        if level > result.level {
            result = Evaluation { level, reason };
        }
    }

    result
}

/// Parameters for creating or updating a blocking rule
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RuleInput {
    pub name: String,
    pub description: String,
    pub debt_amount_threshold_cents: i64,
    pub overdue_days_threshold: i32,
    pub is_mass_rule: bool,
    pub regions: Vec<String>,
    pub service_types: Vec<String>,
    pub priority: i32,
}

/// True when a mass rule's geographic/service scope covers the given
/// provider attributes. Rules without scope entries match everything.
pub fn mass_rule_matches(rule: &BlockingRule, region: &str, service_type: &str) -> bool {
    if !rule.is_mass_rule {
        return false;
    }
    let region_ok = rule.regions.is_empty() || rule.regions.iter().any(|r| r == region);
    let service_ok =
        rule.service_types.is_empty() || rule.service_types.iter().any(|s| s == service_type);
    region_ok && service_ok
}

/// First rule whose conditions the facts meet, in precedence order.
///
/// `rules` must already be ordered by precedence (as `list_active` returns
/// them). Mass rules additionally have to cover the provider's region and
/// service type. An `overdue_days_threshold` of 0 disables a rule's overdue
/// condition; the debt condition is strictly greater than, like the
/// evaluator's debt cap. The matched rule is stamped on the episode the
/// coordinator creates.
pub fn applicable_rule<'a>(
    rules: &'a [BlockingRule],
    facts: &DebtFacts,
    region: &str,
    service_type: &str,
) -> Option<&'a BlockingRule> {
    rules
        .iter()
        .filter(|rule| rule.is_active)
        .filter(|rule| !rule.is_mass_rule || mass_rule_matches(rule, region, service_type))
        .find(|rule| {
            facts.total_debt_cents > rule.debt_amount_threshold_cents
                || (rule.overdue_days_threshold > 0
                    && facts.max_overdue_days >= rule.overdue_days_threshold)
        })
}

/// CRUD over blocking rules. Rules referenced by an episode are only ever
/// soft-deactivated so the episode audit trail stays resolvable.
pub struct RuleService {
    pool: PgPool,
}

impl RuleService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: RuleInput) -> BlockingResult<BlockingRule> {
        validate_rule(&input)?;

        let rule: BlockingRule = sqlx::query_as(
            r#"
            INSERT INTO blocking_rules (
                name, description, debt_amount_threshold_cents, overdue_days_threshold,
                is_mass_rule, regions, service_types, priority
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.debt_amount_threshold_cents)
        .bind(input.overdue_days_threshold)
        .bind(input.is_mass_rule)
        .bind(&input.regions)
        .bind(&input.service_types)
        .bind(input.priority)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(rule_id = %rule.id, name = %rule.name, "Blocking rule created");
        Ok(rule)
    }

    pub async fn get(&self, rule_id: Uuid) -> BlockingResult<BlockingRule> {
        sqlx::query_as("SELECT * FROM blocking_rules WHERE id = $1")
            .bind(rule_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(BlockingError::NotFound("blocking rule", rule_id))
    }

    /// Active rules, highest precedence (lowest priority number) first
    pub async fn list_active(&self) -> BlockingResult<Vec<BlockingRule>> {
        let rules = sqlx::query_as(
            "SELECT * FROM blocking_rules WHERE is_active ORDER BY priority, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rules)
    }

    /// Soft-deactivate a rule. Hard deletion is refused outright while any
    /// episode references the rule.
    pub async fn deactivate(&self, rule_id: Uuid) -> BlockingResult<()> {
        let updated = sqlx::query(
            "UPDATE blocking_rules SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(rule_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(BlockingError::NotFound("blocking rule", rule_id));
        }
        tracing::info!(rule_id = %rule_id, "Blocking rule deactivated");
        Ok(())
    }

    pub async fn delete(&self, rule_id: Uuid) -> BlockingResult<()> {
        let referenced: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM provider_blockings WHERE blocking_rule_id = $1",
        )
        .bind(rule_id)
        .fetch_one(&self.pool)
        .await?;

        if referenced > 0 {
            return Err(BlockingError::Validation(format!(
                "rule is referenced by {} episode(s); deactivate it instead",
                referenced
            )));
        }

        sqlx::query("DELETE FROM blocking_rules WHERE id = $1")
            .bind(rule_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn validate_rule(input: &RuleInput) -> BlockingResult<()> {
    if input.name.trim().is_empty() {
        return Err(BlockingError::Validation("rule name must not be empty".into()));
    }
    if input.debt_amount_threshold_cents < 0 {
        return Err(BlockingError::Validation(
            "debt_amount_threshold_cents must not be negative".into(),
        ));
    }
    if input.overdue_days_threshold < 0 {
        return Err(BlockingError::Validation(
            "overdue_days_threshold must not be negative".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn thresholds() -> ResolvedThresholds {
        ResolvedThresholds {
            debt_threshold_cents: Some(100_000),
            overdue_days_1: 7,
            overdue_days_2: 14,
            overdue_days_3: 30,
            notification_delay_hours: 1,
        }
    }

    fn facts(total_debt_cents: i64, max_overdue_days: i32) -> DebtFacts {
        DebtFacts {
            total_debt_cents,
            overdue_debt_cents: total_debt_cents,
            currency: "EUR".into(),
            max_overdue_days,
        }
    }

    #[test]
    fn test_no_debt_no_overdue_is_level_zero() {
        let result = evaluate(&facts(0, 0), &thresholds());
        assert_eq!(result.level, BlockingLevel::None);
        assert!(result.reason.is_empty());
    }

    #[test]
    fn test_overdue_reaches_level_one_with_threshold_in_reason() {
        let result = evaluate(&facts(0, 10), &thresholds());
        assert_eq!(result.level, BlockingLevel::Warning);
        assert!(result.reason.contains("7"), "reason: {}", result.reason);
    }

    #[test]
    fn test_overdue_level_two_and_three() {
        assert_eq!(
            evaluate(&facts(0, 14), &thresholds()).level,
            BlockingLevel::SearchExcluded
        );
        assert_eq!(evaluate(&facts(0, 95), &thresholds()).level, BlockingLevel::Full);
    }

    #[test]
    fn test_debt_over_cap_is_full_block() {
        let result = evaluate(&facts(150_000, 0), &thresholds());
        assert_eq!(result.level, BlockingLevel::Full);
        assert!(result.reason.contains("debt threshold"));
    }

    #[test]
    fn test_debt_at_cap_is_not_blocked() {
        // Strictly greater than, per the rule definition
        let result = evaluate(&facts(100_000, 0), &thresholds());
        assert_eq!(result.level, BlockingLevel::None);
    }

    #[test]
    fn test_tie_keeps_debt_reason() {
        // Both checks produce level 3; the debt check was evaluated first
        let result = evaluate(&facts(150_000, 40), &thresholds());
        assert_eq!(result.level, BlockingLevel::Full);
        assert!(result.reason.contains("debt threshold"));
    }

    #[test]
    fn test_days_win_when_debt_below_cap() {
        let result = evaluate(&facts(50_000, 40), &thresholds());
        assert_eq!(result.level, BlockingLevel::Full);
        assert!(result.reason.contains("critical overdue"));
    }

    #[test]
    fn test_no_debt_cap_still_evaluates_days() {
        let mut t = thresholds();
        t.debt_threshold_cents = None;
        let result = evaluate(&facts(1_000_000, 10), &t);
        assert_eq!(result.level, BlockingLevel::Warning);
    }

    fn mass_rule(regions: Vec<&str>, service_types: Vec<&str>) -> BlockingRule {
        BlockingRule {
            id: Uuid::new_v4(),
            name: "mass".into(),
            description: String::new(),
            debt_amount_threshold_cents: 100_000,
            overdue_days_threshold: 30,
            is_mass_rule: true,
            regions: regions.into_iter().map(String::from).collect(),
            service_types: service_types.into_iter().map(String::from).collect(),
            priority: 100,
            is_active: true,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_mass_rule_scope_matching() {
        let rule = mass_rule(vec!["bavaria"], vec!["grooming"]);
        assert!(mass_rule_matches(&rule, "bavaria", "grooming"));
        assert!(!mass_rule_matches(&rule, "saxony", "grooming"));
        assert!(!mass_rule_matches(&rule, "bavaria", "veterinary"));
    }

    #[test]
    fn test_mass_rule_empty_scope_matches_all() {
        let rule = mass_rule(vec![], vec![]);
        assert!(mass_rule_matches(&rule, "anywhere", "anything"));
    }

    #[test]
    fn test_non_mass_rule_never_matches() {
        let mut rule = mass_rule(vec![], vec![]);
        rule.is_mass_rule = false;
        assert!(!mass_rule_matches(&rule, "anywhere", "anything"));
    }

    #[test]
    fn test_applicable_rule_picks_first_in_precedence_order() {
        let mut strict = mass_rule(vec![], vec![]);
        strict.name = "strict".into();
        strict.is_mass_rule = false;
        strict.overdue_days_threshold = 10;
        let mut lenient = mass_rule(vec![], vec![]);
        lenient.name = "lenient".into();
        lenient.is_mass_rule = false;
        lenient.overdue_days_threshold = 30;

        let rules = vec![strict, lenient];
        let found = applicable_rule(&rules, &facts(0, 45), "bavaria", "grooming").unwrap();
        assert_eq!(found.name, "strict");
    }

    #[test]
    fn test_applicable_rule_skips_out_of_scope_mass_rules() {
        let scoped = mass_rule(vec!["saxony"], vec![]);
        let rules = vec![scoped];
        assert!(applicable_rule(&rules, &facts(0, 45), "bavaria", "grooming").is_none());
    }

    #[test]
    fn test_applicable_rule_debt_condition_is_strictly_greater() {
        let mut rule = mass_rule(vec![], vec![]);
        rule.is_mass_rule = false;
        rule.overdue_days_threshold = 0;
        let rules = vec![rule];
        assert!(applicable_rule(&rules, &facts(100_000, 0), "", "").is_none());
        assert!(applicable_rule(&rules, &facts(100_001, 0), "", "").is_some());
    }

    #[test]
    fn test_applicable_rule_zero_overdue_disables_condition() {
        let mut rule = mass_rule(vec![], vec![]);
        rule.is_mass_rule = false;
        rule.overdue_days_threshold = 0;
        let rules = vec![rule];
        // Debt below the cap and no overdue condition: no match for anyone
        assert!(applicable_rule(&rules, &facts(0, 500), "", "").is_none());
    }

    #[test]
    fn test_applicable_rule_ignores_inactive() {
        let mut rule = mass_rule(vec![], vec![]);
        rule.is_mass_rule = false;
        rule.is_active = false;
        let rules = vec![rule];
        assert!(applicable_rule(&rules, &facts(500_000, 90), "", "").is_none());
    }

    #[test]
    fn test_validate_rule_rejects_empty_name() {
        let input = RuleInput {
            name: "  ".into(),
            description: String::new(),
            debt_amount_threshold_cents: 0,
            overdue_days_threshold: 0,
            is_mass_rule: false,
            regions: vec![],
            service_types: vec![],
            priority: 100,
        };
        assert!(validate_rule(&input).is_err());
    }
}
