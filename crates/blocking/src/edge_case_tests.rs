// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Blocking Engine
//!
//! Tests critical boundary conditions across module seams:
//! - Evaluation and threshold precedence
//! - Transition planning and episode identity
//! - Manual override terminality
//! - Schedule double-fire protection
//! - Notification rendering and delay windows

#[cfg(test)]
mod evaluation_tests {
    use crate::models::{BlockingLevel, BlockingSystemSettings, DebtFacts, ResolvedThresholds};
    use crate::rules::evaluate;
    use crate::settings::{
        DEFAULT_OVERDUE_THRESHOLD_1, DEFAULT_OVERDUE_THRESHOLD_2, DEFAULT_OVERDUE_THRESHOLD_3,
    };
    use crate::thresholds::merge_thresholds;
    use time::OffsetDateTime;

    fn facts(debt: i64, days: i32) -> DebtFacts {
        DebtFacts {
            total_debt_cents: debt,
            overdue_debt_cents: debt,
            currency: "EUR".into(),
            max_overdue_days: days,
        }
    }

    fn settings() -> BlockingSystemSettings {
        BlockingSystemSettings {
            id: 1,
            is_system_enabled: true,
            check_frequency_hours: 24,
            notification_delay_hours: 1,
            notify_billing_managers: true,
            notify_provider_admins: true,
            auto_resolve_on_payment: true,
            working_days: vec![0, 1, 2, 3, 4],
            exclude_holidays: true,
            log_all_checks: true,
            log_resolutions: true,
            sweep_concurrency: 8,
            global_debt_threshold_cents: None,
            global_overdue_threshold_1: None,
            global_overdue_threshold_2: None,
            global_overdue_threshold_3: None,
            updated_by: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    // =========================================================================
    // Provider with 35 overdue days against thresholds 7/14/30: full block
    // with a reason naming the critical threshold
    // =========================================================================
    #[test]
    fn test_deep_overdue_reaches_full_block() {
        let thresholds = merge_thresholds(None, None, &settings());
        let result = evaluate(&facts(50_000, 35), &thresholds);
        assert_eq!(result.level, BlockingLevel::Full);
        assert!(result.reason.contains("critical overdue"));
        assert!(result.reason.contains(&DEFAULT_OVERDUE_THRESHOLD_3.to_string()));
    }

    // =========================================================================
    // Exactly at each overdue boundary: >= semantics, the higher level wins
    // =========================================================================
    #[test]
    fn test_overdue_boundaries_are_inclusive() {
        let thresholds = merge_thresholds(None, None, &settings());
        assert_eq!(
            evaluate(&facts(0, DEFAULT_OVERDUE_THRESHOLD_1), &thresholds).level,
            BlockingLevel::Warning
        );
        assert_eq!(
            evaluate(&facts(0, DEFAULT_OVERDUE_THRESHOLD_2), &thresholds).level,
            BlockingLevel::SearchExcluded
        );
        assert_eq!(
            evaluate(&facts(0, DEFAULT_OVERDUE_THRESHOLD_3), &thresholds).level,
            BlockingLevel::Full
        );
    }

    // =========================================================================
    // Debt one cent over the cap forces level 3 even with zero overdue days
    // =========================================================================
    #[test]
    fn test_debt_cap_overrides_mild_overdue() {
        let mut s = settings();
        s.global_debt_threshold_cents = Some(100_000);
        let thresholds = merge_thresholds(None, None, &s);
        let result = evaluate(&facts(100_001, 0), &thresholds);
        assert_eq!(result.level, BlockingLevel::Full);
        assert!(result.reason.contains("debt threshold"));
    }

    // =========================================================================
    // A permissive provider override can keep a provider unblocked where the
    // global defaults would block it
    // =========================================================================
    #[test]
    fn test_override_relaxes_thresholds() {
        use crate::models::ProviderThresholdOverride;
        use uuid::Uuid;

        let override_row = ProviderThresholdOverride {
            provider_id: Uuid::new_v4(),
            debt_threshold_cents: Some(1_000_000),
            threshold1_days: Some(60),
            threshold2_days: Some(90),
            threshold3_days: Some(120),
            updated_by: None,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };
        let thresholds = merge_thresholds(Some(&override_row), None, &settings());
        let result = evaluate(&facts(500_000, 45), &thresholds);
        assert_eq!(result.level, BlockingLevel::None);
    }
}

#[cfg(test)]
mod transition_tests {
    use crate::coordinator::{plan_transition, TransitionPlan};
    use crate::models::{BlockingLevel, ProviderBlocking};
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn episode(status: &str, level: i16) -> ProviderBlocking {
        ProviderBlocking {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            blocking_rule_id: None,
            status: status.into(),
            level,
            debt_amount_cents: 120_000,
            overdue_days: 35,
            currency: "EUR".into(),
            blocked_at: OffsetDateTime::UNIX_EPOCH,
            resolved_at: None,
            resolved_by: None,
            notes: String::new(),
        }
    }

    // =========================================================================
    // The full lifecycle plans: create at 3, hold, resolve, then a fresh
    // episode on relapse (never a reopen of the resolved one)
    // =========================================================================
    #[test]
    fn test_lifecycle_produces_distinct_episodes() {
        // No history, debt critical: create
        assert_eq!(
            plan_transition(None, BlockingLevel::Full),
            TransitionPlan::Create {
                level: BlockingLevel::Full
            }
        );

        // Active at 3, still critical: hold
        let active = episode("active", 3);
        assert_eq!(plan_transition(Some(&active), BlockingLevel::Full), TransitionPlan::NoOp);

        // Debt cleared: resolve that episode
        assert_eq!(
            plan_transition(Some(&active), BlockingLevel::None),
            TransitionPlan::Resolve {
                episode_id: active.id
            }
        );

        // Relapse after resolution: a new episode, not a reopen
        let resolved = episode("resolved", 3);
        assert_eq!(
            plan_transition(Some(&resolved), BlockingLevel::Warning),
            TransitionPlan::Create {
                level: BlockingLevel::Warning
            }
        );
    }

    // =========================================================================
    // Escalation 1 -> 2 -> 3 keeps the same episode row throughout
    // =========================================================================
    #[test]
    fn test_escalation_preserves_episode_identity() {
        let active = episode("active", 1);
        for (target, notify) in [(BlockingLevel::SearchExcluded, true), (BlockingLevel::Full, true)]
        {
            match plan_transition(Some(&active), target) {
                TransitionPlan::Escalate {
                    episode_id,
                    level,
                    notify: n,
                } => {
                    assert_eq!(episode_id, active.id);
                    assert_eq!(level, target);
                    assert_eq!(n, notify);
                }
                other => panic!("expected escalation, got {:?}", other),
            }
        }
    }

    // =========================================================================
    // Manual override suppresses every automatic transition, including
    // resolution, until an operator acts
    // =========================================================================
    #[test]
    fn test_override_suppresses_all_levels() {
        let overridden = episode("manual_override", 2);
        for level in [
            BlockingLevel::None,
            BlockingLevel::Warning,
            BlockingLevel::SearchExcluded,
            BlockingLevel::Full,
        ] {
            assert_eq!(
                plan_transition(Some(&overridden), level),
                TransitionPlan::NoOp,
                "override must suppress automatic transition to {:?}",
                level
            );
        }
    }

    // =========================================================================
    // Unknown status strings are treated as absent history rather than
    // crashing the sweep
    // =========================================================================
    #[test]
    fn test_unknown_status_falls_back_to_create() {
        let weird = episode("archived", 2);
        assert_eq!(
            plan_transition(Some(&weird), BlockingLevel::Warning),
            TransitionPlan::Create {
                level: BlockingLevel::Warning
            }
        );
    }
}

#[cfg(test)]
mod schedule_tests {
    use crate::models::BlockingSchedule;
    use crate::schedule::compute_next_run;
    use time::macros::{datetime, time};
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn daily() -> BlockingSchedule {
        BlockingSchedule {
            id: Uuid::new_v4(),
            name: "daily sweep".into(),
            frequency: "daily".into(),
            run_time: time!(02:00),
            days_of_week: vec![],
            day_of_month: None,
            custom_interval_hours: None,
            is_active: true,
            last_run: None,
            next_run: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    // =========================================================================
    // After a fire at exactly the run time, the recomputed next run is the
    // following day, so an overlapping tick finds nothing due
    // =========================================================================
    #[test]
    fn test_recomputed_next_run_prevents_double_fire() {
        let fired_at = datetime!(2026-08-24 02:00 UTC);
        let next = compute_next_run(&daily(), fired_at).unwrap();
        assert_eq!(next, datetime!(2026-08-25 02:00 UTC));
        assert!(next > fired_at);
    }

    // =========================================================================
    // Monthly day-31 schedules survive short months in sequence
    // =========================================================================
    #[test]
    fn test_monthly_day_31_across_short_months() {
        let mut s = daily();
        s.frequency = "monthly".into();
        s.day_of_month = Some(31);

        let from_jan = compute_next_run(&s, datetime!(2026-01-31 03:00 UTC)).unwrap();
        assert_eq!(from_jan, datetime!(2026-02-28 02:00 UTC));

        let from_apr = compute_next_run(&s, datetime!(2026-04-01 00:00 UTC)).unwrap();
        assert_eq!(from_apr, datetime!(2026-04-30 02:00 UTC));
    }

    // =========================================================================
    // Weekly schedule with all weekdays behaves like daily
    // =========================================================================
    #[test]
    fn test_weekly_with_all_days() {
        let mut s = daily();
        s.frequency = "weekly".into();
        s.days_of_week = vec![0, 1, 2, 3, 4, 5, 6];
        let next = compute_next_run(&s, datetime!(2026-08-24 03:00 UTC)).unwrap();
        assert_eq!(next, datetime!(2026-08-25 02:00 UTC));
    }
}

#[cfg(test)]
mod notification_tests {
    use crate::models::{BlockingLevel, NotificationKind, ProviderBlocking};
    use crate::notifications::{is_due, render_body, render_subject};
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    fn episode(level: i16) -> ProviderBlocking {
        ProviderBlocking {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            blocking_rule_id: None,
            status: "active".into(),
            level,
            debt_amount_cents: 250_000,
            overdue_days: 45,
            currency: "EUR".into(),
            blocked_at: OffsetDateTime::UNIX_EPOCH,
            resolved_at: None,
            resolved_by: None,
            notes: "automatic blocking level 3: debt threshold exceeded".into(),
        }
    }

    // =========================================================================
    // The delay window is inclusive at the boundary: a row created exactly
    // delay hours ago is due
    // =========================================================================
    #[test]
    fn test_delay_boundary_is_inclusive() {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::hours(24);
        let created = now - Duration::hours(2);
        assert!(is_due(created, 2, now));
        assert!(!is_due(created + Duration::seconds(1), 2, now));
    }

    // =========================================================================
    // Warning and activation subjects are distinguishable for the same level
    // =========================================================================
    #[test]
    fn test_subjects_distinguish_kinds() {
        let warning = render_subject(NotificationKind::BlockingWarning, BlockingLevel::Warning);
        let activated =
            render_subject(NotificationKind::BlockingActivated, BlockingLevel::Warning);
        assert_ne!(warning, activated);
    }

    // =========================================================================
    // Bodies carry the episode snapshot, not live data
    // =========================================================================
    #[test]
    fn test_body_uses_episode_snapshot() {
        let body = render_body(
            NotificationKind::BlockingActivated,
            "Happy Paws",
            &episode(3),
            BlockingLevel::Full,
        );
        assert!(body.contains("250000"));
        assert!(body.contains("45"));
        assert!(body.contains("EUR"));
    }
}
