// Blocking crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pawcare Provider Blocking Module
//!
//! Multi-level blocking of provider organizations over unpaid debt.
//!
//! ## Features
//!
//! - **Threshold Resolution**: Per-provider overrides, geographic templates, global defaults
//! - **Rule Evaluation**: Pure debt/overdue evaluation to severity levels 0–3
//! - **Episode State Machine**: active / resolved / manual_override with full audit trail
//! - **Escalation Coordinator**: One consistent transition per provider per cycle
//! - **Side Effects**: Location deactivation and booking cancellation on full block
//! - **Notifications**: Delayed, per-recipient email pipeline with retention sweep
//! - **Schedules**: Operator-defined sweep schedules with double-fire protection
//! - **Invariants**: Runnable consistency checks over the whole engine

pub mod coordinator;
pub mod directory;
pub mod error;
pub mod external;
pub mod invariants;
pub mod ledger;
pub mod mailer;
pub mod models;
pub mod notifications;
pub mod rules;
pub mod schedule;
pub mod settings;
pub mod side_effects;
pub mod status;
pub mod store;
pub mod templates;
pub mod thresholds;

#[cfg(test)]
mod edge_case_tests;

// Coordinator
pub use coordinator::{
    plan_transition, EscalationCoordinator, ReconcileOutcome, SkipReason, SweepSummary,
    TransitionPlan,
};

// Directory
pub use directory::PgProviderDirectory;

// Error
pub use error::{BlockingError, BlockingResult};

// External seams
pub use external::{DebtFactsProvider, ExternalError, MailTransport, ProviderDirectory};

// Ledger
pub use ledger::{HttpDebtLedger, LedgerConfig};

// Mailer
pub use mailer::{MailerConfig, ResendMailer};

// Models
pub use models::{
    BlockingLevel, BlockingNotification, BlockingRule, BlockingSchedule, BlockingSystemSettings,
    BlockingTemplate, DebtFacts, EpisodeStatus, NotificationKind, NotificationStatus,
    ProviderBlocking, ProviderThresholdOverride, Recipient, ResolvedThresholds, ScheduleFrequency,
};

// Notifications
pub use notifications::{NotificationService, SendStats, RETENTION_DAYS};

// Rules
pub use rules::{evaluate, Evaluation, RuleInput, RuleService};

// Schedules
pub use schedule::{compute_next_run, ScheduleInput, ScheduleService};

// Settings
pub use settings::{
    SettingsPatch, SettingsService, DEFAULT_DEBT_THRESHOLD_CENTS, DEFAULT_OVERDUE_THRESHOLD_1,
    DEFAULT_OVERDUE_THRESHOLD_2, DEFAULT_OVERDUE_THRESHOLD_3,
};

// Side effects
pub use side_effects::CascadeOutcome;

// Status
pub use status::{BlockingStatus, StatusService};

// Store
pub use store::EpisodeStore;

// Templates
pub use templates::{ProviderGeo, TemplateInput, TemplateService};

// Thresholds
pub use thresholds::{merge_thresholds, ThresholdResolver};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

use std::sync::Arc;

use sqlx::PgPool;

/// Main blocking service that combines all blocking functionality
pub struct BlockingService {
    pub coordinator: EscalationCoordinator,
    pub episodes: EpisodeStore,
    pub invariants: InvariantChecker,
    pub notifications: NotificationService,
    pub rules: RuleService,
    pub schedules: ScheduleService,
    pub settings: SettingsService,
    pub status: StatusService,
    pub templates: TemplateService,
    pub thresholds: ThresholdResolver,
}

impl BlockingService {
    /// Create a new blocking service from environment variables, using the
    /// HTTP ledger and the Postgres provider directory
    pub fn from_env(pool: PgPool) -> BlockingResult<Self> {
        let ledger = HttpDebtLedger::from_env().map_err(|e| BlockingError::ExternalService {
            service: "debt ledger",
            message: e.to_string(),
        })?;
        let directory = PgProviderDirectory::new(pool.clone());
        Ok(Self::new(pool, Arc::new(ledger), Arc::new(directory)))
    }

    /// Create a new blocking service over explicit external adapters
    pub fn new(
        pool: PgPool,
        debt_facts: Arc<dyn DebtFactsProvider>,
        directory: Arc<dyn ProviderDirectory>,
    ) -> Self {
        Self {
            coordinator: EscalationCoordinator::new(pool.clone(), debt_facts, directory),
            episodes: EpisodeStore::new(pool.clone()),
            invariants: InvariantChecker::new(pool.clone()),
            notifications: NotificationService::new(pool.clone()),
            rules: RuleService::new(pool.clone()),
            schedules: ScheduleService::new(pool.clone()),
            settings: SettingsService::new(pool.clone()),
            status: StatusService::new(pool.clone()),
            templates: TemplateService::new(pool.clone()),
            thresholds: ThresholdResolver::new(pool),
        }
    }
}
