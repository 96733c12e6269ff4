//! Row types and domain enums for the blocking engine
//!
//! Statuses are stored as lowercase snake-case TEXT columns; the enums here
//! give the engine typed views over them. Money is integer cents with a
//! 3-letter currency code.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, Time};
use uuid::Uuid;

/// Blocking severity, 0–3
///
/// 0 = no blocking, 1 = informational warning, 2 = excluded from search,
/// 3 = fully blocked (locations deactivated, bookings cancelled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockingLevel {
    None,
    Warning,
    SearchExcluded,
    Full,
}

impl BlockingLevel {
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Warning),
            2 => Some(Self::SearchExcluded),
            3 => Some(Self::Full),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            Self::None => 0,
            Self::Warning => 1,
            Self::SearchExcluded => 2,
            Self::Full => 3,
        }
    }

    /// Human-readable description used in notification bodies
    pub fn describe(self) -> &'static str {
        match self {
            Self::None => "no blocking",
            Self::Warning => "information notification",
            Self::SearchExcluded => "exclusion from search",
            Self::Full => "full blocking",
        }
    }

    pub fn is_blocking(self) -> bool {
        self != Self::None
    }
}

impl std::fmt::Display for BlockingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i16())
    }
}

/// Status of a blocking episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeStatus {
    Active,
    Resolved,
    ManualOverride,
}

impl EpisodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::ManualOverride => "manual_override",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "resolved" => Some(Self::Resolved),
            "manual_override" => Some(Self::ManualOverride),
            _ => None,
        }
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a blocking notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    BlockingWarning,
    BlockingActivated,
    BlockingResolved,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BlockingWarning => "blocking_warning",
            Self::BlockingActivated => "blocking_activated",
            Self::BlockingResolved => "blocking_resolved",
        }
    }
}

/// Delivery status of a blocking notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// Schedule frequency kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleFrequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Custom,
}

impl ScheduleFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Debt facts for one provider, as returned by the external ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtFacts {
    pub total_debt_cents: i64,
    pub overdue_debt_cents: i64,
    pub currency: String,
    pub max_overdue_days: i32,
}

/// Thresholds applicable to one provider after resolution
///
/// `debt_threshold_cents` may be absent when neither an override, a template
/// nor the global settings define a debt cap for the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedThresholds {
    pub debt_threshold_cents: Option<i64>,
    pub overdue_days_1: i32,
    pub overdue_days_2: i32,
    pub overdue_days_3: i32,
    /// Delay before notifications for this provider are sent; the matched
    /// template's delay, or the global setting
    pub notification_delay_hours: i32,
}

/// Notification recipient resolved from the provider directory
#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub role: String,
}

/// A named blocking policy created by operators
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlockingRule {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub debt_amount_threshold_cents: i64,
    pub overdue_days_threshold: i32,
    pub is_mass_rule: bool,
    pub regions: Vec<String>,
    pub service_types: Vec<String>,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Geographically scoped default threshold bundle
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlockingTemplate {
    pub id: Uuid,
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
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Append-only audit record of a template mutation
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlockingTemplateHistory {
    pub id: Uuid,
    pub template_id: Uuid,
    pub changed_by: Option<Uuid>,
    pub change_type: String,
    pub previous_values: String,
    pub new_values: String,
    pub change_reason: String,
    pub created_at: OffsetDateTime,
}

/// Per-provider threshold override, consulted first by the resolver
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProviderThresholdOverride {
    pub provider_id: Uuid,
    pub debt_threshold_cents: Option<i64>,
    pub threshold1_days: Option<i32>,
    pub threshold2_days: Option<i32>,
    pub threshold3_days: Option<i32>,
    pub updated_by: Option<Uuid>,
    pub updated_at: OffsetDateTime,
}

/// One blocking episode for a provider
///
/// Episodes represent a continuous debt condition: escalation updates the
/// snapshot fields in place rather than creating a new row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProviderBlocking {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub blocking_rule_id: Option<Uuid>,
    pub status: String,
    pub level: i16,
    pub debt_amount_cents: i64,
    pub overdue_days: i32,
    pub currency: String,
    pub blocked_at: OffsetDateTime,
    pub resolved_at: Option<OffsetDateTime>,
    pub resolved_by: Option<Uuid>,
    pub notes: String,
}

impl ProviderBlocking {
    pub fn episode_status(&self) -> Option<EpisodeStatus> {
        EpisodeStatus::parse(&self.status)
    }

    pub fn is_active_blocking(&self) -> bool {
        self.status == EpisodeStatus::Active.as_str()
    }
}

/// One pending/sent/failed notification row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlockingNotification {
    pub id: Uuid,
    pub episode_id: Uuid,
    pub kind: String,
    pub status: String,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub delay_hours: i32,
    pub sent_at: Option<OffsetDateTime>,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
}

/// A named cron-like sweep schedule
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlockingSchedule {
    pub id: Uuid,
    pub name: String,
    pub frequency: String,
    pub run_time: Time,
    pub days_of_week: Vec<i16>,
    pub day_of_month: Option<i32>,
    pub custom_interval_hours: Option<i32>,
    pub is_active: bool,
    pub last_run: Option<OffsetDateTime>,
    pub next_run: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Process-wide singleton configuration (row id is always 1)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlockingSystemSettings {
    pub id: i32,
    pub is_system_enabled: bool,
    pub check_frequency_hours: i32,
    pub notification_delay_hours: i32,
    pub notify_billing_managers: bool,
    pub notify_provider_admins: bool,
    pub auto_resolve_on_payment: bool,
    pub working_days: Vec<i16>,
    pub exclude_holidays: bool,
    pub log_all_checks: bool,
    pub log_resolutions: bool,
    pub sweep_concurrency: i32,
    pub global_debt_threshold_cents: Option<i64>,
    pub global_overdue_threshold_1: Option<i32>,
    pub global_overdue_threshold_2: Option<i32>,
    pub global_overdue_threshold_3: Option<i32>,
    pub updated_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl BlockingSystemSettings {
    /// Whether `date` falls on a configured working day (0 = Monday)
    pub fn is_working_day(&self, date: time::Date) -> bool {
        let day = date.weekday().number_days_from_monday() as i16;
        self.working_days.contains(&day)
    }
}
