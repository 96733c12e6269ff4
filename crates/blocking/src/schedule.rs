//! Sweep schedules
//!
//! Operators define named schedules (hourly, daily, weekly, monthly or a
//! custom hour interval); the worker ticks frequently and fires a sweep for
//! any schedule whose `next_run` has arrived. Claiming a due schedule is a
//! single conditional UPDATE that stamps `last_run` and recomputes
//! `next_run`, so two concurrent ticks cannot fire the same schedule twice.

use sqlx::PgPool;
use time::{Duration, Month, OffsetDateTime, Time};
use uuid::Uuid;

use crate::error::{BlockingError, BlockingResult};
use crate::models::{BlockingSchedule, ScheduleFrequency};

/// Weekly schedules scan at most a full week ahead
const WEEK_DAYS: i64 = 7;

/// New or updated schedule definition
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ScheduleInput {
    pub name: String,
    pub frequency: String,
    pub run_time: Time,
    #[serde(default)]
    pub days_of_week: Vec<i16>,
    #[serde(default)]
    pub day_of_month: Option<i32>,
    #[serde(default)]
    pub custom_interval_hours: Option<i32>,
}

pub fn validate_schedule(input: &ScheduleInput) -> BlockingResult<ScheduleFrequency> {
    if input.name.trim().is_empty() {
        return Err(BlockingError::Validation("schedule name is required".into()));
    }
    let frequency = ScheduleFrequency::parse(&input.frequency).ok_or_else(|| {
        BlockingError::Validation(format!("unknown schedule frequency: {}", input.frequency))
    })?;
    match frequency {
        ScheduleFrequency::Weekly => {
            if input.days_of_week.is_empty() {
                return Err(BlockingError::Validation(
                    "weekly schedule needs at least one weekday".into(),
                ));
            }
            if input.days_of_week.iter().any(|d| !(0..=6).contains(d)) {
                return Err(BlockingError::Validation(
                    "weekdays must be 0 (Monday) through 6 (Sunday)".into(),
                ));
            }
        }
        ScheduleFrequency::Monthly => match input.day_of_month {
            Some(day) if (1..=31).contains(&day) => {}
            _ => {
                return Err(BlockingError::Validation(
                    "monthly schedule needs a day of month between 1 and 31".into(),
                ))
            }
        },
        ScheduleFrequency::Custom => match input.custom_interval_hours {
            Some(hours) if hours >= 1 => {}
            _ => {
                return Err(BlockingError::Validation(
                    "custom schedule needs a positive hour interval".into(),
                ))
            }
        },
        ScheduleFrequency::Hourly | ScheduleFrequency::Daily => {}
    }
    Ok(frequency)
}

/// Next fire time strictly after `now`.
///
/// Monthly schedules clamp the configured day to the target month's length,
/// so a day-31 schedule fires on the 30th (or 28th/29th) where needed.
pub fn compute_next_run(
    schedule: &BlockingSchedule,
    now: OffsetDateTime,
) -> Option<OffsetDateTime> {
    let frequency = ScheduleFrequency::parse(&schedule.frequency)?;
    match frequency {
        ScheduleFrequency::Hourly => Some(now + Duration::hours(1)),

        ScheduleFrequency::Daily => {
            let today = now.date().with_time(schedule.run_time).assume_utc();
            if today > now {
                Some(today)
            } else {
                Some(today + Duration::days(1))
            }
        }

        ScheduleFrequency::Weekly => {
            if schedule.days_of_week.is_empty() {
                return None;
            }
            for offset in 0..=WEEK_DAYS {
                let date = now.date() + Duration::days(offset);
                let weekday = date.weekday().number_days_from_monday() as i16;
                if schedule.days_of_week.contains(&weekday) {
                    let candidate = date.with_time(schedule.run_time).assume_utc();
                    if candidate > now {
                        return Some(candidate);
                    }
                }
            }
            None
        }

        ScheduleFrequency::Monthly => {
            let day = schedule.day_of_month?;
            let this_month =
                monthly_candidate(now.date().year(), now.date().month(), day, schedule.run_time)?;
            if this_month > now {
                return Some(this_month);
            }
            let (year, month) = match now.date().month() {
                Month::December => (now.date().year() + 1, Month::January),
                m => (now.date().year(), m.next()),
            };
            monthly_candidate(year, month, day, schedule.run_time)
        }

        ScheduleFrequency::Custom => {
            let hours = schedule.custom_interval_hours?;
            Some(now + Duration::hours(hours as i64))
        }
    }
}

fn monthly_candidate(year: i32, month: Month, day: i32, run_time: Time) -> Option<OffsetDateTime> {
    let last = time::util::days_in_year_month(year, month) as i32;
    let clamped = day.min(last).max(1) as u8;
    let date = time::Date::from_calendar_date(year, month, clamped).ok()?;
    Some(date.with_time(run_time).assume_utc())
}

pub struct ScheduleService {
    pool: PgPool,
}

impl ScheduleService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: ScheduleInput) -> BlockingResult<BlockingSchedule> {
        validate_schedule(&input)?;

        let schedule: BlockingSchedule = sqlx::query_as(
            r#"
            INSERT INTO blocking_schedules (
                name, frequency, run_time, days_of_week, day_of_month, custom_interval_hours
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.frequency)
        .bind(input.run_time)
        .bind(&input.days_of_week)
        .bind(input.day_of_month)
        .bind(input.custom_interval_hours)
        .fetch_one(&self.pool)
        .await?;

        self.reschedule(schedule.id).await
    }

    pub async fn update(
        &self,
        schedule_id: Uuid,
        input: ScheduleInput,
    ) -> BlockingResult<BlockingSchedule> {
        validate_schedule(&input)?;

        let updated = sqlx::query(
            r#"
            UPDATE blocking_schedules
            SET name = $2, frequency = $3, run_time = $4, days_of_week = $5,
                day_of_month = $6, custom_interval_hours = $7, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(schedule_id)
        .bind(&input.name)
        .bind(&input.frequency)
        .bind(input.run_time)
        .bind(&input.days_of_week)
        .bind(input.day_of_month)
        .bind(input.custom_interval_hours)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(BlockingError::NotFound("blocking schedule", schedule_id));
        }

        self.reschedule(schedule_id).await
    }

    pub async fn get(&self, schedule_id: Uuid) -> BlockingResult<BlockingSchedule> {
        sqlx::query_as("SELECT * FROM blocking_schedules WHERE id = $1")
            .bind(schedule_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(BlockingError::NotFound("blocking schedule", schedule_id))
    }

    pub async fn list(&self) -> BlockingResult<Vec<BlockingSchedule>> {
        let schedules = sqlx::query_as("SELECT * FROM blocking_schedules ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(schedules)
    }

    /// Enable or disable a schedule; enabling recomputes `next_run`
    pub async fn set_active(
        &self,
        schedule_id: Uuid,
        is_active: bool,
    ) -> BlockingResult<BlockingSchedule> {
        let updated = sqlx::query(
            "UPDATE blocking_schedules SET is_active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(schedule_id)
        .bind(is_active)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(BlockingError::NotFound("blocking schedule", schedule_id));
        }

        if is_active {
            self.reschedule(schedule_id).await
        } else {
            self.get(schedule_id).await
        }
    }

    /// Claim every schedule that is due.
    ///
    /// The conditional UPDATE stamps `last_run` and advances `next_run` in
    /// one statement, so a schedule is handed to exactly one worker tick even
    /// when ticks overlap.
    pub async fn claim_due(&self) -> BlockingResult<Vec<BlockingSchedule>> {
        let due: Vec<BlockingSchedule> = sqlx::query_as(
            r#"
            SELECT * FROM blocking_schedules
            WHERE is_active AND next_run IS NOT NULL AND next_run <= NOW()
            ORDER BY next_run
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let now = OffsetDateTime::now_utc();
        let mut claimed = Vec::new();
        for schedule in due {
            let next = compute_next_run(&schedule, now);
            let row: Option<BlockingSchedule> = sqlx::query_as(
                r#"
                UPDATE blocking_schedules
                SET last_run = NOW(), next_run = $2, updated_at = NOW()
                WHERE id = $1 AND is_active AND next_run <= NOW()
                RETURNING *
                "#,
            )
            .bind(schedule.id)
            .bind(next)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                tracing::info!(schedule_id = %row.id, name = %row.name, "Sweep schedule fired");
                claimed.push(row);
            }
        }
        Ok(claimed)
    }

    /// Operator "run now": stamp the schedule as fired and return it; the
    /// caller triggers the sweep.
    pub async fn run_now(&self, schedule_id: Uuid) -> BlockingResult<BlockingSchedule> {
        let schedule = self.get(schedule_id).await?;
        if !schedule.is_active {
            return Err(BlockingError::Validation(
                "cannot run a disabled schedule".into(),
            ));
        }

        let next = compute_next_run(&schedule, OffsetDateTime::now_utc());
        let row = sqlx::query_as(
            r#"
            UPDATE blocking_schedules
            SET last_run = NOW(), next_run = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(schedule_id)
        .bind(next)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(schedule_id = %schedule_id, "Sweep schedule run manually");
        Ok(row)
    }

    async fn reschedule(&self, schedule_id: Uuid) -> BlockingResult<BlockingSchedule> {
        let schedule = self.get(schedule_id).await?;
        let next = compute_next_run(&schedule, OffsetDateTime::now_utc());
        let row = sqlx::query_as(
            "UPDATE blocking_schedules SET next_run = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(schedule_id)
        .bind(next)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, time};

    fn schedule(frequency: &str) -> BlockingSchedule {
        BlockingSchedule {
            id: Uuid::new_v4(),
            name: "nightly".into(),
            frequency: frequency.into(),
            run_time: time!(03:00),
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

    #[test]
    fn test_hourly_next_run() {
        let now = datetime!(2026-08-24 10:15 UTC);
        let next = compute_next_run(&schedule("hourly"), now).unwrap();
        assert_eq!(next, datetime!(2026-08-24 11:15 UTC));
    }

    #[test]
    fn test_daily_before_and_after_run_time() {
        let s = schedule("daily");
        let before = datetime!(2026-08-24 01:00 UTC);
        assert_eq!(compute_next_run(&s, before).unwrap(), datetime!(2026-08-24 03:00 UTC));

        let after = datetime!(2026-08-24 04:00 UTC);
        assert_eq!(compute_next_run(&s, after).unwrap(), datetime!(2026-08-25 03:00 UTC));
    }

    #[test]
    fn test_weekly_picks_next_configured_weekday() {
        let mut s = schedule("weekly");
        s.days_of_week = vec![0, 3]; // Monday and Thursday
        // 2026-08-25 is a Tuesday
        let now = datetime!(2026-08-25 12:00 UTC);
        assert_eq!(compute_next_run(&s, now).unwrap(), datetime!(2026-08-27 03:00 UTC));
    }

    #[test]
    fn test_weekly_wraps_to_next_week() {
        let mut s = schedule("weekly");
        s.days_of_week = vec![0]; // Monday only
        // Monday after the run time: next fire is the following Monday
        let now = datetime!(2026-08-24 04:00 UTC);
        assert_eq!(compute_next_run(&s, now).unwrap(), datetime!(2026-08-31 03:00 UTC));
    }

    #[test]
    fn test_monthly_rolls_to_next_month() {
        let mut s = schedule("monthly");
        s.day_of_month = Some(5);
        let now = datetime!(2026-08-10 12:00 UTC);
        assert_eq!(compute_next_run(&s, now).unwrap(), datetime!(2026-09-05 03:00 UTC));
    }

    #[test]
    fn test_monthly_clamps_day_to_month_length() {
        let mut s = schedule("monthly");
        s.day_of_month = Some(31);
        let now = datetime!(2026-02-01 12:00 UTC);
        // February 2026 has 28 days
        assert_eq!(compute_next_run(&s, now).unwrap(), datetime!(2026-02-28 03:00 UTC));
    }

    #[test]
    fn test_custom_interval() {
        let mut s = schedule("custom");
        s.custom_interval_hours = Some(6);
        let now = datetime!(2026-08-24 10:00 UTC);
        assert_eq!(compute_next_run(&s, now).unwrap(), datetime!(2026-08-24 16:00 UTC));
    }

    #[test]
    fn test_next_run_is_strictly_in_the_future() {
        // A claim immediately followed by another tick must not be due again
        let mut s = schedule("daily");
        let now = datetime!(2026-08-24 03:00 UTC);
        let next = compute_next_run(&s, now).unwrap();
        assert!(next > now);

        s.days_of_week = vec![0];
        s.frequency = "weekly".into();
        let next = compute_next_run(&s, now).unwrap();
        assert!(next > now);
    }

    #[test]
    fn test_validate_weekly_requires_days() {
        let input = ScheduleInput {
            name: "weekly sweep".into(),
            frequency: "weekly".into(),
            run_time: time!(03:00),
            days_of_week: vec![],
            day_of_month: None,
            custom_interval_hours: None,
        };
        assert!(validate_schedule(&input).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_frequency() {
        let input = ScheduleInput {
            name: "sweep".into(),
            frequency: "fortnightly".into(),
            run_time: time!(03:00),
            days_of_week: vec![],
            day_of_month: None,
            custom_interval_hours: None,
        };
        assert!(validate_schedule(&input).is_err());
    }

    #[test]
    fn test_validate_monthly_day_range() {
        let mut input = ScheduleInput {
            name: "monthly sweep".into(),
            frequency: "monthly".into(),
            run_time: time!(03:00),
            days_of_week: vec![],
            day_of_month: Some(0),
            custom_interval_hours: None,
        };
        assert!(validate_schedule(&input).is_err());
        input.day_of_month = Some(15);
        assert!(validate_schedule(&input).is_ok());
    }
}
