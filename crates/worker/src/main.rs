//! Pawcare Blocking Worker
//!
//! Handles scheduled jobs including:
//! - Sweep schedule ticking (every minute, working-day gated)
//! - Notification sending after the configured delay (every 5 minutes)
//! - Notification retention purge (daily at 3:00 AM UTC)
//! - Invariant consistency checks (daily at 5:00 AM UTC)
//! - Health check heartbeat (every 5 minutes)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pawcare_blocking::{BlockingService, SweepSummary};
use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

/// Log results of one sweep cycle
fn log_sweep_summary(summary: &SweepSummary) {
    info!(
        checked = summary.checked,
        blocked = summary.blocked,
        resolved = summary.resolved,
        skipped = summary.skipped,
        errors = summary.errors.len(),
        "Sweep cycle complete"
    );
    for (provider_id, error) in &summary.errors {
        error!(provider_id = %provider_id, error = %error, "Provider check failed during sweep");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenvy::dotenv().ok();

    info!("Starting Pawcare Blocking Worker");

    let pool = create_db_pool().await?;

    info!("Running database migrations...");
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let blocking = match BlockingService::from_env(pool.clone()) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            // Without the ledger the worker cannot evaluate anything
            warn!(error = %e, "Failed to create blocking service - running in minimal mode");
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                info!("Worker heartbeat (minimal mode)");
            }
        }
    };

    blocking.settings.ensure().await?;
    info!("Blocking system settings ensured");

    let mailer = pawcare_blocking::ResendMailer::from_env();
    if mailer.is_enabled() {
        info!("Notification mail transport enabled");
    } else {
        warn!("Notification mail transport not configured (missing RESEND_API_KEY)");
    }

    // Set on shutdown; sweeps in flight stop between providers
    let cancel = Arc::new(AtomicBool::new(false));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Sweep schedule tick (every minute)
    // Claims due schedules and runs one sweep when any fired. Weekend/holiday
    // gating comes from the working-day configuration.
    let tick_blocking = blocking.clone();
    let tick_cancel = cancel.clone();
    scheduler
        .add(Job::new_async("0 * * * * *", move |_uuid, _l| {
            let blocking = tick_blocking.clone();
            let cancel = tick_cancel.clone();
            Box::pin(async move {
                let settings = match blocking.settings.get().await {
                    Ok(s) => s,
                    Err(e) => {
                        error!(error = %e, "Failed to load blocking settings");
                        return;
                    }
                };

                let claimed = match blocking.schedules.claim_due().await {
                    Ok(c) => c,
                    Err(e) => {
                        error!(error = %e, "Failed to claim due schedules");
                        return;
                    }
                };
                if claimed.is_empty() {
                    return;
                }

                let today = time::OffsetDateTime::now_utc().date();
                if !settings.is_working_day(today) {
                    info!(
                        fired = claimed.len(),
                        "Schedules fired on a non-working day, sweep skipped"
                    );
                    return;
                }

                info!(fired = claimed.len(), "Sweep schedules fired, starting sweep");
                match blocking.coordinator.sweep(&settings, &cancel).await {
                    Ok(summary) => log_sweep_summary(&summary),
                    Err(e) => error!(error = %e, "Sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Sweep schedule tick (every minute)");

    // Job 2: Send pending notifications (every 5 minutes)
    let sender_blocking = blocking.clone();
    let sender_mailer = mailer.clone();
    scheduler
        .add(Job::new_async("0 */5 * * * *", move |_uuid, _l| {
            let blocking = sender_blocking.clone();
            let mailer = sender_mailer.clone();
            Box::pin(async move {
                match blocking.notifications.send_pending(&mailer).await {
                    Ok(stats) if stats.due > 0 => {
                        info!(sent = stats.sent, failed = stats.failed, "Notifications sent")
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Notification send cycle failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Notification sender (every 5 minutes)");

    // Job 3: Purge expired notifications (daily at 3:00 AM UTC)
    let purge_blocking = blocking.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let blocking = purge_blocking.clone();
            Box::pin(async move {
                info!("Running notification retention purge");
                match blocking.notifications.purge_expired().await {
                    Ok(deleted) => info!(deleted = deleted, "Notification purge complete"),
                    Err(e) => error!(error = %e, "Notification purge failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Notification retention purge (daily at 3:00 AM UTC)");

    // Job 4: Invariant consistency checks (daily at 5:00 AM UTC)
    let invariant_blocking = blocking.clone();
    scheduler
        .add(Job::new_async("0 0 5 * * *", move |_uuid, _l| {
            let blocking = invariant_blocking.clone();
            Box::pin(async move {
                info!("Running blocking invariant checks");
                match blocking.invariants.run_all_checks().await {
                    Ok(summary) if summary.healthy => {
                        info!(checks = summary.checks_run, "All blocking invariants hold")
                    }
                    Ok(summary) => {
                        for violation in &summary.violations {
                            error!(
                                invariant = %violation.invariant,
                                severity = %violation.severity,
                                description = %violation.description,
                                "Blocking invariant violated"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "Invariant check run failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Invariant checks (daily at 5:00 AM UTC)");

    // Job 5: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("30 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Pawcare Blocking Worker started successfully with 5 scheduled jobs");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping sweeps");
    cancel.store(true, Ordering::Relaxed);

    Ok(())
}
