//! Background job scheduler.
//!
//! Registers the periodic catalog refresh: items whose latest import
//! completed longer ago than the configured age are re-imported.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dropship_core::AppConfig;
use dropship_pipeline::ImportIntake;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Items re-queued per refresh tick.
pub const REFRESH_BATCH: usize = 100;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the cron expression is invalid or the
/// scheduler cannot be started.
pub async fn build_scheduler(
    intake: ImportIntake,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_refresh_job(&scheduler, intake, &config).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_refresh_job(
    scheduler: &JobScheduler,
    intake: ImportIntake,
    config: &AppConfig,
) -> Result<(), JobSchedulerError> {
    let max_age_hours = config.refresh_max_age_hours;

    let job = Job::new_async(config.refresh_cron.as_str(), move |_uuid, _lock| {
        let intake = intake.clone();
        Box::pin(async move {
            tracing::info!("scheduler: starting catalog refresh");
            run_refresh(&intake, max_age_hours).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(
        cron = %config.refresh_cron,
        max_age_hours,
        "scheduler: catalog refresh registered"
    );
    Ok(())
}

/// Re-submits up to [`REFRESH_BATCH`] stale items. Returns how many jobs
/// were queued.
pub async fn run_refresh(intake: &ImportIntake, max_age_hours: u64) -> usize {
    let cutoff = i64::try_from(max_age_hours)
        .ok()
        .and_then(Duration::try_hours)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    match intake.resubmit_stale(cutoff, REFRESH_BATCH).await {
        Ok(queued) => {
            tracing::info!(queued = queued.len(), "scheduler: catalog refresh complete");
            queued.len()
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: catalog refresh failed");
            0
        }
    }
}
