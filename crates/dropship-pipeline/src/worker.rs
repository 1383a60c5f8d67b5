//! Worker pool driving import jobs through fetch, transform and publish.
//!
//! Workers are independent tasks. Each claims the oldest actionable job,
//! runs it to completion or to its next failure, records the outcome, and
//! goes back for more. With nothing to do a worker idles until the intake's
//! wake signal, the next scheduled retry, or the poll interval, whichever
//! comes first.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dropship_core::{
    AppConfig, CatalogItemId, CatalogStore, FetchError, ImportJob, JobError, JobStatus,
    JobStore, ListingSource, StoreError,
};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::backoff::{RetryDecision, RetryPolicy};
use crate::error::PipelineError;
use crate::rate_limit::RateLimiter;
use crate::transform::Transformer;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub publish_timeout: Duration,
    pub retry: RetryPolicy,
}

impl WorkerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            publish_timeout: Duration::from_secs(config.publish_timeout_secs),
            retry: RetryPolicy::new(
                config.retry_max_attempts,
                Duration::from_millis(config.retry_backoff_base_ms),
                Duration::from_millis(config.retry_backoff_cap_ms),
            ),
        }
    }
}

/// Everything one job attempt needs. Shared by all workers.
pub struct Pipeline {
    pub jobs: Arc<dyn JobStore>,
    pub source: Arc<dyn ListingSource>,
    pub catalog: Arc<dyn CatalogStore>,
    pub limiter: Arc<RateLimiter>,
    pub transformer: Transformer,
    pub config: WorkerConfig,
}

impl Pipeline {
    /// Claims and processes at most one job. Returns `false` when nothing was
    /// actionable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if the claim itself fails; failures inside
    /// the attempt are recorded on the job.
    pub async fn run_once(&self) -> Result<bool, StoreError> {
        let Some(job) = self.jobs.claim_next(Utc::now()).await? else {
            return Ok(false);
        };

        tracing::info!(
            job_id = %job.id,
            ali_id = %job.external_id,
            attempt = job.attempts,
            "import attempt started"
        );

        let mut stage = JobStatus::Fetching;
        match self.attempt(&job, &mut stage).await {
            Ok(catalog_item_id) => {
                tracing::info!(
                    job_id = %job.id,
                    ali_id = %job.external_id,
                    attempt = job.attempts,
                    catalog_item_id = %catalog_item_id,
                    "import completed"
                );
            }
            Err(err) => self.record_failure(&job, stage, &err).await,
        }
        Ok(true)
    }

    async fn attempt(
        &self,
        job: &ImportJob,
        stage: &mut JobStatus,
    ) -> Result<CatalogItemId, PipelineError> {
        let permit = self.limiter.acquire(self.source.source_key()).await?;
        let fetched = tokio::time::timeout(
            self.config.fetch_timeout,
            self.source.fetch(&job.external_id),
        )
        .await;
        permit.release();
        let listing = fetched.map_err(|_| PipelineError::Timeout {
            stage: "fetch",
            secs: self.config.fetch_timeout.as_secs(),
        })??;

        self.advance(job, stage, JobStatus::Transforming).await?;
        let item = self.transformer.transform(&listing)?;
        if item.external_id != job.external_id {
            return Err(FetchError::MalformedResponse(format!(
                "source returned listing {} for {}",
                item.external_id, job.external_id
            ))
            .into());
        }

        self.advance(job, stage, JobStatus::Publishing).await?;
        let catalog_item_id =
            tokio::time::timeout(self.config.publish_timeout, self.catalog.upsert(&item))
                .await
                .map_err(|_| PipelineError::Timeout {
                    stage: "publish",
                    secs: self.config.publish_timeout.as_secs(),
                })??;

        self.jobs.complete(job.claim(), catalog_item_id).await?;
        Ok(catalog_item_id)
    }

    async fn advance(
        &self,
        job: &ImportJob,
        stage: &mut JobStatus,
        to: JobStatus,
    ) -> Result<(), PipelineError> {
        self.jobs.advance(job.claim(), *stage, to).await?;
        *stage = to;
        Ok(())
    }

    async fn record_failure(&self, job: &ImportJob, stage: JobStatus, err: &PipelineError) {
        if let PipelineError::Store(StoreError::Conflict { .. }) = err {
            tracing::warn!(
                job_id = %job.id,
                ali_id = %job.external_id,
                error = %err,
                "job was reclaimed or changed underneath this worker; leaving it alone"
            );
            return;
        }

        let kind = err.kind();
        let retry_after = match err {
            PipelineError::Fetch(FetchError::RateLimited { retry_after_secs }) => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        };
        let job_error = JobError::new(kind, err.to_string());

        let outcome = match self.config.retry.decide(kind, job.attempts, retry_after) {
            RetryDecision::Retry { delay } => {
                let next_attempt_at = after(Utc::now(), delay);
                tracing::warn!(
                    job_id = %job.id,
                    ali_id = %job.external_id,
                    attempt = job.attempts,
                    max_attempts = self.config.retry.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "import attempt failed; retrying"
                );
                self.jobs
                    .schedule_retry(job.claim(), stage, &job_error, next_attempt_at)
                    .await
            }
            RetryDecision::Fail => {
                tracing::error!(
                    job_id = %job.id,
                    ali_id = %job.external_id,
                    attempt = job.attempts,
                    kind = %kind,
                    error = %err,
                    "import failed"
                );
                self.jobs.fail(job.claim(), stage, &job_error).await
            }
            RetryDecision::Abandon => {
                tracing::info!(
                    job_id = %job.id,
                    ali_id = %job.external_id,
                    status = %stage,
                    "import interrupted by shutdown; job left for recovery"
                );
                return;
            }
        };

        if let Err(store_err) = outcome {
            tracing::error!(
                job_id = %job.id,
                error = %store_err,
                "failed to record import outcome"
            );
        }
    }

    /// How long an idle worker should wait before polling again.
    async fn idle_duration(&self) -> Duration {
        let poll = self.config.poll_interval;
        match self.jobs.next_wakeup().await {
            Ok(Some(at)) => (at - Utc::now()).to_std().unwrap_or(Duration::ZERO).min(poll),
            Ok(None) => poll,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read next retry time");
                poll
            }
        }
    }
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A running set of workers sharing one [`Pipeline`].
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    limiter: Arc<RateLimiter>,
    wake: Arc<Notify>,
}

impl WorkerPool {
    /// Spawns `pipeline.config.worker_count` workers on the current runtime.
    /// `wake` should be the same signal the intake notifies.
    pub fn spawn(pipeline: Arc<Pipeline>, wake: Arc<Notify>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let count = pipeline.config.worker_count.max(1);

        let handles = (0..count)
            .map(|worker| {
                let pipeline = Arc::clone(&pipeline);
                let wake = Arc::clone(&wake);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(run_worker(worker, pipeline, wake, shutdown_rx))
            })
            .collect();

        tracing::info!(workers = count, "worker pool started");
        Self {
            handles,
            shutdown_tx,
            limiter: Arc::clone(&pipeline.limiter),
            wake,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Cancels pending limiter waits, tells every worker to stop after its
    /// current step, and waits for them to exit.
    pub async fn shutdown(self) {
        self.limiter.shutdown();
        let _ = self.shutdown_tx.send(true);
        self.wake.notify_waiters();

        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "worker task panicked");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

async fn run_worker(
    worker: usize,
    pipeline: Arc<Pipeline>,
    wake: Arc<Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::debug!(worker, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match pipeline.run_once().await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(worker, error = %err, "failed to claim next job");
            }
        }

        let idle = pipeline.idle_duration().await;
        tokio::select! {
            () = wake.notified() => {}
            () = tokio::time::sleep(idle) => {}
            changed = shutdown_rx.changed() => {
                // Sender gone means the pool was dropped without a shutdown.
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(worker, "worker stopped");
}
