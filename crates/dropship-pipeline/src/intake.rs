//! Validates and enqueues import requests; read-side projections of the job
//! store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dropship_core::{ExternalId, ImportJob, JobId, JobStore, Submission};
use tokio::sync::Notify;

use crate::error::IntakeError;

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;

/// Clamps a requested page size to `1..=MAX_LIST_LIMIT`, defaulting to
/// [`DEFAULT_LIST_LIMIT`].
#[must_use]
pub fn clamp_list_limit(requested: Option<i64>) -> usize {
    match requested {
        None => DEFAULT_LIST_LIMIT,
        Some(n) => usize::try_from(n.max(1))
            .unwrap_or(MAX_LIST_LIMIT)
            .min(MAX_LIST_LIMIT),
    }
}

#[derive(Clone)]
pub struct ImportIntake {
    jobs: Arc<dyn JobStore>,
    wake: Arc<Notify>,
}

impl ImportIntake {
    /// `wake` is the signal the worker pool idles on.
    pub fn new(jobs: Arc<dyn JobStore>, wake: Arc<Notify>) -> Self {
        Self { jobs, wake }
    }

    /// Validates `raw_id` and enqueues an import, or returns the job already
    /// in progress for that id.
    ///
    /// # Errors
    ///
    /// - [`IntakeError::InvalidExternalId`] for a malformed id.
    /// - [`IntakeError::Store`] if the job store fails.
    pub async fn submit(&self, raw_id: &str) -> Result<Submission, IntakeError> {
        let external_id = ExternalId::parse(raw_id)?;
        self.submit_id(&external_id).await
    }

    async fn submit_id(&self, external_id: &ExternalId) -> Result<Submission, IntakeError> {
        let submission = self.jobs.submit(external_id).await?;
        if submission.created {
            tracing::info!(
                job_id = %submission.job.id,
                ali_id = %external_id,
                "import job queued"
            );
            self.wake.notify_one();
        } else {
            tracing::debug!(
                job_id = %submission.job.id,
                ali_id = %external_id,
                status = %submission.job.status,
                "import already in progress"
            );
        }
        Ok(submission)
    }

    /// # Errors
    ///
    /// Returns [`IntakeError::Store`] if the job store fails.
    pub async fn get(&self, id: JobId) -> Result<Option<ImportJob>, IntakeError> {
        Ok(self.jobs.get(id).await?)
    }

    /// Newest first. `limit` is clamped by [`clamp_list_limit`].
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::Store`] if the job store fails.
    pub async fn list(&self, limit: Option<i64>) -> Result<Vec<ImportJob>, IntakeError> {
        Ok(self.jobs.list(clamp_list_limit(limit)).await?)
    }

    /// Re-imports up to `limit` items whose latest import completed before
    /// `cutoff`. Returns the jobs that were newly queued.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::Store`] if the job store fails.
    pub async fn resubmit_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ImportJob>, IntakeError> {
        let stale = self.jobs.stale_completed(cutoff, limit).await?;
        let mut queued = Vec::with_capacity(stale.len());
        for external_id in &stale {
            let submission = self.submit_id(external_id).await?;
            if submission.created {
                queued.push(submission.job);
            }
        }
        if !stale.is_empty() {
            tracing::info!(
                stale = stale.len(),
                queued = queued.len(),
                "refresh imports submitted"
            );
        }
        Ok(queued)
    }
}
