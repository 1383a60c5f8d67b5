//! Postgres-backed implementations of the pipeline's store ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dropship_core::{
    AffiliateLink, AffiliateLinkStore, CampaignTag, CatalogItem, CatalogItemId, CatalogStore,
    Claim, ExternalId, ImportJob, JobError, JobId, JobStatus, JobStore, PublishError, StoreError,
    Submission,
};
use sqlx::PgPool;

use crate::{affiliate_links, catalog_items, import_jobs, DbError};

fn store_error(err: DbError) -> StoreError {
    match err {
        DbError::JobNotFound(id) => StoreError::NotFound(JobId(id)),
        DbError::JobConflict { job_id, expected } => match expected.parse::<JobStatus>() {
            Ok(expected) => StoreError::Conflict {
                job_id: JobId(job_id),
                expected,
            },
            Err(e) => StoreError::backend(e),
        },
        other => StoreError::backend(other),
    }
}

fn publish_error(err: DbError) -> PublishError {
    PublishError::Unavailable(err.to_string())
}

fn limit_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// `attempts` is an `INTEGER` column; a claim beyond its range can never
/// match a row.
fn attempt_i32(claim: Claim) -> i32 {
    i32::try_from(claim.attempt).unwrap_or(-1)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn checked(from: JobStatus, to: JobStatus) -> Result<(), StoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition { from, to })
    }
}

fn job(row: import_jobs::ImportJobRow) -> Result<ImportJob, StoreError> {
    row.into_job().map_err(store_error)
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn submit(&self, external_id: &ExternalId) -> Result<Submission, StoreError> {
        let (row, created) = import_jobs::submit_import_job(&self.pool, external_id.as_str())
            .await
            .map_err(store_error)?;
        Ok(Submission {
            job: job(row)?,
            created,
        })
    }

    async fn get(&self, id: JobId) -> Result<Option<ImportJob>, StoreError> {
        import_jobs::get_import_job(&self.pool, id.0)
            .await
            .map_err(store_error)?
            .map(job)
            .transpose()
    }

    async fn list(&self, limit: usize) -> Result<Vec<ImportJob>, StoreError> {
        import_jobs::list_import_jobs(&self.pool, limit_i64(limit))
            .await
            .map_err(store_error)?
            .into_iter()
            .map(job)
            .collect()
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ImportJob>, StoreError> {
        import_jobs::claim_next_import_job(&self.pool, now)
            .await
            .map_err(store_error)?
            .map(job)
            .transpose()
    }

    async fn advance(
        &self,
        claim: Claim,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<ImportJob, StoreError> {
        if !(from.is_in_flight() && to.is_in_flight()) {
            return Err(StoreError::InvalidTransition { from, to });
        }
        checked(from, to)?;
        job(
            import_jobs::advance_import_job(
                &self.pool,
                claim.job_id.0,
                attempt_i32(claim),
                from,
                to,
            )
            .await
            .map_err(store_error)?,
        )
    }

    async fn schedule_retry(
        &self,
        claim: Claim,
        from: JobStatus,
        error: &JobError,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<ImportJob, StoreError> {
        checked(from, JobStatus::RetryWait)?;
        job(
            import_jobs::schedule_import_retry(
                &self.pool,
                claim.job_id.0,
                attempt_i32(claim),
                from,
                error,
                next_attempt_at,
            )
            .await
            .map_err(store_error)?,
        )
    }

    async fn fail(
        &self,
        claim: Claim,
        from: JobStatus,
        error: &JobError,
    ) -> Result<ImportJob, StoreError> {
        checked(from, JobStatus::Failed)?;
        job(
            import_jobs::fail_import_job(&self.pool, claim.job_id.0, attempt_i32(claim), from, error)
                .await
                .map_err(store_error)?,
        )
    }

    async fn complete(
        &self,
        claim: Claim,
        catalog_item_id: CatalogItemId,
    ) -> Result<ImportJob, StoreError> {
        job(
            import_jobs::complete_import_job(
                &self.pool,
                claim.job_id.0,
                attempt_i32(claim),
                catalog_item_id.0,
            )
            .await
            .map_err(store_error)?,
        )
    }

    async fn next_wakeup(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        import_jobs::next_retry_at(&self.pool)
            .await
            .map_err(store_error)
    }

    async fn recover_in_flight(&self) -> Result<u64, StoreError> {
        let recovered = import_jobs::recover_in_flight_jobs(&self.pool)
            .await
            .map_err(store_error)?;
        if recovered > 0 {
            tracing::info!(recovered, "re-queued jobs left in flight by a previous run");
        }
        Ok(recovered)
    }

    async fn stale_completed(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExternalId>, StoreError> {
        let raw = import_jobs::stale_completed_external_ids(&self.pool, cutoff, limit_i64(limit))
            .await
            .map_err(store_error)?;
        raw.iter()
            .map(|id| {
                ExternalId::parse(id)
                    .map_err(|e| store_error(DbError::decode("external_id", e)))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn upsert(&self, item: &CatalogItem) -> Result<CatalogItemId, PublishError> {
        catalog_items::upsert_catalog_item(&self.pool, item)
            .await
            .map(CatalogItemId)
            .map_err(publish_error)
    }

    async fn exists(&self, external_id: &ExternalId) -> Result<bool, PublishError> {
        catalog_items::catalog_item_exists(&self.pool, external_id.as_str())
            .await
            .map_err(publish_error)
    }
}

// ---------------------------------------------------------------------------
// Affiliate links
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgAffiliateLinkStore {
    pool: PgPool,
}

impl PgAffiliateLinkStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AffiliateLinkStore for PgAffiliateLinkStore {
    async fn get(
        &self,
        external_id: &ExternalId,
        campaign: &CampaignTag,
    ) -> Result<Option<AffiliateLink>, StoreError> {
        affiliate_links::get_affiliate_link(&self.pool, external_id.as_str(), campaign.as_str())
            .await
            .and_then(|row| row.map(affiliate_links::AffiliateLinkRow::into_link).transpose())
            .map_err(store_error)
    }

    async fn next_tracking_seq(&self) -> Result<u64, StoreError> {
        affiliate_links::next_tracking_seq(&self.pool)
            .await
            .map_err(store_error)
    }

    async fn insert_or_get(
        &self,
        link: AffiliateLink,
        live_since: Option<DateTime<Utc>>,
    ) -> Result<AffiliateLink, StoreError> {
        affiliate_links::insert_or_get_affiliate_link(&self.pool, &link, live_since)
            .await
            .and_then(affiliate_links::AffiliateLinkRow::into_link)
            .map_err(store_error)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn conflicts_keep_their_expected_status() {
        let id = Uuid::now_v7();
        let err = store_error(DbError::JobConflict {
            job_id: id,
            expected: "publishing",
        });
        assert!(matches!(
            err,
            StoreError::Conflict { job_id, expected: JobStatus::Publishing } if job_id.0 == id
        ));
    }

    #[test]
    fn missing_jobs_map_to_not_found() {
        let id = Uuid::now_v7();
        assert!(matches!(
            store_error(DbError::JobNotFound(id)),
            StoreError::NotFound(job_id) if job_id.0 == id
        ));
    }

    #[test]
    fn publish_failures_are_retryable() {
        let err = publish_error(DbError::from(sqlx::Error::PoolTimedOut));
        assert_eq!(err.kind(), dropship_core::ErrorKind::Transient);
    }

    #[test]
    fn out_of_range_attempts_never_match() {
        let job_id = dropship_core::JobId::new();
        assert_eq!(attempt_i32(Claim { job_id, attempt: 3 }), 3);
        assert_eq!(attempt_i32(Claim { job_id, attempt: u32::MAX }), -1);
    }

    #[test]
    fn huge_limits_saturate() {
        assert_eq!(limit_i64(usize::MAX), i64::MAX);
        assert_eq!(limit_i64(50), 50);
    }
}
