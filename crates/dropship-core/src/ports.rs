//! Collaborator contracts the pipeline is written against.
//!
//! Each trait has a Postgres implementation in `dropship-db`, an in-memory
//! one in `dropship-pipeline::memory`, and (for [`ListingSource`]) HTTP and
//! simulated adapters in `dropship-source`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::affiliate::{AffiliateLink, CampaignTag};
use crate::catalog::{CatalogItem, CatalogItemId};
use crate::external_id::ExternalId;
use crate::jobs::{Claim, ErrorKind, ImportJob, JobError, JobId, JobStatus};
use crate::listing::Listing;

// ---------------------------------------------------------------------------
// Marketplace source
// ---------------------------------------------------------------------------

/// A typed failure from a marketplace source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("timed out fetching listing")]
    Timeout,

    #[error("marketplace unavailable: {message}")]
    Unavailable {
        status: Option<u16>,
        message: String,
    },

    #[error("rate limited by marketplace (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("listing {0} not found")]
    NotFound(String),

    #[error("listing {0} has been delisted")]
    Delisted(String),

    #[error("marketplace rejected id {0} as malformed")]
    MalformedId(String),

    #[error("malformed marketplace response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// Timeouts, 5xx/network failures and source-side throttling are worth
    /// retrying; everything else describes the listing itself.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Timeout | FetchError::Unavailable { .. } | FetchError::RateLimited { .. } => {
                ErrorKind::Transient
            }
            FetchError::NotFound(_)
            | FetchError::Delisted(_)
            | FetchError::MalformedId(_)
            | FetchError::MalformedResponse(_) => ErrorKind::Permanent,
        }
    }
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Rate-limiter scope for calls made through this adapter.
    fn source_key(&self) -> &str;

    /// Fetches one listing.
    ///
    /// # Errors
    ///
    /// Returns a classified [`FetchError`].
    async fn fetch(&self, external_id: &ExternalId) -> Result<Listing, FetchError>;
}

// ---------------------------------------------------------------------------
// Catalog store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("catalog store unavailable: {0}")]
    Unavailable(String),
}

impl PublishError {
    /// Publishing failures are always retryable: the upsert is idempotent.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Inserts or updates the item keyed by its external id and returns the
    /// item's stable id.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the store cannot be written.
    async fn upsert(&self, item: &CatalogItem) -> Result<CatalogItemId, PublishError>;

    /// # Errors
    ///
    /// Returns [`PublishError`] when the store cannot be read.
    async fn exists(&self, external_id: &ExternalId) -> Result<bool, PublishError>;
}

// ---------------------------------------------------------------------------
// Job store
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),

    /// A compare-and-set lost: the job was not in the expected status, or
    /// it has been claimed again since the caller's claim.
    #[error("job {job_id} is not in expected status {expected} for this claim")]
    Conflict { job_id: JobId, expected: JobStatus },

    #[error("transition {from} -> {to} is not allowed")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// Result of [`JobStore::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub job: ImportJob,
    /// `false` when an existing non-terminal job was returned instead.
    pub created: bool,
}

/// Durable job records. Every worker mutation is a compare-and-set on the
/// job's current status and the claim's attempt number; a lost race or a
/// superseded claim surfaces as [`StoreError::Conflict`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a `queued` job, or returns the existing non-terminal job for
    /// the same external id. Atomic with respect to concurrent submits.
    async fn submit(&self, external_id: &ExternalId) -> Result<Submission, StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<ImportJob>, StoreError>;

    /// Newest first.
    async fn list(&self, limit: usize) -> Result<Vec<ImportJob>, StoreError>;

    /// Atomically claims the oldest actionable job (by `created_at`, then id),
    /// moving it to `fetching` and incrementing `attempts`.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ImportJob>, StoreError>;

    /// Moves an in-flight job one stage forward.
    async fn advance(
        &self,
        claim: Claim,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<ImportJob, StoreError>;

    async fn schedule_retry(
        &self,
        claim: Claim,
        from: JobStatus,
        error: &JobError,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<ImportJob, StoreError>;

    async fn fail(
        &self,
        claim: Claim,
        from: JobStatus,
        error: &JobError,
    ) -> Result<ImportJob, StoreError>;

    /// `publishing -> completed`, recording the catalog item id.
    async fn complete(
        &self,
        claim: Claim,
        catalog_item_id: CatalogItemId,
    ) -> Result<ImportJob, StoreError>;

    /// Earliest `next_attempt_at` among `retry_wait` jobs.
    async fn next_wakeup(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Returns jobs left in an in-flight state by a previous process to
    /// `queued`. Returns how many were recovered.
    async fn recover_in_flight(&self) -> Result<u64, StoreError>;

    /// External ids whose most recent job completed before `cutoff` and that
    /// have no non-terminal job.
    async fn stale_completed(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExternalId>, StoreError>;
}

// ---------------------------------------------------------------------------
// Affiliate link cache
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AffiliateLinkStore: Send + Sync {
    async fn get(
        &self,
        external_id: &ExternalId,
        campaign: &CampaignTag,
    ) -> Result<Option<AffiliateLink>, StoreError>;

    /// Allocates the next tracking sequence number. Strictly increasing.
    async fn next_tracking_seq(&self) -> Result<u64, StoreError>;

    /// Stores `link` unless a live entry already exists for its key, and
    /// returns whichever entry ends up stored. Entries created before
    /// `live_since` count as expired and are replaced.
    async fn insert_or_get(
        &self,
        link: AffiliateLink,
        live_since: Option<DateTime<Utc>>,
    ) -> Result<AffiliateLink, StoreError>;
}
