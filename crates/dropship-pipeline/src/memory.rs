//! In-memory store implementations, used when no database is configured and
//! throughout the tests.
//!
//! Jobs live in an arena of individually locked records. Workers only
//! serialize on the short claim step, which walks an ordered index of
//! claimable jobs; every other transition locks just the job it touches.
//! Lock order is `active`, then `jobs`, then `ready`, then a record, and no
//! record lock is held while taking another lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dropship_core::{
    AffiliateLink, AffiliateLinkStore, CampaignTag, CatalogItem, CatalogItemId, CatalogStore,
    Claim, ExternalId, ImportJob, JobError, JobId, JobStatus, JobStore, PublishError, StoreError,
    Submission,
};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(rw: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rw.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(rw: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rw.write().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

type JobCell = Arc<Mutex<ImportJob>>;

/// Claim order: creation time, then id.
type ReadyKey = (DateTime<Utc>, JobId);

fn ready_key(job: &ImportJob) -> ReadyKey {
    (job.created_at, job.id)
}

/// Compare-and-set on one record: `from` must be the current status and the
/// claim must be the latest one.
fn transition(
    job: &mut ImportJob,
    claim: Claim,
    from: JobStatus,
    to: JobStatus,
) -> Result<(), StoreError> {
    if !from.can_transition_to(to) {
        return Err(StoreError::InvalidTransition { from, to });
    }
    if job.status != from || job.attempts != claim.attempt {
        return Err(StoreError::Conflict {
            job_id: claim.job_id,
            expected: from,
        });
    }
    job.status = to;
    job.updated_at = Utc::now();
    Ok(())
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobCell>>,
    /// The single non-terminal job per external id.
    active: Mutex<HashMap<ExternalId, JobId>>,
    /// Jobs in `queued` or `retry_wait`.
    ready: Mutex<BTreeMap<ReadyKey, JobCell>>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, id: JobId) -> Result<JobCell, StoreError> {
        read(&self.jobs)
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn snapshot(&self) -> Vec<ImportJob> {
        let cells: Vec<JobCell> = read(&self.jobs).values().cloned().collect();
        cells.iter().map(|cell| lock(cell).clone()).collect()
    }

    fn mark_ready(&self, cell: JobCell) {
        let key = ready_key(&lock(&cell));
        lock(&self.ready).insert(key, cell);
    }

    fn release_slot(&self, job: &ImportJob) {
        let mut active = lock(&self.active);
        if active.get(&job.external_id) == Some(&job.id) {
            active.remove(&job.external_id);
        }
    }

    /// Applies `update` to the claimed job under its record lock and returns
    /// the updated copy.
    fn update(
        &self,
        claim: Claim,
        from: JobStatus,
        to: JobStatus,
        update: impl FnOnce(&mut ImportJob),
    ) -> Result<(ImportJob, JobCell), StoreError> {
        let cell = self.cell(claim.job_id)?;
        let job = {
            let mut job = lock(&cell);
            transition(&mut job, claim, from, to)?;
            update(&mut job);
            job.clone()
        };
        Ok((job, cell))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn submit(&self, external_id: &ExternalId) -> Result<Submission, StoreError> {
        let mut active = lock(&self.active);
        if let Some(id) = active.get(external_id).copied() {
            let existing_cell = self.cell(id)?;
            let existing = lock(&existing_cell).clone();
            // A job that just finished may not have released its slot yet.
            if !existing.status.is_terminal() {
                return Ok(Submission {
                    job: existing,
                    created: false,
                });
            }
        }

        let job = ImportJob::queued(external_id.clone(), Utc::now());
        let cell = Arc::new(Mutex::new(job.clone()));
        active.insert(external_id.clone(), job.id);
        write(&self.jobs).insert(job.id, Arc::clone(&cell));
        lock(&self.ready).insert(ready_key(&job), cell);
        Ok(Submission { job, created: true })
    }

    async fn get(&self, id: JobId) -> Result<Option<ImportJob>, StoreError> {
        let cell = read(&self.jobs).get(&id).cloned();
        Ok(cell.map(|cell| lock(&cell).clone()))
    }

    async fn list(&self, limit: usize) -> Result<Vec<ImportJob>, StoreError> {
        let mut jobs = self.snapshot();
        jobs.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ImportJob>, StoreError> {
        let mut ready = lock(&self.ready);
        let mut claimed = None;
        let mut drop_keys = Vec::new();

        for (key, cell) in ready.iter() {
            let mut job = lock(cell);
            if !matches!(job.status, JobStatus::Queued | JobStatus::RetryWait) {
                drop_keys.push(*key);
                continue;
            }
            if !job.is_actionable_at(now) {
                continue;
            }
            job.status = JobStatus::Fetching;
            job.attempts += 1;
            job.next_attempt_at = None;
            job.updated_at = Utc::now();
            claimed = Some((*key, job.clone()));
            break;
        }

        for key in drop_keys {
            ready.remove(&key);
        }
        Ok(claimed.map(|(key, job)| {
            ready.remove(&key);
            job
        }))
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
        self.update(claim, from, to, |_| {}).map(|(job, _)| job)
    }

    async fn schedule_retry(
        &self,
        claim: Claim,
        from: JobStatus,
        error: &JobError,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<ImportJob, StoreError> {
        let (job, cell) = self.update(claim, from, JobStatus::RetryWait, |job| {
            job.last_error = Some(error.clone());
            job.next_attempt_at = Some(next_attempt_at);
        })?;
        self.mark_ready(cell);
        Ok(job)
    }

    async fn fail(
        &self,
        claim: Claim,
        from: JobStatus,
        error: &JobError,
    ) -> Result<ImportJob, StoreError> {
        let (job, _) = self.update(claim, from, JobStatus::Failed, |job| {
            job.last_error = Some(error.clone());
            job.next_attempt_at = None;
        })?;
        self.release_slot(&job);
        Ok(job)
    }

    async fn complete(
        &self,
        claim: Claim,
        catalog_item_id: CatalogItemId,
    ) -> Result<ImportJob, StoreError> {
        let (job, _) = self.update(
            claim,
            JobStatus::Publishing,
            JobStatus::Completed,
            |job| {
                job.catalog_item_id = Some(catalog_item_id);
                job.last_error = None;
                job.next_attempt_at = None;
            },
        )?;
        self.release_slot(&job);
        Ok(job)
    }

    async fn next_wakeup(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let ready = lock(&self.ready);
        Ok(ready
            .values()
            .filter_map(|cell| {
                let job = lock(cell);
                (job.status == JobStatus::RetryWait)
                    .then_some(job.next_attempt_at)
                    .flatten()
            })
            .min())
    }

    async fn recover_in_flight(&self) -> Result<u64, StoreError> {
        let cells: Vec<JobCell> = read(&self.jobs).values().cloned().collect();
        let now = Utc::now();
        let mut recovered = 0;
        for cell in cells {
            let requeued = {
                let mut job = lock(&cell);
                if job.status.is_in_flight() {
                    job.status = JobStatus::Queued;
                    job.updated_at = now;
                    true
                } else {
                    false
                }
            };
            if requeued {
                self.mark_ready(cell);
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn stale_completed(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExternalId>, StoreError> {
        let jobs = self.snapshot();

        let mut latest: HashMap<&ExternalId, &ImportJob> = HashMap::new();
        for job in &jobs {
            latest
                .entry(&job.external_id)
                .and_modify(|current| {
                    if (job.created_at, job.id) > (current.created_at, current.id) {
                        *current = job;
                    }
                })
                .or_insert(job);
        }

        let active = lock(&self.active);
        let mut stale: Vec<&ImportJob> = latest
            .into_values()
            .filter(|j| j.status == JobStatus::Completed && j.updated_at < cutoff)
            .filter(|j| !active.contains_key(&j.external_id))
            .collect();
        stale.sort_by_key(|j| (j.updated_at, j.id));
        Ok(stale
            .into_iter()
            .take(limit)
            .map(|j| j.external_id.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    items: Mutex<HashMap<ExternalId, (CatalogItemId, CatalogItem)>>,
}

impl InMemoryCatalogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, external_id: &ExternalId) -> Option<(CatalogItemId, CatalogItem)> {
        lock(&self.items).get(external_id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn upsert(&self, item: &CatalogItem) -> Result<CatalogItemId, PublishError> {
        let mut items = lock(&self.items);
        let id = items
            .get(&item.external_id)
            .map_or_else(|| CatalogItemId(Uuid::new_v4()), |(id, _)| *id);
        items.insert(item.external_id.clone(), (id, item.clone()));
        Ok(id)
    }

    async fn exists(&self, external_id: &ExternalId) -> Result<bool, PublishError> {
        Ok(lock(&self.items).contains_key(external_id))
    }
}

// ---------------------------------------------------------------------------
// Affiliate links
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryAffiliateLinkStore {
    links: Mutex<HashMap<(ExternalId, CampaignTag), AffiliateLink>>,
    seq: AtomicU64,
}

impl InMemoryAffiliateLinkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AffiliateLinkStore for InMemoryAffiliateLinkStore {
    async fn get(
        &self,
        external_id: &ExternalId,
        campaign: &CampaignTag,
    ) -> Result<Option<AffiliateLink>, StoreError> {
        Ok(lock(&self.links)
            .get(&(external_id.clone(), campaign.clone()))
            .cloned())
    }

    async fn next_tracking_seq(&self) -> Result<u64, StoreError> {
        Ok(self.seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn insert_or_get(
        &self,
        link: AffiliateLink,
        live_since: Option<DateTime<Utc>>,
    ) -> Result<AffiliateLink, StoreError> {
        let mut links = lock(&self.links);
        let key = (link.external_id.clone(), link.campaign.clone());
        if let Some(existing) = links.get(&key) {
            let live = live_since.is_none_or(|since| existing.created_at >= since);
            if live {
                return Ok(existing.clone());
            }
        }
        links.insert(key, link.clone());
        Ok(link)
    }
}
