//! Database operations for `import_jobs`.
//!
//! Every worker state change is a single `UPDATE ... WHERE public_id = $1
//! AND status = $2 AND attempts = <claimed attempt>`; zero affected rows means
//! another writer got there first or the job has been claimed again.

use chrono::{DateTime, Utc};
use dropship_core::{
    CatalogItemId, ErrorKind, ExternalId, ImportJob, JobError, JobId, JobStatus,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const COLUMNS: &str = "id, public_id, external_id, status, attempts, error_kind, \
                       error_message, next_attempt_at, catalog_item_id, created_at, updated_at";

const TERMINAL: &str = "('completed', 'failed')";

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `import_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImportJobRow {
    pub id: i64,
    pub public_id: Uuid,
    pub external_id: String,
    pub status: String,
    pub attempts: i32,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub catalog_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportJobRow {
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] if a column holds a value the domain type
    /// rejects.
    pub fn into_job(self) -> Result<ImportJob, DbError> {
        let last_error = match (self.error_kind, self.error_message) {
            (Some(kind), Some(message)) => Some(JobError::new(
                kind.parse::<ErrorKind>()
                    .map_err(|e| DbError::decode("error_kind", e))?,
                message,
            )),
            _ => None,
        };

        Ok(ImportJob {
            id: JobId(self.public_id),
            external_id: ExternalId::parse(&self.external_id)
                .map_err(|e| DbError::decode("external_id", e))?,
            status: self
                .status
                .parse()
                .map_err(|e| DbError::decode("status", e))?,
            attempts: u32::try_from(self.attempts)
                .map_err(|e| DbError::decode("attempts", e))?,
            last_error,
            next_attempt_at: self.next_attempt_at,
            catalog_item_id: self.catalog_item_id.map(CatalogItemId),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Submission and reads
// ---------------------------------------------------------------------------

/// Inserts a `queued` job for `external_id` unless a non-terminal one exists.
///
/// Returns the job and whether it was created. The partial unique index on
/// `external_id` makes concurrent submits converge on a single row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn submit_import_job(
    pool: &PgPool,
    external_id: &str,
) -> Result<(ImportJobRow, bool), DbError> {
    // The active job can finish between the insert and the lookup; try again.
    for _ in 0..3 {
        let inserted = sqlx::query_as::<_, ImportJobRow>(&format!(
            "INSERT INTO import_jobs (public_id, external_id, status) \
             VALUES ($1, $2, 'queued') \
             ON CONFLICT (external_id) WHERE status NOT IN {TERMINAL} DO NOTHING \
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(external_id)
        .fetch_optional(pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row, true));
        }

        let existing = sqlx::query_as::<_, ImportJobRow>(&format!(
            "SELECT {COLUMNS} FROM import_jobs \
             WHERE external_id = $1 AND status NOT IN {TERMINAL}"
        ))
        .bind(external_id)
        .fetch_optional(pool)
        .await?;

        if let Some(row) = existing {
            return Ok((row, false));
        }
    }

    Err(DbError::Sqlx(sqlx::Error::RowNotFound))
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_import_job(pool: &PgPool, public_id: Uuid) -> Result<Option<ImportJobRow>, DbError> {
    let row = sqlx::query_as::<_, ImportJobRow>(&format!(
        "SELECT {COLUMNS} FROM import_jobs WHERE public_id = $1"
    ))
    .bind(public_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_import_jobs(pool: &PgPool, limit: i64) -> Result<Vec<ImportJobRow>, DbError> {
    let rows = sqlx::query_as::<_, ImportJobRow>(&format!(
        "SELECT {COLUMNS} FROM import_jobs \
         ORDER BY created_at DESC, public_id DESC \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Worker transitions
// ---------------------------------------------------------------------------

/// Claims the oldest actionable job, moving it to `fetching` and bumping
/// `attempts`. `SKIP LOCKED` lets concurrent workers claim different rows.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_next_import_job(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Option<ImportJobRow>, DbError> {
    let row = sqlx::query_as::<_, ImportJobRow>(&format!(
        "UPDATE import_jobs \
         SET status = 'fetching', attempts = attempts + 1, \
             next_attempt_at = NULL, updated_at = NOW() \
         WHERE id = ( \
             SELECT id FROM import_jobs \
             WHERE status = 'queued' \
                OR (status = 'retry_wait' AND (next_attempt_at IS NULL OR next_attempt_at <= $1)) \
             ORDER BY created_at, public_id \
             FOR UPDATE SKIP LOCKED \
             LIMIT 1 \
         ) \
         RETURNING {COLUMNS}"
    ))
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Moves a job from `from` to `to` for the worker holding claim `attempt`.
///
/// # Errors
///
/// Returns [`DbError::JobConflict`] if the job is not in `from` or has been
/// claimed again since `attempt`, [`DbError::JobNotFound`] if it does not
/// exist, or [`DbError::Sqlx`].
pub async fn advance_import_job(
    pool: &PgPool,
    public_id: Uuid,
    attempt: i32,
    from: JobStatus,
    to: JobStatus,
) -> Result<ImportJobRow, DbError> {
    let row = sqlx::query_as::<_, ImportJobRow>(&format!(
        "UPDATE import_jobs SET status = $4, updated_at = NOW() \
         WHERE public_id = $1 AND status = $2 AND attempts = $3 \
         RETURNING {COLUMNS}"
    ))
    .bind(public_id)
    .bind(from.as_str())
    .bind(attempt)
    .bind(to.as_str())
    .fetch_optional(pool)
    .await?;
    expect_transition(pool, public_id, from, row).await
}

/// `from -> retry_wait`, recording the error and when to try again.
///
/// # Errors
///
/// Same as [`advance_import_job`].
pub async fn schedule_import_retry(
    pool: &PgPool,
    public_id: Uuid,
    attempt: i32,
    from: JobStatus,
    error: &JobError,
    next_attempt_at: DateTime<Utc>,
) -> Result<ImportJobRow, DbError> {
    let row = sqlx::query_as::<_, ImportJobRow>(&format!(
        "UPDATE import_jobs \
         SET status = 'retry_wait', error_kind = $4, error_message = $5, \
             next_attempt_at = $6, updated_at = NOW() \
         WHERE public_id = $1 AND status = $2 AND attempts = $3 \
         RETURNING {COLUMNS}"
    ))
    .bind(public_id)
    .bind(from.as_str())
    .bind(attempt)
    .bind(error.kind.as_str())
    .bind(&error.message)
    .bind(next_attempt_at)
    .fetch_optional(pool)
    .await?;
    expect_transition(pool, public_id, from, row).await
}

/// `from -> failed`, recording the error.
///
/// # Errors
///
/// Same as [`advance_import_job`].
pub async fn fail_import_job(
    pool: &PgPool,
    public_id: Uuid,
    attempt: i32,
    from: JobStatus,
    error: &JobError,
) -> Result<ImportJobRow, DbError> {
    let row = sqlx::query_as::<_, ImportJobRow>(&format!(
        "UPDATE import_jobs \
         SET status = 'failed', error_kind = $4, error_message = $5, \
             next_attempt_at = NULL, updated_at = NOW() \
         WHERE public_id = $1 AND status = $2 AND attempts = $3 \
         RETURNING {COLUMNS}"
    ))
    .bind(public_id)
    .bind(from.as_str())
    .bind(attempt)
    .bind(error.kind.as_str())
    .bind(&error.message)
    .fetch_optional(pool)
    .await?;
    expect_transition(pool, public_id, from, row).await
}

/// `publishing -> completed`, linking the catalog item and clearing the last
/// error.
///
/// # Errors
///
/// Same as [`advance_import_job`].
pub async fn complete_import_job(
    pool: &PgPool,
    public_id: Uuid,
    attempt: i32,
    catalog_item_id: Uuid,
) -> Result<ImportJobRow, DbError> {
    let row = sqlx::query_as::<_, ImportJobRow>(&format!(
        "UPDATE import_jobs \
         SET status = 'completed', catalog_item_id = $3, error_kind = NULL, \
             error_message = NULL, next_attempt_at = NULL, updated_at = NOW() \
         WHERE public_id = $1 AND status = 'publishing' AND attempts = $2 \
         RETURNING {COLUMNS}"
    ))
    .bind(public_id)
    .bind(attempt)
    .bind(catalog_item_id)
    .fetch_optional(pool)
    .await?;
    expect_transition(pool, public_id, JobStatus::Publishing, row).await
}

async fn expect_transition(
    pool: &PgPool,
    public_id: Uuid,
    from: JobStatus,
    row: Option<ImportJobRow>,
) -> Result<ImportJobRow, DbError> {
    if let Some(row) = row {
        return Ok(row);
    }
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM import_jobs WHERE public_id = $1)",
    )
    .bind(public_id)
    .fetch_one(pool)
    .await?;

    if exists {
        Err(DbError::JobConflict {
            job_id: public_id,
            expected: from.as_str(),
        })
    } else {
        Err(DbError::JobNotFound(public_id))
    }
}

// ---------------------------------------------------------------------------
// Scheduling helpers
// ---------------------------------------------------------------------------

/// Earliest pending retry time.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn next_retry_at(pool: &PgPool) -> Result<Option<DateTime<Utc>>, DbError> {
    let at = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT MIN(next_attempt_at) FROM import_jobs WHERE status = 'retry_wait'",
    )
    .fetch_one(pool)
    .await?;
    Ok(at)
}

/// Returns jobs stranded in `fetching`/`transforming`/`publishing` by a
/// previous process to `queued`. `attempts` is left untouched.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn recover_in_flight_jobs(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE import_jobs SET status = 'queued', updated_at = NOW() \
         WHERE status IN ('fetching', 'transforming', 'publishing')",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// External ids whose most recent job completed before `cutoff` and that
/// have no job in progress, least recently refreshed first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn stale_completed_external_ids(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<String>, DbError> {
    let ids = sqlx::query_scalar::<_, String>(&format!(
        "SELECT latest.external_id FROM ( \
             SELECT DISTINCT ON (external_id) external_id, status, updated_at \
             FROM import_jobs \
             ORDER BY external_id, created_at DESC, public_id DESC \
         ) AS latest \
         WHERE latest.status = 'completed' \
           AND latest.updated_at < $1 \
           AND NOT EXISTS ( \
               SELECT 1 FROM import_jobs active \
               WHERE active.external_id = latest.external_id \
                 AND active.status NOT IN {TERMINAL} \
           ) \
         ORDER BY latest.updated_at \
         LIMIT $2"
    ))
    .bind(cutoff)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}
