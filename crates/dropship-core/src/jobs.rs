//! Import jobs and their state machine.
//!
//! ```text
//! queued ─┐
//!         ├─> fetching ─> transforming ─> publishing ─> completed
//! retry_wait ─┘    │            │              │
//!                  └────────────┴──────────────┴─> retry_wait | failed
//! ```
//!
//! In-flight states may also fall back to `queued` when a restarted process
//! recovers jobs abandoned by its predecessor.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::CatalogItemId;
use crate::external_id::ExternalId;

/// Server-generated job identifier. UUIDv7, so ids sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Fetching,
    Transforming,
    Publishing,
    RetryWait,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Queued,
        JobStatus::Fetching,
        JobStatus::Transforming,
        JobStatus::Publishing,
        JobStatus::RetryWait,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Fetching => "fetching",
            JobStatus::Transforming => "transforming",
            JobStatus::Publishing => "publishing",
            JobStatus::RetryWait => "retry_wait",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` are terminal; every other state holds the
    /// external id's single non-terminal slot.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// States a worker is currently driving.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            JobStatus::Fetching | JobStatus::Transforming | JobStatus::Publishing
        )
    }

    /// States a worker may claim from (subject to `next_attempt_at` for
    /// `retry_wait`).
    #[must_use]
    pub fn is_claimable(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::RetryWait)
    }

    /// Returns `true` if the scheduler may move a job from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::{Completed, Failed, Fetching, Publishing, Queued, RetryWait, Transforming};
        match (self, next) {
            (Queued | RetryWait, Fetching)
            | (Fetching, Transforming)
            | (Transforming, Publishing)
            | (Publishing, Completed) => true,
            (Fetching | Transforming | Publishing, RetryWait | Failed | Queued) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_owned()))
    }
}

/// Error taxonomy shared by every pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Client-caused; surfaced immediately and never retried.
    InvalidInput,
    /// Network or availability problem; retried with backoff.
    Transient,
    /// Retrying cannot help (not found, delisted, malformed listing).
    Permanent,
    /// Shutdown interrupted the work; the job stays resumable.
    Cancelled,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid_input" => Ok(ErrorKind::InvalidInput),
            "transient" => Ok(ErrorKind::Transient),
            "permanent" => Ok(ErrorKind::Permanent),
            "cancelled" => Ok(ErrorKind::Cancelled),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// The error recorded on a job when it enters `retry_wait` or `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Ownership of one attempt at a job. Every claim bumps `attempts`, so a
/// worker whose job was recovered and claimed again holds a stale attempt
/// number and its writes are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Claim {
    pub job_id: JobId,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: JobId,
    pub external_id: ExternalId,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<JobError>,
    /// Earliest time a `retry_wait` job may be claimed again.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Set only once the job reaches `completed`.
    pub catalog_item_id: Option<CatalogItemId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportJob {
    /// A freshly submitted job in `queued`.
    #[must_use]
    pub fn queued(external_id: ExternalId, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            external_id,
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
            catalog_item_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The claim a worker holds after [`JobStore::claim_next`] returned this
    /// job.
    ///
    /// [`JobStore::claim_next`]: crate::JobStore::claim_next
    #[must_use]
    pub fn claim(&self) -> Claim {
        Claim {
            job_id: self.id,
            attempt: self.attempts,
        }
    }

    /// Whether a worker may claim this job at `now`.
    #[must_use]
    pub fn is_actionable_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Queued => true,
            JobStatus::RetryWait => self.next_attempt_at.is_none_or(|at| at <= now),
            _ => false,
        }
    }
}
