//! The import pipeline: intake, worker pool, rate limiting, retry policy,
//! listing transformation and affiliate link generation, written against the
//! collaborator traits in `dropship_core::ports`.

pub mod affiliate;
pub mod backoff;
pub mod category;
pub mod error;
pub mod intake;
pub mod memory;
pub mod rate_limit;
pub mod transform;
pub mod worker;

pub use affiliate::{AffiliateConfig, AffiliateLinkGenerator};
pub use backoff::{RetryDecision, RetryPolicy};
pub use category::{map_category, CategoryMapping, MappingSource};
pub use error::{AffiliateError, IntakeError, PipelineError, RateLimitError, TransformError};
pub use intake::{clamp_list_limit, ImportIntake};
pub use memory::{InMemoryAffiliateLinkStore, InMemoryCatalogStore, InMemoryJobStore};
pub use rate_limit::{RateLimiter, RatePermit};
pub use transform::Transformer;
pub use worker::{Pipeline, WorkerConfig, WorkerPool};
