pub mod affiliate;
pub mod app_config;
pub mod catalog;
pub mod config;
pub mod external_id;
pub mod jobs;
pub mod listing;
pub mod ports;

use thiserror::Error;

pub use affiliate::{AffiliateLink, CampaignTag, CampaignTagError};
pub use app_config::{AppConfig, Environment};
pub use catalog::{CatalogItem, CatalogItemId, CatalogVariant};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use external_id::{ExternalId, ExternalIdError};
pub use jobs::{Claim, ErrorKind, ImportJob, JobError, JobId, JobStatus};
pub use listing::{Listing, ListingVariant};
pub use ports::{
    AffiliateLinkStore, CatalogStore, FetchError, JobStore, ListingSource, PublishError,
    StoreError, Submission,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
