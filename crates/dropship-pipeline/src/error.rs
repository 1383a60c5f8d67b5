use dropship_core::{
    CampaignTagError, ErrorKind, ExternalIdError, FetchError, PublishError, StoreError,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limiter is shut down")]
    Cancelled,
}

impl RateLimitError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Cancelled
    }
}

/// A listing the transformer cannot map. Never retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("listing is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("listing field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl TransformError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Permanent
    }
}

/// Everything that can interrupt one job attempt.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("job store error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Fetch(e) => e.kind(),
            PipelineError::Transform(e) => e.kind(),
            PipelineError::Publish(e) => e.kind(),
            PipelineError::RateLimit(e) => e.kind(),
            PipelineError::Timeout { .. } | PipelineError::Store(_) => ErrorKind::Transient,
        }
    }
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid ali_id: {0}")]
    InvalidExternalId(#[from] ExternalIdError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntakeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntakeError::InvalidExternalId(_) => ErrorKind::InvalidInput,
            IntakeError::Store(_) => ErrorKind::Transient,
        }
    }
}

#[derive(Debug, Error)]
pub enum AffiliateError {
    #[error("invalid ali_id: {0}")]
    InvalidExternalId(#[from] ExternalIdError),

    #[error("invalid campaign: {0}")]
    InvalidCampaign(#[from] CampaignTagError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AffiliateError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            AffiliateError::InvalidExternalId(_) | AffiliateError::InvalidCampaign(_) => {
                ErrorKind::InvalidInput
            }
            AffiliateError::Store(_) => ErrorKind::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_kind_follows_cause() {
        assert_eq!(
            PipelineError::from(FetchError::Timeout).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            PipelineError::from(TransformError::MissingField("title")).kind(),
            ErrorKind::Permanent
        );
        assert_eq!(
            PipelineError::from(RateLimitError::Cancelled).kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            PipelineError::Timeout {
                stage: "publish",
                secs: 15
            }
            .kind(),
            ErrorKind::Transient
        );
    }

    #[test]
    fn invalid_input_errors() {
        assert_eq!(
            IntakeError::from(ExternalIdError::Empty).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            AffiliateError::from(CampaignTagError::Empty).kind(),
            ErrorKind::InvalidInput
        );
    }
}
