use dropship_core::{ErrorKind, FetchError};
use thiserror::Error;

use crate::client::DEFAULT_RETRY_AFTER_SECS;

/// Gateway `resp_code`s reporting that the app or caller exceeded its call quota.
pub const THROTTLED_CODES: &[i64] = &[7, 429];

/// Gateway `resp_code`s reporting an overloaded or failing upstream service.
pub const BUSY_CODES: &[i64] = &[15, 500, 502, 503, 504];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by marketplace (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("product not found: {url}")]
    NotFound { url: String },

    #[error("product {product_id} is no longer listed")]
    Delisted { product_id: String },

    #[error("marketplace rejected product id {product_id}: {reason}")]
    MalformedId { product_id: String, reason: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("marketplace returned error code {code}: {message}")]
    Gateway { code: i64, message: String },
}

impl SourceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        FetchError::from(self).kind()
    }
}

impl From<&SourceError> for FetchError {
    fn from(err: &SourceError) -> Self {
        match err {
            SourceError::Http(e) if e.is_timeout() => FetchError::Timeout,
            SourceError::Http(e) => FetchError::Unavailable {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            SourceError::Gateway { code, .. } if THROTTLED_CODES.contains(code) => {
                FetchError::RateLimited {
                    retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
                }
            }
            SourceError::Gateway { code, .. } if BUSY_CODES.contains(code) => {
                FetchError::Unavailable {
                    status: None,
                    message: err.to_string(),
                }
            }
            SourceError::Deserialize { .. } | SourceError::Gateway { .. } => {
                FetchError::MalformedResponse(err.to_string())
            }
            SourceError::RateLimited { retry_after_secs } => FetchError::RateLimited {
                retry_after_secs: *retry_after_secs,
            },
            SourceError::NotFound { url } => FetchError::NotFound(url.clone()),
            SourceError::Delisted { product_id } => FetchError::Delisted(product_id.clone()),
            SourceError::MalformedId { product_id, .. } => {
                FetchError::MalformedId(product_id.clone())
            }
            SourceError::UnexpectedStatus { status, .. } if *status >= 500 => {
                FetchError::Unavailable {
                    status: Some(*status),
                    message: err.to_string(),
                }
            }
            SourceError::UnexpectedStatus { .. } => FetchError::MalformedResponse(err.to_string()),
        }
    }
}

impl From<SourceError> for FetchError {
    fn from(err: SourceError) -> Self {
        FetchError::from(&err)
    }
}
