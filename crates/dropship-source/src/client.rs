use std::time::Duration;

use async_trait::async_trait;
use dropship_core::{ExternalId, FetchError, Listing, ListingSource};
use reqwest::Client;

use crate::error::SourceError;
use crate::normalize::{first_product, normalize_product};
use crate::types::ProductDetailEnvelope;

/// Rate-limiter scope for the live marketplace.
pub const SOURCE_KEY: &str = "aliexpress";

pub(crate) const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// HTTP client for the AliExpress product-detail endpoint.
///
/// Maps 404, 429 and other non-2xx responses to typed [`SourceError`]s.
/// It does not retry: the worker pool owns retry and backoff so that every
/// attempt is visible on the job record.
pub struct AliExpressClient {
    client: Client,
    base_url: String,
    app_key: Option<String>,
}

impl AliExpressClient {
    /// Creates a client with the configured timeout and `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        base_url: &str,
        app_key: Option<String>,
        timeout_secs: u64,
        user_agent: &str,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            app_key,
        })
    }

    fn product_url(&self, external_id: &ExternalId) -> String {
        format!("{}/product/{}", self.base_url, external_id)
    }

    /// Fetches and unwraps the product-detail envelope for one id.
    ///
    /// # Errors
    ///
    /// - [`SourceError::RateLimited`] on HTTP 429.
    /// - [`SourceError::NotFound`] on HTTP 404.
    /// - [`SourceError::MalformedId`] on HTTP 400 or 422.
    /// - [`SourceError::UnexpectedStatus`] for any other non-2xx status.
    /// - [`SourceError::Http`] on network failure or timeout.
    /// - [`SourceError::Deserialize`] if the body does not match the envelope.
    /// - [`SourceError::Delisted`] / [`SourceError::Gateway`] from
    ///   [`first_product`].
    pub async fn fetch_product(&self, external_id: &ExternalId) -> Result<Listing, SourceError> {
        let url = self.product_url(external_id);

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(key) = &self.app_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(SourceError::RateLimited { retry_after_secs });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound { url });
        }

        if status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            let reason = response.text().await.unwrap_or_default();
            return Err(SourceError::MalformedId {
                product_id: external_id.to_string(),
                reason,
            });
        }

        if !status.is_success() {
            return Err(SourceError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        let envelope = serde_json::from_str::<ProductDetailEnvelope>(&body).map_err(|e| {
            SourceError::Deserialize {
                context: format!("product detail for {external_id}"),
                source: e,
            }
        })?;

        let product = first_product(envelope, external_id.as_str())?;
        Ok(normalize_product(product))
    }
}

#[async_trait]
impl ListingSource for AliExpressClient {
    fn source_key(&self) -> &str {
        SOURCE_KEY
    }

    async fn fetch(&self, external_id: &ExternalId) -> Result<Listing, FetchError> {
        self.fetch_product(external_id).await.map_err(|err| {
            tracing::debug!(ali_id = %external_id, error = %err, "marketplace fetch failed");
            FetchError::from(err)
        })
    }
}
