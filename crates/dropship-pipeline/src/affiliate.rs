//! Deterministic affiliate deep links with a per-(item, campaign) cache.
//!
//! Generation never touches the network. The only non-deterministic input is
//! the tracking code, drawn from the store's monotonic sequence on a cache
//! miss; once stored, a link is returned verbatim until it expires.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dropship_core::{
    AffiliateLink, AffiliateLinkStore, AppConfig, CampaignTag, CampaignTagError, ExternalId,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::AffiliateError;

/// Query-component encoding: everything except unreserved characters.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone)]
pub struct AffiliateConfig {
    pub enabled: bool,
    pub item_base_url: String,
    pub deep_link_base: String,
    pub tracking_id: Option<String>,
    pub sub_id: Option<String>,
    pub default_campaign: CampaignTag,
    /// `None` caches forever.
    pub cache_ttl: Option<Duration>,
}

impl AffiliateConfig {
    /// # Errors
    ///
    /// Returns [`CampaignTagError`] if the configured default campaign is
    /// not a valid tag.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, CampaignTagError> {
        Ok(Self {
            enabled: config.affiliate_enabled,
            item_base_url: config.affiliate_item_base_url.clone(),
            deep_link_base: config.affiliate_deep_link_base.clone(),
            tracking_id: config.affiliate_tracking_id.clone(),
            sub_id: config.affiliate_sub_id.clone(),
            default_campaign: CampaignTag::parse(&config.affiliate_default_campaign)?,
            cache_ttl: (config.affiliate_cache_ttl_secs > 0)
                .then(|| Duration::from_secs(config.affiliate_cache_ttl_secs)),
        })
    }
}

#[derive(Clone)]
pub struct AffiliateLinkGenerator {
    config: AffiliateConfig,
    store: Arc<dyn AffiliateLinkStore>,
}

impl AffiliateLinkGenerator {
    pub fn new(config: AffiliateConfig, store: Arc<dyn AffiliateLinkStore>) -> Self {
        Self { config, store }
    }

    #[must_use]
    pub fn config(&self) -> &AffiliateConfig {
        &self.config
    }

    /// Returns the cached link for `(raw_id, campaign)` or creates one. A
    /// missing or blank campaign uses the configured default.
    ///
    /// # Errors
    ///
    /// - [`AffiliateError::InvalidExternalId`] / [`AffiliateError::InvalidCampaign`]
    ///   for malformed input.
    /// - [`AffiliateError::Store`] if the link cache fails.
    pub async fn generate(
        &self,
        raw_id: &str,
        campaign: Option<&str>,
    ) -> Result<AffiliateLink, AffiliateError> {
        let external_id = ExternalId::parse(raw_id)?;
        let campaign = match campaign.map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => CampaignTag::parse(raw)?,
            None => self.config.default_campaign.clone(),
        };

        let now = Utc::now();
        let live_since = self
            .config
            .cache_ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_sub_signed(ttl));

        if let Some(cached) = self.store.get(&external_id, &campaign).await? {
            if live_since.is_none_or(|since| cached.created_at >= since) {
                return Ok(cached);
            }
        }

        let seq = self.store.next_tracking_seq().await?;
        let tracking_code = tracking_code(seq);
        let url = self.compose_url(&external_id, &campaign, &tracking_code);
        let link = AffiliateLink {
            external_id,
            campaign,
            url,
            tracking_code,
            affiliate: self.config.enabled,
            created_at: now,
        };

        let stored = self.store.insert_or_get(link, live_since).await?;
        tracing::debug!(
            ali_id = %stored.external_id,
            campaign = %stored.campaign,
            tracking_code = %stored.tracking_code,
            "affiliate link generated"
        );
        Ok(stored)
    }

    #[must_use]
    pub fn item_url(&self, external_id: &ExternalId) -> String {
        format!(
            "{}/{}.html",
            self.config.item_base_url.trim_end_matches('/'),
            external_id
        )
    }

    /// The plain item page when affiliate links are disabled; otherwise the
    /// deep link with `dl`, optional `aff_pid`/`sub`, `campaign` and `tc`.
    #[must_use]
    pub fn compose_url(
        &self,
        external_id: &ExternalId,
        campaign: &CampaignTag,
        tracking_code: &str,
    ) -> String {
        let item_url = self.item_url(external_id);
        if !self.config.enabled {
            return item_url;
        }

        let mut params: Vec<(&str, &str)> = vec![("dl", item_url.as_str())];
        if let Some(pid) = self.config.tracking_id.as_deref() {
            params.push(("aff_pid", pid));
        }
        if let Some(sub) = self.config.sub_id.as_deref() {
            params.push(("sub", sub));
        }
        params.push(("campaign", campaign.as_str()));
        params.push(("tc", tracking_code));

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, QUERY_VALUE)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.config.deep_link_base)
    }
}

fn tracking_code(seq: u64) -> String {
    format!("AFF-{seq:08}")
}
