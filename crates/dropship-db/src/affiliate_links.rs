//! Database operations for `affiliate_links` and the tracking sequence.

use chrono::{DateTime, Utc};
use dropship_core::{AffiliateLink, CampaignTag, ExternalId};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `affiliate_links` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AffiliateLinkRow {
    pub id: i64,
    pub external_id: String,
    pub campaign: String,
    pub url: String,
    pub tracking_code: String,
    pub affiliate: bool,
    pub created_at: DateTime<Utc>,
}

impl AffiliateLinkRow {
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] if the stored id or campaign no longer
    /// validates.
    pub fn into_link(self) -> Result<AffiliateLink, DbError> {
        Ok(AffiliateLink {
            external_id: ExternalId::parse(&self.external_id)
                .map_err(|e| DbError::decode("external_id", e))?,
            campaign: CampaignTag::parse(&self.campaign)
                .map_err(|e| DbError::decode("campaign", e))?,
            url: self.url,
            tracking_code: self.tracking_code,
            affiliate: self.affiliate,
            created_at: self.created_at,
        })
    }
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_affiliate_link(
    pool: &PgPool,
    external_id: &str,
    campaign: &str,
) -> Result<Option<AffiliateLinkRow>, DbError> {
    let row = sqlx::query_as::<_, AffiliateLinkRow>(
        "SELECT id, external_id, campaign, url, tracking_code, affiliate, created_at \
         FROM affiliate_links WHERE external_id = $1 AND campaign = $2",
    )
    .bind(external_id)
    .bind(campaign)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Next value of `affiliate_tracking_seq`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] on a
/// negative sequence value.
pub async fn next_tracking_seq(pool: &PgPool) -> Result<u64, DbError> {
    let seq = sqlx::query_scalar::<_, i64>("SELECT nextval('affiliate_tracking_seq')")
        .fetch_one(pool)
        .await?;
    u64::try_from(seq).map_err(|e| DbError::decode("affiliate_tracking_seq", e))
}

/// Stores `link` unless a live row already exists for its key; returns the
/// row that ends up stored. Rows created before `live_since` are replaced.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn insert_or_get_affiliate_link(
    pool: &PgPool,
    link: &AffiliateLink,
    live_since: Option<DateTime<Utc>>,
) -> Result<AffiliateLinkRow, DbError> {
    let written = sqlx::query_as::<_, AffiliateLinkRow>(
        "INSERT INTO affiliate_links \
             (external_id, campaign, url, tracking_code, affiliate, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (external_id, campaign) DO UPDATE SET \
             url = EXCLUDED.url, \
             tracking_code = EXCLUDED.tracking_code, \
             affiliate = EXCLUDED.affiliate, \
             created_at = EXCLUDED.created_at \
         WHERE $7::timestamptz IS NOT NULL AND affiliate_links.created_at < $7 \
         RETURNING id, external_id, campaign, url, tracking_code, affiliate, created_at",
    )
    .bind(link.external_id.as_str())
    .bind(link.campaign.as_str())
    .bind(&link.url)
    .bind(&link.tracking_code)
    .bind(link.affiliate)
    .bind(link.created_at)
    .bind(live_since)
    .fetch_optional(pool)
    .await?;

    if let Some(row) = written {
        return Ok(row);
    }

    get_affiliate_link(pool, link.external_id.as_str(), link.campaign.as_str())
        .await?
        .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
}
