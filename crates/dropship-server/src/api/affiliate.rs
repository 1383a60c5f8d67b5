use axum::{
    extract::{Query, State},
    Extension, Json,
};
use dropship_core::AffiliateLink;
use dropship_pipeline::AffiliateError;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct AffiliateQuery {
    ali_id: Option<String>,
    campaign: Option<String>,
}

/// Carries no timestamps, so repeated requests for a cached link are
/// byte-identical. `link` duplicates `url` for older clients.
#[derive(Debug, Serialize)]
pub(super) struct AffiliateLinkItem {
    url: String,
    link: String,
    tracking_code: String,
    ali_id: String,
    campaign: String,
    affiliate: bool,
}

impl From<AffiliateLink> for AffiliateLinkItem {
    fn from(link: AffiliateLink) -> Self {
        Self {
            link: link.url.clone(),
            url: link.url,
            tracking_code: link.tracking_code,
            ali_id: link.external_id.into(),
            campaign: link.campaign.into(),
            affiliate: link.affiliate,
        }
    }
}

/// `GET /affiliate/link?ali_id=&campaign=`
pub(super) async fn affiliate_link(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<AffiliateQuery>,
) -> Result<Json<AffiliateLinkItem>, ApiError> {
    let Some(ali_id) = query.ali_id else {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "ali_id query parameter is required",
        ));
    };

    let link = state
        .affiliate
        .generate(&ali_id, query.campaign.as_deref())
        .await
        .map_err(|e| match e {
            AffiliateError::InvalidExternalId(_) | AffiliateError::InvalidCampaign(_) => {
                ApiError::new(req_id.0.clone(), "validation_error", e.to_string())
            }
            AffiliateError::Store(ref store) => ApiError::internal(req_id.0.clone(), store),
        })?;

    Ok(Json(link.into()))
}
