use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::external_id::ExternalId;

pub const MAX_CAMPAIGN_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CampaignTagError {
    #[error("campaign tag is empty")]
    Empty,

    #[error("campaign tag is longer than {max} characters")]
    TooLong { max: usize },

    #[error("campaign tag may only contain ASCII letters, digits, '-' and '_', found {found:?}")]
    InvalidCharacter { found: char },
}

/// Campaign label attached to affiliate links, e.g. `"spring-sale"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CampaignTag(String);

impl CampaignTag {
    /// # Errors
    ///
    /// Returns [`CampaignTagError`] for empty, overlong, or non-slug input.
    pub fn parse(raw: &str) -> Result<Self, CampaignTagError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CampaignTagError::Empty);
        }
        if trimmed.len() > MAX_CAMPAIGN_LEN {
            return Err(CampaignTagError::TooLong {
                max: MAX_CAMPAIGN_LEN,
            });
        }
        if let Some(found) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(CampaignTagError::InvalidCharacter { found });
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CampaignTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CampaignTag {
    type Error = CampaignTagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CampaignTag> for String {
    fn from(value: CampaignTag) -> Self {
        value.0
    }
}

/// A generated deep link. Keyed by `(external_id, campaign)`; never mutated
/// once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateLink {
    pub external_id: ExternalId,
    pub campaign: CampaignTag,
    pub url: String,
    pub tracking_code: String,
    /// `false` when affiliate tracking is disabled and `url` is the plain
    /// item page.
    pub affiliate: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_accepts_slugs() {
        assert_eq!(CampaignTag::parse("spring_sale-2026").unwrap().as_str(), "spring_sale-2026");
    }

    #[test]
    fn campaign_rejects_separators_and_blank() {
        assert_eq!(CampaignTag::parse(" "), Err(CampaignTagError::Empty));
        assert_eq!(
            CampaignTag::parse("a&b"),
            Err(CampaignTagError::InvalidCharacter { found: '&' })
        );
        assert!(CampaignTag::parse(&"x".repeat(MAX_CAMPAIGN_LEN + 1)).is_err());
    }
}
