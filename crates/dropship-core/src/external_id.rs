//! Marketplace product identifiers (the frontend's `ali_id`).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest identifier accepted. AliExpress ids are 64-bit integers, which
/// never exceed 20 decimal digits.
pub const MAX_EXTERNAL_ID_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalIdError {
    #[error("external id is empty")]
    Empty,

    #[error("external id is longer than {max} characters")]
    TooLong { max: usize },

    #[error("external id must contain only ASCII digits, found {found:?}")]
    InvalidCharacter { found: char },
}

/// A validated marketplace product id.
///
/// Surrounding whitespace is trimmed; what remains must be 1 to
/// [`MAX_EXTERNAL_ID_LEN`] ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalId(String);

impl ExternalId {
    /// Validates and wraps a raw identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalIdError`] when the trimmed input is empty, too long,
    /// or contains anything other than ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, ExternalIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ExternalIdError::Empty);
        }
        if trimmed.len() > MAX_EXTERNAL_ID_LEN {
            return Err(ExternalIdError::TooLong {
                max: MAX_EXTERNAL_ID_LEN,
            });
        }
        if let Some(found) = trimmed.chars().find(|c| !c.is_ascii_digit()) {
            return Err(ExternalIdError::InvalidCharacter { found });
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ExternalId {
    type Error = ExternalIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExternalId> for String {
    fn from(value: ExternalId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_digits() {
        let id = ExternalId::parse("1005006213578219").unwrap();
        assert_eq!(id.as_str(), "1005006213578219");
    }

    #[test]
    fn parse_trims_whitespace() {
        let id = ExternalId::parse("  12345\n").unwrap();
        assert_eq!(id.as_str(), "12345");
    }

    #[test]
    fn parse_rejects_empty_and_blank() {
        assert_eq!(ExternalId::parse(""), Err(ExternalIdError::Empty));
        assert_eq!(ExternalId::parse("   "), Err(ExternalIdError::Empty));
    }

    #[test]
    fn parse_rejects_non_digits() {
        assert_eq!(
            ExternalId::parse("12a45"),
            Err(ExternalIdError::InvalidCharacter { found: 'a' })
        );
        assert!(ExternalId::parse("../etc").is_err());
        assert!(ExternalId::parse("12 45").is_err());
    }

    #[test]
    fn parse_rejects_overlong_ids() {
        let long = "1".repeat(MAX_EXTERNAL_ID_LEN + 1);
        assert_eq!(
            ExternalId::parse(&long),
            Err(ExternalIdError::TooLong {
                max: MAX_EXTERNAL_ID_LEN
            })
        );
        assert!(ExternalId::parse(&"9".repeat(MAX_EXTERNAL_ID_LEN)).is_ok());
    }

    #[test]
    fn deserialize_validates() {
        let ok: ExternalId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(ok.as_str(), "42");
        assert!(serde_json::from_str::<ExternalId>("\"abc\"").is_err());
    }
}
