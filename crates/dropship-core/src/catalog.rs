use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::external_id::ExternalId;
use crate::listing::ListingVariant;

/// Identifier the catalog store assigns to an item. Stable across upserts of
/// the same external id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogItemId(pub Uuid);

impl fmt::Display for CatalogItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A listing normalized for the operator's storefront, ready to upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Upsert key.
    pub external_id: ExternalId,
    /// Storefront SKU, `ALI-<external id>`.
    pub sku: String,
    /// Trimmed and truncated to the marketplace title limit.
    pub title: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    /// Item specifics such as material or size, keyed by name.
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
    /// Supplier price before markup.
    pub source_price: Decimal,
    /// Storefront price after markup, rounded to cents.
    pub price: Decimal,
    pub currency_code: String,
    pub quantity: u32,
    pub image_urls: Vec<String>,
    pub variants: Vec<CatalogVariant>,
    /// Marketplace category id chosen by the category mapper.
    pub category_id: String,
    pub marketplace_id: String,
}

impl CatalogItem {
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.image_urls.first().map(String::as_str)
    }

    #[must_use]
    pub fn is_in_stock(&self) -> bool {
        self.quantity > 0
    }
}

/// Variants are passed through from the listing untouched.
pub type CatalogVariant = ListingVariant;
