use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Structured product data returned by a marketplace source adapter, before
/// it is mapped into the catalog schema.
///
/// Every field is optional on purpose: adapters pass through whatever the
/// marketplace sent, and the transformer decides what is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Marketplace product id as echoed by the source.
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Sale price as a decimal string, exactly as the source returned it
    /// (e.g. `"9.99"`).
    pub price: Option<String>,
    /// ISO 4217 code, when the source reports one.
    pub currency_code: Option<String>,
    /// Units available from the supplier.
    pub stock: Option<i64>,
    pub image_urls: Vec<String>,
    /// Top-level marketplace category name, e.g. `"Consumer Electronics"`.
    pub category: Option<String>,
    pub brand: Option<String>,
    pub variants: Vec<ListingVariant>,
    /// Free-form specification table (`"Weight" -> "200g"`).
    pub specs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingVariant {
    pub sku_id: String,
    /// Option values for this variant, e.g. `"color" -> "Black"`.
    pub attributes: BTreeMap<String, String>,
}
