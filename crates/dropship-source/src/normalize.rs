//! Conversion from the product-detail envelope into a [`Listing`].
//!
//! Normalization never rejects a product for missing fields; that is the
//! transformer's job. It only fails when the envelope has no product at all.

use std::collections::BTreeMap;

use dropship_core::{Listing, ListingVariant};

use crate::error::SourceError;
use crate::types::{AliProduct, AliSkuInfo, ProductDetailEnvelope};

/// `product_status` values that mean the listing was withdrawn.
pub const DELISTED_STATUSES: &[&str] = &["offline", "delisted", "removed", "soldout_offline"];

const SUCCESS_CODE: i64 = 200;

/// Pulls the single product out of a product-detail envelope.
///
/// # Errors
///
/// - [`SourceError::Gateway`] when `resp_code` reports a failure.
/// - [`SourceError::Delisted`] when the product list is empty or the product
///   carries a withdrawn status.
pub fn first_product(
    envelope: ProductDetailEnvelope,
    product_id: &str,
) -> Result<AliProduct, SourceError> {
    let resp = envelope.response.resp_result;
    if let Some(code) = resp.resp_code.filter(|c| *c != SUCCESS_CODE) {
        return Err(SourceError::Gateway {
            code,
            message: resp.resp_msg.unwrap_or_default(),
        });
    }

    let product = resp
        .result
        .and_then(|r| r.products.into_iter().next())
        .ok_or_else(|| SourceError::Delisted {
            product_id: product_id.to_owned(),
        })?;

    let withdrawn = product
        .product_status
        .as_deref()
        .is_some_and(|s| DELISTED_STATUSES.contains(&s.to_ascii_lowercase().as_str()));
    if withdrawn {
        return Err(SourceError::Delisted {
            product_id: product_id.to_owned(),
        });
    }

    Ok(product)
}

/// Maps a raw [`AliProduct`] onto the marketplace-neutral [`Listing`].
#[must_use]
pub fn normalize_product(product: AliProduct) -> Listing {
    let image_urls = product
        .image_urls
        .as_deref()
        .map(split_image_urls)
        .unwrap_or_default();

    Listing {
        external_id: product.product_id.map(|id| id.to_text()),
        title: non_empty(product.subject),
        description: non_empty(product.description),
        price: product
            .target_sale_price
            .map(|p| p.to_text())
            .filter(|p| !p.is_empty()),
        currency_code: non_empty(product.target_sale_price_currency),
        stock: product.total_avaliable_stock.and_then(|s| s.as_i64()),
        image_urls,
        category: non_empty(product.first_level_category_name),
        brand: non_empty(product.brand_name),
        variants: product.sku_infos.into_iter().map(normalize_sku).collect(),
        specs: product.specs_module,
    }
}

fn normalize_sku(sku: AliSkuInfo) -> ListingVariant {
    let attributes: BTreeMap<String, String> = sku
        .attributes
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => return None,
                other => other.to_string(),
            };
            Some((key, text))
        })
        .collect();

    ListingVariant {
        sku_id: sku.sku_id.to_text(),
        attributes,
    }
}

fn split_image_urls(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}
