//! Response types for the AliExpress affiliate product-detail endpoint.
//!
//! ## Observed shape
//!
//! The payload is wrapped three levels deep:
//! `aliexpress_affiliate_productdetail_get_response.resp_result.result.products`.
//! `resp_result.result` is omitted entirely for unknown ids on some gateways,
//! so every level below `resp_result` is optional.
//!
//! Numeric fields (`product_id`, `total_avaliable_stock`) arrive as either
//! JSON strings or numbers depending on the gateway version; they are modelled
//! as [`Scalar`] and converted during normalization. The misspelling
//! `total_avaliable_stock` is the field's real name.
//!
//! `image_urls` is a single `;`-separated string, not an array.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetailEnvelope {
    #[serde(rename = "aliexpress_affiliate_productdetail_get_response")]
    pub response: ProductDetailResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetailResponse {
    pub resp_result: RespResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RespResult {
    /// `200` on success. Other codes carry a message in `resp_msg`.
    #[serde(default)]
    pub resp_code: Option<i64>,
    #[serde(default)]
    pub resp_msg: Option<String>,
    #[serde(default)]
    pub result: Option<ProductDetailResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductDetailResult {
    #[serde(default)]
    pub products: Vec<AliProduct>,
}

/// A JSON value the gateway sends as either a string or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Str(v) => v.trim().to_string(),
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            #[allow(clippy::cast_possible_truncation)]
            Scalar::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            Scalar::Float(_) => None,
            Scalar::Str(v) => v.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliProduct {
    #[serde(default)]
    pub product_id: Option<Scalar>,

    /// Listing title.
    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Decimal string, e.g. `"9.99"`.
    #[serde(default)]
    pub target_sale_price: Option<Scalar>,

    #[serde(default)]
    pub target_sale_price_currency: Option<String>,

    #[serde(default)]
    pub total_avaliable_stock: Option<Scalar>,

    /// `;`-separated list of image URLs.
    #[serde(default)]
    pub image_urls: Option<String>,

    #[serde(default)]
    pub first_level_category_name: Option<String>,

    #[serde(default)]
    pub brand_name: Option<String>,

    /// `"onSelling"` for live listings; anything in
    /// [`crate::normalize::DELISTED_STATUSES`] means the item was withdrawn.
    #[serde(default)]
    pub product_status: Option<String>,

    #[serde(default)]
    pub sku_infos: Vec<AliSkuInfo>,

    #[serde(default)]
    pub specs_module: BTreeMap<String, String>,
}

/// One purchasable SKU. Everything besides `sku_id` is an option value
/// (`"color": "Black"`), kept as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliSkuInfo {
    pub sku_id: Scalar,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}
