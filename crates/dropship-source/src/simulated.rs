use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dropship_core::{ExternalId, FetchError, Listing, ListingSource};

use crate::normalize::{first_product, normalize_product};
use crate::types::{
    AliProduct, AliSkuInfo, ProductDetailEnvelope, ProductDetailResponse, ProductDetailResult,
    RespResult, Scalar,
};

pub const SOURCE_KEY: &str = "aliexpress-simulated";

/// Offline stand-in for [`crate::AliExpressClient`].
///
/// Returns the same product for every id (with the id echoed into the
/// title), built as a full product-detail envelope so it passes through the
/// same normalization as live responses.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSource {
    latency: Duration,
}

impl SimulatedSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artificial delay to every fetch.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The envelope the simulated marketplace would have sent for `id`.
    #[must_use]
    pub fn envelope_for(id: &ExternalId) -> ProductDetailEnvelope {
        let mut color = BTreeMap::new();
        color.insert(
            "color".to_string(),
            serde_json::Value::String("Black".to_string()),
        );
        let mut specs = BTreeMap::new();
        specs.insert("Weight".to_string(), "200g".to_string());

        let product = AliProduct {
            product_id: Some(Scalar::Str(id.to_string())),
            subject: Some(format!("Sim Product {id}")),
            description: Some("Sample description".to_string()),
            target_sale_price: Some(Scalar::Str("9.99".to_string())),
            target_sale_price_currency: Some("USD".to_string()),
            total_avaliable_stock: Some(Scalar::Str("50".to_string())),
            image_urls: Some("https://via.placeholder.com/600".to_string()),
            first_level_category_name: Some("Phones & Telecommunications".to_string()),
            brand_name: Some("Demo".to_string()),
            product_status: Some("onSelling".to_string()),
            sku_infos: vec![AliSkuInfo {
                sku_id: Scalar::Str("1".to_string()),
                attributes: color,
            }],
            specs_module: specs,
        };

        ProductDetailEnvelope {
            response: ProductDetailResponse {
                resp_result: RespResult {
                    resp_code: Some(200),
                    resp_msg: Some("success".to_string()),
                    result: Some(ProductDetailResult {
                        products: vec![product],
                    }),
                },
            },
        }
    }
}

#[async_trait]
impl ListingSource for SimulatedSource {
    fn source_key(&self) -> &str {
        SOURCE_KEY
    }

    async fn fetch(&self, external_id: &ExternalId) -> Result<Listing, FetchError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let product = first_product(Self::envelope_for(external_id), external_id.as_str())?;
        Ok(normalize_product(product))
    }
}
