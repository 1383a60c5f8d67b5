//! Listing to catalog-item mapping. Pure: no I/O, no shared state.

use std::str::FromStr;

use dropship_core::{CatalogItem, ExternalId, Listing};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::category::map_category;
use crate::error::TransformError;

/// Marketplace title limit, in characters.
pub const MAX_TITLE_CHARS: usize = 80;
/// Largest quantity offered on the storefront.
pub const MAX_QUANTITY: u32 = 999;
pub const DEFAULT_CURRENCY: &str = "USD";
pub const SKU_PREFIX: &str = "ALI-";

#[derive(Debug, Clone)]
pub struct Transformer {
    markup_percent: Decimal,
    marketplace_id: String,
}

impl Transformer {
    #[must_use]
    pub fn new(markup_percent: Decimal, marketplace_id: impl Into<String>) -> Self {
        Self {
            markup_percent,
            marketplace_id: marketplace_id.into(),
        }
    }

    /// # Errors
    ///
    /// - [`TransformError::MissingField`] when the id, title or price is absent.
    /// - [`TransformError::InvalidField`] when the id is malformed or the
    ///   price is unparseable or negative.
    pub fn transform(&self, listing: &Listing) -> Result<CatalogItem, TransformError> {
        let raw_id = listing
            .external_id
            .as_deref()
            .ok_or(TransformError::MissingField("external_id"))?;
        let external_id =
            ExternalId::parse(raw_id).map_err(|e| TransformError::InvalidField {
                field: "external_id",
                reason: e.to_string(),
            })?;

        let title = listing
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(TransformError::MissingField("title"))?;

        let raw_price = listing
            .price
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(TransformError::MissingField("price"))?;
        let source_price = parse_price(raw_price)?;

        let mapping = map_category(title, listing.category.as_deref());

        Ok(CatalogItem {
            sku: format!("{SKU_PREFIX}{external_id}"),
            title: truncate_chars(title, MAX_TITLE_CHARS),
            description: listing.description.clone(),
            brand: listing
                .brand
                .as_deref()
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_owned),
            specs: listing
                .specs
                .iter()
                .filter(|(name, _)| !name.trim().is_empty())
                .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
                .collect(),
            price: self.apply_markup(source_price),
            source_price,
            currency_code: listing
                .currency_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map_or_else(|| DEFAULT_CURRENCY.to_string(), str::to_ascii_uppercase),
            quantity: cap_quantity(listing.stock),
            image_urls: listing
                .image_urls
                .iter()
                .map(|u| u.trim())
                .filter(|u| !u.is_empty())
                .map(str::to_owned)
                .collect(),
            variants: listing.variants.clone(),
            category_id: mapping.category_id,
            marketplace_id: self.marketplace_id.clone(),
            external_id,
        })
    }

    /// `price * (1 + markup / 100)`, rounded half away from zero to cents.
    #[must_use]
    pub fn apply_markup(&self, price: Decimal) -> Decimal {
        let factor = Decimal::ONE + self.markup_percent / Decimal::ONE_HUNDRED;
        (price * factor).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

fn parse_price(raw: &str) -> Result<Decimal, TransformError> {
    let price = Decimal::from_str(raw).map_err(|e| TransformError::InvalidField {
        field: "price",
        reason: e.to_string(),
    })?;
    if price.is_sign_negative() && !price.is_zero() {
        return Err(TransformError::InvalidField {
            field: "price",
            reason: format!("negative price {raw}"),
        });
    }
    Ok(price)
}

fn cap_quantity(stock: Option<i64>) -> u32 {
    let stock = stock.unwrap_or(0).clamp(0, i64::from(MAX_QUANTITY));
    u32::try_from(stock).unwrap_or(0)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end().to_owned(),
        None => s.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformer() -> Transformer {
        Transformer::new(Decimal::new(30, 0), "EBAY-AU")
    }

    fn listing() -> Listing {
        Listing {
            external_id: Some("12345".into()),
            title: Some("Sim Product 12345".into()),
            description: Some("Sample description".into()),
            price: Some("9.99".into()),
            stock: Some(50),
            image_urls: vec!["https://img/1.jpg".into(), String::new()],
            category: Some("Home & Garden".into()),
            ..Listing::default()
        }
    }

    #[test]
    fn maps_a_complete_listing() {
        let item = transformer().transform(&listing()).unwrap();
        assert_eq!(item.external_id.as_str(), "12345");
        assert_eq!(item.sku, "ALI-12345");
        assert_eq!(item.title, "Sim Product 12345");
        assert_eq!(item.source_price, Decimal::new(999, 2));
        assert_eq!(item.price, Decimal::new(1299, 2));
        assert_eq!(item.currency_code, "USD");
        assert_eq!(item.quantity, 50);
        assert_eq!(item.image_urls, vec!["https://img/1.jpg".to_string()]);
        assert_eq!(item.category_id, "11700");
        assert_eq!(item.marketplace_id, "EBAY-AU");
    }

    #[test]
    fn brand_and_specs_are_carried_over() {
        let mut listing = listing();
        listing.brand = Some("  Acme ".into());
        listing.specs = [
            ("Material".to_string(), " Silicone".to_string()),
            (" ".to_string(), "ignored".to_string()),
        ]
        .into_iter()
        .collect();

        let item = transformer().transform(&listing).unwrap();
        assert_eq!(item.brand.as_deref(), Some("Acme"));
        assert_eq!(item.specs.len(), 1);
        assert_eq!(item.specs["Material"], "Silicone");

        listing.brand = Some("   ".into());
        listing.specs.clear();
        let item = transformer().transform(&listing).unwrap();
        assert_eq!(item.brand, None);
        assert!(item.specs.is_empty());
    }

    #[test]
    fn missing_mandatory_fields_are_rejected() {
        let t = transformer();
        for (field, mut l) in [
            ("external_id", listing()),
            ("title", listing()),
            ("price", listing()),
        ] {
            match field {
                "external_id" => l.external_id = None,
                "title" => l.title = Some("   ".into()),
                _ => l.price = None,
            }
            assert_eq!(t.transform(&l), Err(TransformError::MissingField(field)));
        }
    }

    #[test]
    fn unparseable_and_negative_prices_are_invalid() {
        let t = transformer();
        let mut l = listing();
        l.price = Some("nine".into());
        assert!(matches!(
            t.transform(&l),
            Err(TransformError::InvalidField { field: "price", .. })
        ));
        l.price = Some("-1.00".into());
        assert!(matches!(
            t.transform(&l),
            Err(TransformError::InvalidField { field: "price", .. })
        ));
    }

    #[test]
    fn zero_price_is_allowed() {
        let mut l = listing();
        l.price = Some("0".into());
        assert_eq!(transformer().transform(&l).unwrap().price, Decimal::ZERO);
    }

    #[test]
    fn title_is_truncated_on_char_boundary() {
        let mut l = listing();
        l.title = Some("é".repeat(100));
        let item = transformer().transform(&l).unwrap();
        assert_eq!(item.title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn quantity_is_capped_and_floored() {
        assert_eq!(cap_quantity(Some(5000)), MAX_QUANTITY);
        assert_eq!(cap_quantity(Some(-3)), 0);
        assert_eq!(cap_quantity(None), 0);
    }

    #[test]
    fn markup_rounds_half_away_from_zero() {
        let t = Transformer::new(Decimal::new(50, 0), "EBAY-AU");
        // 0.05 * 1.5 = 0.075
        assert_eq!(t.apply_markup(Decimal::new(5, 2)), Decimal::new(8, 2));
    }

    #[test]
    fn title_keyword_beats_category_hint() {
        let mut l = listing();
        l.title = Some("Slim phone case".into());
        assert_eq!(transformer().transform(&l).unwrap().category_id, "15032");
    }

    #[test]
    fn currency_is_uppercased() {
        let mut l = listing();
        l.currency_code = Some("aud".into());
        assert_eq!(transformer().transform(&l).unwrap().currency_code, "AUD");
    }
}
