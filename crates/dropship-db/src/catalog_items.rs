//! Database operations for `catalog_items`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dropship_core::{CatalogItem, CatalogVariant};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `catalog_items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CatalogItemRow {
    pub id: i64,
    pub public_id: Uuid,
    pub external_id: String,
    pub sku: String,
    pub title: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub specs: Json<BTreeMap<String, String>>,
    pub source_price: Decimal,
    pub price: Decimal,
    pub currency_code: String,
    pub quantity: i32,
    pub image_urls: Json<Vec<String>>,
    pub variants: Json<Vec<CatalogVariant>>,
    pub category_id: String,
    pub marketplace_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inserts the item or updates the existing row for its external id.
///
/// `public_id` is assigned on first insert and never changes, so repeated
/// publishes of the same item return the same id.
///
/// # Errors
///
/// Returns [`DbError::Decode`] if the quantity does not fit the column, or
/// [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_catalog_item(pool: &PgPool, item: &CatalogItem) -> Result<Uuid, DbError> {
    let quantity = i32::try_from(item.quantity).map_err(|e| DbError::decode("quantity", e))?;

    let public_id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO catalog_items \
             (public_id, external_id, sku, title, description, brand, specs, source_price, \
              price, currency_code, quantity, image_urls, variants, category_id, \
              marketplace_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         ON CONFLICT (external_id) DO UPDATE SET \
             sku = EXCLUDED.sku, \
             title = EXCLUDED.title, \
             description = EXCLUDED.description, \
             brand = EXCLUDED.brand, \
             specs = EXCLUDED.specs, \
             source_price = EXCLUDED.source_price, \
             price = EXCLUDED.price, \
             currency_code = EXCLUDED.currency_code, \
             quantity = EXCLUDED.quantity, \
             image_urls = EXCLUDED.image_urls, \
             variants = EXCLUDED.variants, \
             category_id = EXCLUDED.category_id, \
             marketplace_id = EXCLUDED.marketplace_id, \
             updated_at = NOW() \
         RETURNING public_id",
    )
    .bind(Uuid::new_v4())
    .bind(item.external_id.as_str())
    .bind(&item.sku)
    .bind(&item.title)
    .bind(item.description.as_deref())
    .bind(item.brand.as_deref())
    .bind(Json(&item.specs))
    .bind(item.source_price)
    .bind(item.price)
    .bind(&item.currency_code)
    .bind(quantity)
    .bind(Json(&item.image_urls))
    .bind(Json(&item.variants))
    .bind(&item.category_id)
    .bind(&item.marketplace_id)
    .fetch_one(pool)
    .await?;

    Ok(public_id)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_catalog_item(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<CatalogItemRow>, DbError> {
    let row = sqlx::query_as::<_, CatalogItemRow>(
        "SELECT id, public_id, external_id, sku, title, description, brand, specs, \
                source_price, price, currency_code, quantity, image_urls, variants, category_id, marketplace_id, \
                created_at, updated_at \
         FROM catalog_items WHERE external_id = $1",
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn catalog_item_exists(pool: &PgPool, external_id: &str) -> Result<bool, DbError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM catalog_items WHERE external_id = $1)",
    )
    .bind(external_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}
