//! Database operations for the `products` table.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use kiwidash_core::CanonicalProduct;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub status: String,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upserts `products` in one statement, keyed on `external_id`.
///
/// Returns `(external_id, id)` for every row written. `created_at` is never
/// touched on conflict. Callers must not pass two products with the same
/// external id in one call.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn upsert_products(
    pool: &PgPool,
    products: &[CanonicalProduct],
) -> Result<Vec<(String, i64)>, DbError> {
    if products.is_empty() {
        return Ok(Vec::new());
    }

    let n = products.len();
    let mut external_ids: Vec<String> = Vec::with_capacity(n);
    let mut titles: Vec<String> = Vec::with_capacity(n);
    let mut descriptions: Vec<Option<String>> = Vec::with_capacity(n);
    let mut image_urls: Vec<Option<String>> = Vec::with_capacity(n);
    let mut prices: Vec<i64> = Vec::with_capacity(n);
    let mut currencies: Vec<String> = Vec::with_capacity(n);
    let mut statuses: Vec<String> = Vec::with_capacity(n);
    let mut created: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(n);
    let mut updated: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(n);
    let mut raws: Vec<serde_json::Value> = Vec::with_capacity(n);

    for p in products {
        external_ids.push(p.external_id.clone());
        titles.push(p.title.clone());
        descriptions.push(p.description.clone());
        image_urls.push(p.image_url.clone());
        prices.push(p.price_cents);
        currencies.push(p.currency.clone());
        statuses.push(p.status.as_str().to_string());
        created.push(p.source_created_at);
        updated.push(p.source_updated_at);
        raws.push(p.raw.clone());
    }

    let rows = sqlx::query_as::<_, (String, i64)>(
        "INSERT INTO products \
             (external_id, title, description, image_url, price_cents, currency, status, \
              source_created_at, source_updated_at, raw) \
         SELECT * FROM UNNEST(\
              $1::text[], $2::text[], $3::text[], $4::text[], $5::int8[], $6::text[], $7::text[], \
              $8::timestamptz[], $9::timestamptz[], $10::jsonb[]) \
         ON CONFLICT (external_id) DO UPDATE SET \
             title             = EXCLUDED.title, \
             description       = COALESCE(EXCLUDED.description, products.description), \
             image_url         = COALESCE(EXCLUDED.image_url, products.image_url), \
             price_cents       = EXCLUDED.price_cents, \
             currency          = EXCLUDED.currency, \
             status            = EXCLUDED.status, \
             source_created_at = COALESCE(EXCLUDED.source_created_at, products.source_created_at), \
             source_updated_at = COALESCE(EXCLUDED.source_updated_at, products.source_updated_at), \
             raw               = EXCLUDED.raw, \
             updated_at        = NOW() \
         RETURNING external_id, id",
    )
    .bind(&external_ids)
    .bind(&titles)
    .bind(&descriptions)
    .bind(&image_urls)
    .bind(&prices)
    .bind(&currencies)
    .bind(&statuses)
    .bind(&created)
    .bind(&updated)
    .bind(&raws)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Resolves external ids to surrogate ids. Ids not in the table are absent
/// from the map.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn product_ids_by_external_id(
    pool: &PgPool,
    external_ids: &[String],
) -> Result<HashMap<String, i64>, DbError> {
    if external_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT external_id, id FROM products WHERE external_id = ANY($1::text[])",
    )
    .bind(external_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no product has `external_id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<ProductRow, DbError> {
    sqlx::query_as::<_, ProductRow>(
        "SELECT id, external_id, title, description, image_url, price_cents, currency, status, \
                source_created_at, source_updated_at, raw, created_at, updated_at \
         FROM products \
         WHERE external_id = $1",
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
