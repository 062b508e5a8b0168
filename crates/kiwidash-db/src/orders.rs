//! Database operations for the `orders` table.

use chrono::{DateTime, Utc};
use kiwidash_core::CanonicalOrder;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `orders` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub external_id: String,
    pub product_id: i64,
    pub customer_id: i64,
    pub product_external_id: String,
    pub customer_external_id: String,
    pub status: String,
    pub payment_method: String,
    pub gross_cents: i64,
    pub fee_cents: i64,
    pub net_cents: i64,
    pub commission_cents: i64,
    pub currency: String,
    pub approved_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The subset of an order the sales summary needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderSummaryRow {
    pub external_id: String,
    pub status: String,
    pub gross_cents: i64,
    pub net_cents: i64,
    pub raw: serde_json::Value,
}

/// An order whose product and customer have been resolved to surrogate ids.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedOrder<'a> {
    pub order: &'a CanonicalOrder,
    pub product_id: i64,
    pub customer_id: i64,
}

/// Upserts resolved orders in one statement, keyed on `external_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn upsert_orders(
    pool: &PgPool,
    orders: &[ResolvedOrder<'_>],
) -> Result<Vec<(String, i64)>, DbError> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let n = orders.len();
    let mut external_ids: Vec<String> = Vec::with_capacity(n);
    let mut product_ids: Vec<i64> = Vec::with_capacity(n);
    let mut customer_ids: Vec<i64> = Vec::with_capacity(n);
    let mut product_external_ids: Vec<String> = Vec::with_capacity(n);
    let mut customer_external_ids: Vec<String> = Vec::with_capacity(n);
    let mut statuses: Vec<String> = Vec::with_capacity(n);
    let mut methods: Vec<String> = Vec::with_capacity(n);
    let mut gross: Vec<i64> = Vec::with_capacity(n);
    let mut fees: Vec<i64> = Vec::with_capacity(n);
    let mut nets: Vec<i64> = Vec::with_capacity(n);
    let mut commissions: Vec<i64> = Vec::with_capacity(n);
    let mut currencies: Vec<String> = Vec::with_capacity(n);
    let mut approved: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(n);
    let mut refunded: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(n);
    let mut canceled: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(n);
    let mut created: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(n);
    let mut updated: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(n);
    let mut raws: Vec<serde_json::Value> = Vec::with_capacity(n);

    for resolved in orders {
        let o = resolved.order;
        external_ids.push(o.external_id.clone());
        product_ids.push(resolved.product_id);
        customer_ids.push(resolved.customer_id);
        product_external_ids.push(o.product_external_id.clone());
        customer_external_ids.push(o.customer_external_id.clone());
        statuses.push(o.status.as_str().to_string());
        methods.push(o.payment_method.as_str().to_string());
        gross.push(o.gross_cents);
        fees.push(o.fee_cents);
        nets.push(o.net_cents);
        commissions.push(o.commission_cents);
        currencies.push(o.currency.clone());
        approved.push(o.approved_at);
        refunded.push(o.refunded_at);
        canceled.push(o.canceled_at);
        created.push(o.source_created_at);
        updated.push(o.source_updated_at);
        raws.push(o.raw.clone());
    }

    let rows = sqlx::query_as::<_, (String, i64)>(
        "INSERT INTO orders \
             (external_id, product_id, customer_id, product_external_id, customer_external_id, \
              status, payment_method, gross_cents, fee_cents, net_cents, commission_cents, \
              currency, approved_at, refunded_at, canceled_at, \
              source_created_at, source_updated_at, raw) \
         SELECT * FROM UNNEST(\
              $1::text[], $2::int8[], $3::int8[], $4::text[], $5::text[], \
              $6::text[], $7::text[], $8::int8[], $9::int8[], $10::int8[], $11::int8[], \
              $12::text[], $13::timestamptz[], $14::timestamptz[], $15::timestamptz[], \
              $16::timestamptz[], $17::timestamptz[], $18::jsonb[]) \
         ON CONFLICT (external_id) DO UPDATE SET \
             product_id           = EXCLUDED.product_id, \
             customer_id          = EXCLUDED.customer_id, \
             product_external_id  = EXCLUDED.product_external_id, \
             customer_external_id = EXCLUDED.customer_external_id, \
             status               = EXCLUDED.status, \
             payment_method       = EXCLUDED.payment_method, \
             gross_cents          = EXCLUDED.gross_cents, \
             fee_cents            = EXCLUDED.fee_cents, \
             net_cents            = EXCLUDED.net_cents, \
             commission_cents     = EXCLUDED.commission_cents, \
             currency             = EXCLUDED.currency, \
             approved_at          = COALESCE(EXCLUDED.approved_at, orders.approved_at), \
             refunded_at          = COALESCE(EXCLUDED.refunded_at, orders.refunded_at), \
             canceled_at          = COALESCE(EXCLUDED.canceled_at, orders.canceled_at), \
             source_created_at    = COALESCE(EXCLUDED.source_created_at, orders.source_created_at), \
             source_updated_at    = COALESCE(EXCLUDED.source_updated_at, orders.source_updated_at), \
             raw                  = EXCLUDED.raw, \
             updated_at           = NOW() \
         RETURNING external_id, id",
    )
    .bind(&external_ids)
    .bind(&product_ids)
    .bind(&customer_ids)
    .bind(&product_external_ids)
    .bind(&customer_external_ids)
    .bind(&statuses)
    .bind(&methods)
    .bind(&gross)
    .bind(&fees)
    .bind(&nets)
    .bind(&commissions)
    .bind(&currencies)
    .bind(&approved)
    .bind(&refunded)
    .bind(&canceled)
    .bind(&created)
    .bind(&updated)
    .bind(&raws)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no order has `external_id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_order_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<OrderRow, DbError> {
    sqlx::query_as::<_, OrderRow>(
        "SELECT id, external_id, product_id, customer_id, product_external_id, \
                customer_external_id, status, payment_method, gross_cents, fee_cents, \
                net_cents, commission_cents, currency, approved_at, refunded_at, canceled_at, \
                source_created_at, source_updated_at, raw, created_at, updated_at \
         FROM orders \
         WHERE external_id = $1",
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns orders whose business creation time (falling back to the row's
/// own `created_at`) lies in `[start, end)`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_orders_for_summary(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<OrderSummaryRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderSummaryRow>(
        "SELECT external_id, status, gross_cents, net_cents, raw \
         FROM orders \
         WHERE COALESCE(source_created_at, created_at) >= $1 \
           AND COALESCE(source_created_at, created_at) < $2 \
         ORDER BY COALESCE(source_created_at, created_at), id",
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
