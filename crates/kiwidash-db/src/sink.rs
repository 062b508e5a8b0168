//! The upsert sink: persists a normalized batch in dependency order.
//!
//! Products and customers are written first, then orders are resolved to
//! their surrogate keys and written, and every written row gets an
//! `ingest_events` entry. Writes are chunked and not wrapped in a
//! transaction; a failed chunk aborts the call with earlier chunks kept.

use std::collections::{HashMap, HashSet};

use kiwidash_core::config::MAX_UPSERT_CHUNK_SIZE;
use kiwidash_core::{CanonicalCustomer, CanonicalOrder, CanonicalProduct};
use serde::Serialize;
use sqlx::PgPool;

use crate::customers::{customer_ids_by_external_id, upsert_customers};
use crate::ingest_events::{record_ingest_events, EntityType, NewIngestEvent};
use crate::orders::{upsert_orders, ResolvedOrder};
use crate::products::{product_ids_by_external_id, upsert_products};
use crate::DbError;

#[derive(Debug, Clone, Copy)]
pub struct SinkOptions {
    /// Rows per statement, clamped to `1..=MAX_UPSERT_CHUNK_SIZE`.
    pub chunk_size: usize,
    /// Stamped on every audit event written by this call.
    pub sync_run_id: Option<i64>,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            chunk_size: MAX_UPSERT_CHUNK_SIZE,
            sync_run_id: None,
        }
    }
}

impl SinkOptions {
    fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, MAX_UPSERT_CHUNK_SIZE)
    }
}

/// What a [`persist_batch`] call actually wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    pub products: usize,
    pub customers: usize,
    pub orders: usize,
    /// Orders that failed validation and were skipped.
    pub orders_invalid: usize,
    /// Orders whose product or customer was not in the store.
    pub orders_unresolved: usize,
    pub events: u64,
}

/// Persists products, customers and orders.
///
/// # Errors
///
/// - [`DbError::Validation`] if any product or customer is invalid. Nothing
///   is written in that case.
/// - [`DbError::Sqlx`] if any chunk fails.
pub async fn persist_batch(
    pool: &PgPool,
    products: &[CanonicalProduct],
    customers: &[CanonicalCustomer],
    orders: &[CanonicalOrder],
    options: SinkOptions,
) -> Result<SinkReport, DbError> {
    for product in products {
        product.validate()?;
    }
    for customer in customers {
        customer.validate()?;
    }

    let chunk_size = options.effective_chunk_size();
    let mut report = SinkReport::default();

    let products = last_wins(products, |p| p.external_id.as_str());
    for chunk in products.chunks(chunk_size) {
        let written = upsert_products(pool, chunk).await?;
        report.products += written.len();
        report.events += record_written(
            pool,
            EntityType::Product,
            &written,
            chunk.iter().map(|p| (p.external_id.as_str(), &p.raw)),
            options.sync_run_id,
        )
        .await?;
    }

    let customers = last_wins(customers, |c| c.external_id.as_str());
    for chunk in customers.chunks(chunk_size) {
        let written = upsert_customers(pool, chunk).await?;
        report.customers += written.len();
        report.events += record_written(
            pool,
            EntityType::Customer,
            &written,
            chunk.iter().map(|c| (c.external_id.as_str(), &c.raw)),
            options.sync_run_id,
        )
        .await?;
    }

    let mut valid_orders: Vec<CanonicalOrder> = Vec::with_capacity(orders.len());
    for order in last_wins(orders, |o| o.external_id.as_str()) {
        match order.validate() {
            Ok(()) => valid_orders.push(order),
            Err(err) => {
                report.orders_invalid += 1;
                tracing::warn!(order_id = %order.external_id, error = %err, "dropping invalid order");
            }
        }
    }

    for chunk in valid_orders.chunks(chunk_size) {
        let (resolved, unresolved) = resolve_orders(pool, chunk).await?;
        report.orders_unresolved += unresolved;
        if resolved.is_empty() {
            continue;
        }

        let written = upsert_orders(pool, &resolved).await?;
        report.orders += written.len();
        report.events += record_written(
            pool,
            EntityType::Order,
            &written,
            resolved.iter().map(|r| (r.order.external_id.as_str(), &r.order.raw)),
            options.sync_run_id,
        )
        .await?;
    }

    tracing::info!(
        products = report.products,
        customers = report.customers,
        orders = report.orders,
        orders_invalid = report.orders_invalid,
        orders_unresolved = report.orders_unresolved,
        events = report.events,
        "batch persisted"
    );

    Ok(report)
}

/// Looks up surrogate ids for the products and customers this chunk
/// references and splits it into resolvable orders and a count of the rest.
async fn resolve_orders<'a>(
    pool: &PgPool,
    chunk: &'a [CanonicalOrder],
) -> Result<(Vec<ResolvedOrder<'a>>, usize), DbError> {
    let product_refs = distinct(chunk.iter().map(|o| o.product_external_id.as_str()));
    let customer_refs = distinct(chunk.iter().map(|o| o.customer_external_id.as_str()));

    let product_ids = product_ids_by_external_id(pool, &product_refs).await?;
    let customer_ids = customer_ids_by_external_id(pool, &customer_refs).await?;

    let mut resolved = Vec::with_capacity(chunk.len());
    let mut unresolved = 0usize;

    for order in chunk {
        let product_id = product_ids.get(&order.product_external_id);
        let customer_id = customer_ids.get(&order.customer_external_id);
        match (product_id, customer_id) {
            (Some(&product_id), Some(&customer_id)) => resolved.push(ResolvedOrder {
                order,
                product_id,
                customer_id,
            }),
            _ => {
                unresolved += 1;
                tracing::warn!(
                    order_id = %order.external_id,
                    product_id = %order.product_external_id,
                    customer_id = %order.customer_external_id,
                    product_found = product_id.is_some(),
                    customer_found = customer_id.is_some(),
                    "dropping order with unresolved references"
                );
            }
        }
    }

    Ok((resolved, unresolved))
}

async fn record_written<'a>(
    pool: &PgPool,
    entity_type: EntityType,
    written: &[(String, i64)],
    raws: impl Iterator<Item = (&'a str, &'a serde_json::Value)>,
    sync_run_id: Option<i64>,
) -> Result<u64, DbError> {
    let ids: HashMap<&str, i64> = written.iter().map(|(ext, id)| (ext.as_str(), *id)).collect();
    let events: Vec<NewIngestEvent> = raws
        .filter_map(|(external_id, raw)| {
            ids.get(external_id).map(|&entity_id| NewIngestEvent {
                entity_type,
                external_id: external_id.to_string(),
                entity_id,
                payload: raw.clone(),
            })
        })
        .collect();

    record_ingest_events(pool, &events, sync_run_id).await
}

/// Collapses duplicates by key. The last occurrence wins and takes the
/// position of the first, which keeps a single statement from touching the
/// same row twice.
fn last_wins<T: Clone>(items: &[T], key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(items.len());
    for item in items {
        let k = key(item);
        if let Some(&i) = index.get(k) {
            out[i] = item.clone();
        } else {
            index.insert(k, out.len());
            out.push(item.clone());
        }
    }
    out
}

fn distinct<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}
