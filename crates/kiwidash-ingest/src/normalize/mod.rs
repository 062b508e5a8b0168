//! Record normalizers: raw Kiwify payloads in, canonical entities out.
//!
//! Each normalizer owns its ordered alias tables and returns `None` rather
//! than failing, so one malformed record never aborts a batch.

mod customer;
mod product;
mod sale;

use std::collections::HashMap;

use kiwidash_core::{CanonicalCustomer, CanonicalOrder, CanonicalProduct};
use serde_json::Value;

pub use customer::normalize_customer;
pub use product::normalize_product;
pub use sale::{normalize_sale, try_normalize_sale, NormalizedSale, SaleDropReason};

/// A deduplicated batch ready for the sink. Later records with the same
/// external id replace earlier ones, keeping the earlier position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub products: Vec<CanonicalProduct>,
    pub customers: Vec<CanonicalCustomer>,
    pub orders: Vec<CanonicalOrder>,
    /// Raw records that could not be normalized or failed order validation.
    pub dropped: usize,
}

impl NormalizedBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.customers.is_empty() && self.orders.is_empty()
    }
}

struct Dedup<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Dedup<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn push(&mut self, key: &str, item: T) {
        if let Some(&i) = self.index.get(key) {
            self.items[i] = item;
        } else {
            self.index.insert(key.to_string(), self.items.len());
            self.items.push(item);
        }
    }
}

/// Normalizes raw sales into a deduplicated batch.
///
/// Sales that cannot be resolved or whose order fails validation are counted
/// in `dropped` and logged; the rest of the batch proceeds.
#[must_use]
pub fn normalize_sales_batch(raw_sales: &[Value]) -> NormalizedBatch {
    let mut products = Dedup::new();
    let mut customers = Dedup::new();
    let mut orders = Dedup::new();
    let mut dropped = 0usize;

    for raw in raw_sales {
        let sale = match try_normalize_sale(raw) {
            Ok(sale) => sale,
            Err(reason) => {
                dropped += 1;
                tracing::warn!(
                    reason = reason.as_str(),
                    sale_id = raw.get("id").and_then(serde_json::Value::as_str).unwrap_or("<none>"),
                    "dropping sale that could not be normalized"
                );
                continue;
            }
        };

        if let Err(e) = sale.order.validate() {
            dropped += 1;
            tracing::warn!(
                order_id = %sale.order.external_id,
                error = %e,
                "dropping sale that failed validation"
            );
            continue;
        }

        if let Some(product) = sale.product {
            products.push(&product.external_id.clone(), product);
        }
        customers.push(&sale.customer.external_id.clone(), sale.customer);
        orders.push(&sale.order.external_id.clone(), sale.order);
    }

    NormalizedBatch {
        products: products.items,
        customers: customers.items,
        orders: orders.items,
        dropped,
    }
}

/// Normalizes raw products into a deduplicated batch.
#[must_use]
pub fn normalize_products_batch(raw_products: &[Value]) -> NormalizedBatch {
    let mut products = Dedup::new();
    let mut dropped = 0usize;

    for raw in raw_products {
        match normalize_product(raw) {
            Some(product) => products.push(&product.external_id.clone(), product),
            None => {
                dropped += 1;
                tracing::warn!("dropping product payload without an id");
            }
        }
    }

    NormalizedBatch {
        products: products.items,
        dropped,
        ..NormalizedBatch::default()
    }
}
