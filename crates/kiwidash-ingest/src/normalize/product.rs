use kiwidash_core::{CanonicalProduct, ProductStatus, DEFAULT_CURRENCY};
use serde_json::Value;

use crate::amount::pick_amount_cents;
use crate::date::normalize_date;
use crate::path::{pick_bool, pick_id, pick_string};

const ID_PATHS: &[&str] = &["id", "product_id", "uuid", "product.id"];
const TITLE_PATHS: &[&str] = &["name", "title", "product_name", "product.name"];
const DESCRIPTION_PATHS: &[&str] = &["description", "short_description", "product.description"];
const IMAGE_PATHS: &[&str] = &[
    "image_url",
    "cover_image",
    "cover_image_url",
    "image",
    "thumbnail",
    "images.0.url",
    "images.0",
];
const PRICE_PATHS: &[&str] = &[
    "price_cents",
    "price",
    "base_price",
    "default_price",
    "amount",
    "pricing.price",
    "offers.0.price",
    "product.price",
];
const CURRENCY_PATHS: &[&str] = &["currency", "pricing.currency", "offers.0.currency"];
const STATUS_PATHS: &[&str] = &["status", "state", "product_status"];
const ACTIVE_FLAG_PATHS: &[&str] = &["active", "is_active", "published"];
const CREATED_PATHS: &[&str] = &["created_at", "createdAt", "created", "creation_date"];
const UPDATED_PATHS: &[&str] = &["updated_at", "updatedAt", "updated", "last_update"];

/// Normalizes a Kiwify product payload. Returns `None` when no external id
/// can be found.
#[must_use]
pub fn normalize_product(raw: &Value) -> Option<CanonicalProduct> {
    let external_id = pick_id(raw, ID_PATHS)?;

    let status = match pick_string(raw, STATUS_PATHS) {
        Some(label) => ProductStatus::from_label(&label),
        None => match pick_bool(raw, ACTIVE_FLAG_PATHS) {
            Some(false) => ProductStatus::Inactive,
            _ => ProductStatus::Active,
        },
    };

    Some(CanonicalProduct {
        title: pick_string(raw, TITLE_PATHS).unwrap_or_else(|| external_id.clone()),
        description: pick_string(raw, DESCRIPTION_PATHS),
        image_url: pick_string(raw, IMAGE_PATHS),
        price_cents: pick_amount_cents(raw, PRICE_PATHS).unwrap_or(0),
        currency: pick_currency(raw, CURRENCY_PATHS),
        status,
        source_created_at: normalize_date(raw, CREATED_PATHS),
        source_updated_at: normalize_date(raw, UPDATED_PATHS),
        raw: raw.clone(),
        external_id,
    })
}

pub(crate) fn pick_currency(raw: &Value, paths: &[&str]) -> String {
    pick_string(raw, paths)
        .map(|c| c.to_uppercase())
        .filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}
