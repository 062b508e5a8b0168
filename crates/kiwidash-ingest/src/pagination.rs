//! Lenient parsing of Kiwify listing responses.
//!
//! Listing endpoints disagree on where the items and pagination metadata
//! live; each location is tried in turn.

use serde_json::Value;

use crate::path::{get_path, pick_bool, pick_number};

const ITEM_PATHS: &[&str] = &["data", "items", "data.items", "results", "sales", "products"];
const PAGE_NUMBER_PATHS: &[&str] = &[
    "pagination.page_number",
    "pagination.page",
    "page_number",
    "page",
];
const PAGE_SIZE_PATHS: &[&str] = &["pagination.page_size", "page_size", "per_page"];
const TOTAL_PATHS: &[&str] = &[
    "pagination.count",
    "pagination.total",
    "pagination.total_items",
    "count",
    "total",
    "total_items",
];
const HAS_MORE_PATHS: &[&str] = &[
    "pagination.has_more",
    "pagination.hasMore",
    "pagination.has_next",
    "has_more",
    "hasMore",
    "has_next",
];

/// One parsed listing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub items: Vec<Value>,
    pub page_number: Option<u32>,
    pub page_size: Option<u32>,
    pub total: Option<u64>,
    pub has_more: Option<bool>,
}

impl ListingPage {
    /// Parses a listing body. A bare JSON array is treated as the item list.
    #[must_use]
    pub fn from_body(body: &Value) -> Self {
        let items = match body {
            Value::Array(items) => items.clone(),
            _ => ITEM_PATHS
                .iter()
                .filter_map(|p| get_path(body, p))
                .find_map(|v| v.as_array().cloned())
                .unwrap_or_default(),
        };

        Self {
            items,
            page_number: pick_u64(body, PAGE_NUMBER_PATHS).and_then(|n| u32::try_from(n).ok()),
            page_size: pick_u64(body, PAGE_SIZE_PATHS).and_then(|n| u32::try_from(n).ok()),
            total: pick_u64(body, TOTAL_PATHS),
            has_more: pick_bool(body, HAS_MORE_PATHS),
        }
    }

    /// Whether another page should be requested.
    ///
    /// Stops on an empty or short page, an explicit `has_more = false`, or
    /// once `fetched_so_far` reaches a known total. A short page stops even
    /// when the flag says there is more.
    #[must_use]
    pub fn has_next(&self, requested_page_size: u32, fetched_so_far: u64) -> bool {
        if self.items.is_empty() {
            return false;
        }
        if (self.items.len() as u64) < u64::from(requested_page_size) {
            return false;
        }
        if let Some(has_more) = self.has_more {
            return has_more;
        }
        if let Some(total) = self.total {
            return fetched_so_far < total;
        }
        true
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pick_u64(body: &Value, paths: &[&str]) -> Option<u64> {
    pick_number(body, paths)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64)
}
