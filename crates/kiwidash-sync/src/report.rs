//! Sales summary over stored orders, bucketed with the same classifier that
//! labels webhook triggers.

use chrono::{NaiveDate, NaiveTime};
use kiwidash_db::{list_orders_for_summary, OrderSummaryRow};
use kiwidash_ingest::{classify_payload, Bucket};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::SyncError;

/// Label for orders whose raw payload matches no bucket.
pub const UNCLASSIFIED: &str = "unclassified";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketTotal {
    pub bucket: &'static str,
    pub orders: usize,
    pub gross_cents: i64,
    pub net_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_orders: usize,
    pub gross_cents: i64,
    /// One entry per bucket in precedence order, then `unclassified`.
    pub buckets: Vec<BucketTotal>,
}

/// Totals `rows` per classification bucket. Every bucket is present, even
/// when empty.
#[must_use]
pub fn summarize_orders(rows: &[OrderSummaryRow]) -> Vec<BucketTotal> {
    let mut totals: Vec<BucketTotal> = Bucket::ALL
        .iter()
        .map(|b| b.as_str())
        .chain(std::iter::once(UNCLASSIFIED))
        .map(|bucket| BucketTotal {
            bucket,
            orders: 0,
            gross_cents: 0,
            net_cents: 0,
        })
        .collect();

    for row in rows {
        let label = classify_payload(&row.raw)
            .bucket()
            .map_or(UNCLASSIFIED, Bucket::as_str);
        if let Some(total) = totals.iter_mut().find(|t| t.bucket == label) {
            total.orders += 1;
            total.gross_cents = total.gross_cents.saturating_add(row.gross_cents);
            total.net_cents = total.net_cents.saturating_add(row.net_cents);
        }
    }

    totals
}

/// Summarizes orders created between `start` and `end`, both inclusive
/// (UTC days).
///
/// # Errors
///
/// - [`SyncError::InvalidRequest`] if `start` is after `end`.
/// - [`SyncError::Persistence`] if the query fails.
pub async fn sales_summary(
    pool: &PgPool,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<SalesSummary, SyncError> {
    if start > end {
        return Err(SyncError::InvalidRequest(format!(
            "start_date {start} is after end_date {end}"
        )));
    }
    let until = end
        .succ_opt()
        .ok_or_else(|| SyncError::InvalidRequest(format!("end_date {end} is out of range")))?;

    let rows = list_orders_for_summary(
        pool,
        start.and_time(NaiveTime::MIN).and_utc(),
        until.and_time(NaiveTime::MIN).and_utc(),
    )
    .await?;

    let buckets = summarize_orders(&rows);
    Ok(SalesSummary {
        start_date: start,
        end_date: end,
        total_orders: rows.len(),
        gross_cents: buckets.iter().map(|b| b.gross_cents).sum(),
        buckets,
    })
}
