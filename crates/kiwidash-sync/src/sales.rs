use chrono::NaiveDate;
use kiwidash_db::{persist_batch, SinkOptions};
use kiwidash_ingest::{
    normalize_sales_batch, split_windows, FetchSummary, KiwifyClient, NormalizedBatch,
};
use sqlx::PgPool;

use crate::error::SyncError;
use crate::summary::{SyncOptions, SyncSummary};
use crate::tracked::tracked;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalesSyncRequest {
    pub start: NaiveDate,
    /// Inclusive. `None` syncs the single day `start`.
    pub end: Option<NaiveDate>,
    pub page_size: u32,
}

impl SalesSyncRequest {
    fn validate(&self) -> Result<(), SyncError> {
        split_windows(self.start, self.end)?;
        Ok(())
    }
}

async fn fetch_and_normalize(
    client: &KiwifyClient,
    request: &SalesSyncRequest,
) -> Result<(NormalizedBatch, FetchSummary, usize), SyncError> {
    let fetched = client
        .fetch_all_sales_by_window(request.start, request.end, request.page_size)
        .await?;
    let batch = normalize_sales_batch(&fetched.sales);
    Ok((batch, fetched.summary, fetched.sales.len()))
}

/// Fetches and normalizes sales without writing anything.
///
/// # Errors
///
/// Returns [`SyncError::Upstream`] if the range is invalid or any page fails.
pub async fn preview_sales_sync(
    client: &KiwifyClient,
    request: &SalesSyncRequest,
) -> Result<SyncSummary, SyncError> {
    request.validate()?;
    let (batch, fetch, fetched) = fetch_and_normalize(client, request).await?;
    Ok(SyncSummary {
        sales_fetched: fetched,
        sales_dropped: batch.dropped,
        ..SyncSummary::preview(&batch, fetch)
    })
}

/// Runs a tracked sales sync: fetch every window, normalize, and persist
/// through the sink. Either every page was fetched and every chunk written,
/// or an error is returned and the run is marked failed.
///
/// # Errors
///
/// - [`SyncError::Upstream`] for an invalid range or any page failure.
/// - [`SyncError::Persistence`] if a chunk or the run bookkeeping fails.
pub async fn run_sales_sync(
    pool: &PgPool,
    client: &KiwifyClient,
    request: &SalesSyncRequest,
    options: &SyncOptions,
) -> Result<SyncSummary, SyncError> {
    request.validate()?;
    let window = (Some(request.start), Some(request.end.unwrap_or(request.start)));

    tracked(pool, "sales", options, window, |run_id| async move {
        let (batch, fetch, fetched) = fetch_and_normalize(client, request).await?;
        let report = persist_batch(
            pool,
            &batch.products,
            &batch.customers,
            &batch.orders,
            SinkOptions {
                chunk_size: options.chunk_size,
                sync_run_id: Some(run_id),
            },
        )
        .await?;

        Ok(SyncSummary {
            sales_fetched: fetched,
            sales_dropped: batch.dropped + report.orders_invalid,
            ..SyncSummary::persisted(fetch, report)
        })
    })
    .await
}
