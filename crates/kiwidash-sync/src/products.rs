use kiwidash_db::{persist_batch, SinkOptions};
use kiwidash_ingest::{normalize_products_batch, KiwifyClient};
use sqlx::PgPool;

use crate::error::SyncError;
use crate::summary::{SyncOptions, SyncSummary};
use crate::tracked::tracked;

/// Fetches and normalizes the product catalog without writing anything.
///
/// # Errors
///
/// Returns [`SyncError::Upstream`] if any page fails.
pub async fn preview_products_sync(
    client: &KiwifyClient,
    page_size: u32,
) -> Result<SyncSummary, SyncError> {
    let (raw, fetch) = client.fetch_all_products(page_size).await?;
    let batch = normalize_products_batch(&raw);
    Ok(SyncSummary {
        products_fetched: raw.len(),
        products_dropped: batch.dropped,
        ..SyncSummary::preview(&batch, fetch)
    })
}

/// Runs a tracked catalog sync.
///
/// # Errors
///
/// - [`SyncError::Upstream`] if any page fails.
/// - [`SyncError::Persistence`] if a chunk fails or a product is invalid.
pub async fn run_products_sync(
    pool: &PgPool,
    client: &KiwifyClient,
    page_size: u32,
    options: &SyncOptions,
) -> Result<SyncSummary, SyncError> {
    tracked(pool, "products", options, (None, None), |run_id| async move {
        let (raw, fetch) = client.fetch_all_products(page_size).await?;
        let batch = normalize_products_batch(&raw);
        let report = persist_batch(
            pool,
            &batch.products,
            &[],
            &[],
            SinkOptions {
                chunk_size: options.chunk_size,
                sync_run_id: Some(run_id),
            },
        )
        .await?;

        Ok(SyncSummary {
            products_fetched: raw.len(),
            products_dropped: batch.dropped,
            ..SyncSummary::persisted(fetch, report)
        })
    })
    .await
}
