//! Sync-run bookkeeping around a pipeline body: create → start → body →
//! complete, or fail with the body's error.

use std::future::Future;

use chrono::NaiveDate;
use kiwidash_db::{
    complete_sync_run, create_sync_run, fail_sync_run_best_effort, start_sync_run,
};
use sqlx::PgPool;

use crate::error::SyncError;
use crate::summary::{SyncOptions, SyncSummary};

pub(crate) async fn tracked<F, Fut>(
    pool: &PgPool,
    run_type: &'static str,
    options: &SyncOptions,
    window: (Option<NaiveDate>, Option<NaiveDate>),
    body: F,
) -> Result<SyncSummary, SyncError>
where
    F: FnOnce(i64) -> Fut,
    Fut: Future<Output = Result<SyncSummary, SyncError>>,
{
    let run = create_sync_run(pool, run_type, options.trigger.as_str(), window.0, window.1).await?;
    if let Err(e) = start_sync_run(pool, run.id).await {
        fail_sync_run_best_effort(pool, run.id, &e.to_string()).await;
        return Err(e.into());
    }

    tracing::info!(
        run_id = run.id,
        public_id = %run.public_id,
        run_type,
        trigger = options.trigger.as_str(),
        "sync run started"
    );

    let mut summary = match body(run.id).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(run_id = run.id, run_type, code = e.code(), error = %e, "sync run failed");
            fail_sync_run_best_effort(pool, run.id, &e.to_string()).await;
            return Err(e);
        }
    };
    summary.run_id = Some(run.public_id);

    if let Err(e) = complete_sync_run(pool, run.id, summary.counters()).await {
        fail_sync_run_best_effort(pool, run.id, &e.to_string()).await;
        return Err(e.into());
    }

    tracing::info!(
        run_id = run.id,
        run_type,
        products = summary.products,
        customers = summary.customers,
        orders = summary.orders,
        dropped = summary.dropped(),
        intervals = summary.total_intervals,
        pages = summary.total_pages,
        "sync run succeeded"
    );

    Ok(summary)
}
