use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct SyncRunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncRunItem {
    sync_run_id: Uuid,
    run_type: String,
    trigger_source: String,
    status: String,
    window_start: Option<NaiveDate>,
    window_end: Option<NaiveDate>,
    products_upserted: i32,
    customers_upserted: i32,
    orders_upserted: i32,
    records_dropped: i32,
    total_intervals: i32,
    total_pages: i32,
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<kiwidash_db::SyncRunRow> for SyncRunItem {
    fn from(row: kiwidash_db::SyncRunRow) -> Self {
        Self {
            sync_run_id: row.public_id,
            run_type: row.run_type,
            trigger_source: row.trigger_source,
            status: row.status,
            window_start: row.window_start,
            window_end: row.window_end,
            products_upserted: row.products_upserted,
            customers_upserted: row.customers_upserted,
            orders_upserted: row.orders_upserted,
            records_dropped: row.records_dropped,
            total_intervals: row.total_intervals,
            total_pages: row.total_pages,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}

pub(super) async fn list_sync_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SyncRunsQuery>,
) -> Result<Json<ApiResponse<Vec<SyncRunItem>>>, ApiError> {
    let rows = kiwidash_db::list_sync_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(SyncRunItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
