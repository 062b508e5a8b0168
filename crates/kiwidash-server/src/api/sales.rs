use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use kiwidash_sync::SalesSummary;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_sync_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct SalesSummaryQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

pub(super) async fn sales_summary(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SalesSummaryQuery>,
) -> Result<Json<ApiResponse<SalesSummary>>, ApiError> {
    let summary = kiwidash_sync::sales_summary(&state.pool, query.start_date, query.end_date)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: summary,
        meta: ResponseMeta::new(req_id.0),
    }))
}
