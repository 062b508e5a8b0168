use axum::{extract::State, Extension, Json};
use chrono::NaiveDate;
use kiwidash_sync::{
    run_products_sync, run_sales_sync, SalesSyncRequest, SyncOptions, SyncSummary, TriggerSource,
};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_sync_error, ApiError, ApiResponse, AppState, ResponseMeta};

const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Deserialize)]
pub(super) struct SalesSyncBody {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ProductsSyncBody {
    #[serde(default)]
    pub page_size: Option<u32>,
}

fn page_size(requested: Option<u32>, default: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
}

fn options(state: &AppState) -> SyncOptions {
    SyncOptions {
        trigger: TriggerSource::Api,
        chunk_size: state.settings.chunk_size,
    }
}

pub(super) async fn sync_sales(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<SalesSyncBody>,
) -> Result<Json<ApiResponse<SyncSummary>>, ApiError> {
    let request = SalesSyncRequest {
        start: body.start_date,
        end: body.end_date,
        page_size: page_size(body.page_size, state.settings.default_page_size),
    };

    let summary = run_sales_sync(&state.pool, &state.kiwify, &request, &options(&state))
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: summary,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn sync_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ProductsSyncBody>,
) -> Result<Json<ApiResponse<SyncSummary>>, ApiError> {
    let size = page_size(body.page_size, state.settings.default_page_size);

    let summary = run_products_sync(&state.pool, &state.kiwify, size, &options(&state))
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: summary,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_defaults_and_clamps() {
        assert_eq!(page_size(None, 100), 100);
        assert_eq!(page_size(Some(0), 100), 1);
        assert_eq!(page_size(Some(10_000), 100), MAX_PAGE_SIZE);
    }

    #[test]
    fn sales_body_accepts_missing_end_date() {
        let body: SalesSyncBody =
            serde_json::from_str(r#"{"start_date": "2024-10-18"}"#).expect("parse");
        assert_eq!(body.start_date.to_string(), "2024-10-18");
        assert!(body.end_date.is_none());
        assert!(body.page_size.is_none());
    }
}
