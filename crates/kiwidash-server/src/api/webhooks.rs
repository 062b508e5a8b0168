use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use kiwidash_ingest::resolve_webhook;
use kiwidash_sync::{ingest_webhook, WebhookOutcome};
use crate::middleware::{secrets_match, RequestId};

use super::{map_sync_error, ApiError, ApiResponse, AppState, ResponseMeta};

fn token_matches(expected: &str, presented: Option<&str>) -> bool {
    presented.is_some_and(|p| secrets_match(expected, p))
}

pub(super) async fn receive_kiwify(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookOutcome>>, ApiError> {
    let received_at = Utc::now();

    let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "rejecting webhook with invalid JSON body");
        ApiError::new(req_id.0.clone(), "bad_request", "body must be a JSON document")
    })?;

    let header_pairs = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)));
    let event = resolve_webhook(payload, header_pairs, received_at);

    if let Some(expected) = state.settings.webhook_token.as_deref() {
        if !token_matches(expected, event.webhook_token.as_deref()) {
            tracing::warn!(
                event_id = event.event_id.as_deref().unwrap_or("-"),
                token_present = event.webhook_token.is_some(),
                "rejecting webhook with invalid token"
            );
            return Err(ApiError::new(
                req_id.0,
                "unauthorized",
                "missing or invalid webhook token",
            ));
        }
    }

    let outcome = ingest_webhook(&state.pool, &event, state.settings.chunk_size)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: outcome,
        meta: ResponseMeta::new(req_id.0),
    }))
}
