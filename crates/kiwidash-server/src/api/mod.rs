mod runs;
mod sales;
mod sync;
mod webhooks;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use kiwidash_core::AppConfig;
use kiwidash_ingest::KiwifyClient;
use kiwidash_sync::SyncError;
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

/// Per-process settings the handlers need from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Shared secret webhook deliveries must carry. `None` accepts all.
    pub webhook_token: Option<String>,
    pub default_page_size: u32,
    pub chunk_size: usize,
}

impl ServerSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            webhook_token: config.kiwify_webhook_token.clone(),
            default_page_size: config.page_size,
            chunk_size: config.upsert_chunk_size,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub kiwify: Arc<KiwifyClient>,
    pub settings: Arc<ServerSettings>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &kiwidash_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

/// Persistence details stay in the log; upstream and validation messages
/// are safe to return.
pub(super) fn map_sync_error(request_id: String, error: &SyncError) -> ApiError {
    let code = error.code();
    if code == "persistence_error" {
        tracing::error!(error = %error, "sync persistence failed");
        return ApiError::new(request_id, code, "database operation failed");
    }
    tracing::warn!(code, error = %error, "sync request failed");
    ApiError::new(request_id, code, error.to_string())
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/sync/sales", post(sync::sync_sales))
        .route("/api/v1/sync/products", post(sync::sync_products))
        .route("/api/v1/sync/runs", get(runs::list_sync_runs))
        .route("/api/v1/sales/summary", get(sales::sales_summary))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    // Kiwify cannot send our bearer token; deliveries authenticate with the
    // webhook token instead.
    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/webhooks/kiwify", post(webhooks::receive_kiwify));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match kiwidash_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, 6, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use kiwidash_ingest::IngestError;
    use tower::ServiceExt;

    fn test_state(pool: PgPool, webhook_token: Option<&str>) -> AppState {
        AppState {
            pool,
            // Nothing listens here; tests that reach upstream fail fast.
            kiwify: Arc::new(
                KiwifyClient::with_base_url("http://127.0.0.1:9", Some("test-token"))
                    .expect("client"),
            ),
            settings: Arc::new(ServerSettings {
                webhook_token: webhook_token.map(str::to_string),
                default_page_size: 100,
                chunk_size: 500,
            }),
        }
    }

    fn app(pool: PgPool, webhook_token: Option<&str>) -> Router {
        build_app(
            test_state(pool, webhook_token),
            AuthState::disabled(),
            default_rate_limit_state(),
        )
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json parse")
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(1_000)), 200);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn api_error_codes_map_to_statuses() {
        let status = |code: &str| ApiError::new("req-1", code, "x").into_response().status();
        assert_eq!(status("validation_error"), StatusCode::BAD_REQUEST);
        assert_eq!(status("unauthorized"), StatusCode::UNAUTHORIZED);
        assert_eq!(status("upstream_error"), StatusCode::BAD_GATEWAY);
        assert_eq!(status("persistence_error"), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn sync_errors_hide_persistence_details() {
        let err = SyncError::from(kiwidash_db::DbError::NotFound);
        let api = map_sync_error("req-1".to_string(), &err);
        assert_eq!(api.error.code, "persistence_error");
        assert_eq!(api.error.message, "database operation failed");

        let err = SyncError::from(IngestError::UnexpectedStatus {
            status: 503,
            url: "https://public-api.kiwify.com/v1/sales".to_string(),
        });
        let api = map_sync_error("req-2".to_string(), &err);
        assert_eq!(api.error.code, "upstream_error");
        assert!(api.error.message.contains("503"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn health_reports_ok_with_request_id(pool: PgPool) {
        let response = app(pool, None)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .header("x-request-id", "req-health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok()),
            Some("req-health")
        );
        let json = body_json(response).await;
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["meta"]["request_id"], "req-health");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn protected_routes_require_bearer_when_enabled(pool: PgPool) {
        let auth = AuthState::from_keys("secret-key", false).expect("auth");
        let app = build_app(test_state(pool, None), auth, default_rate_limit_state());

        let denied = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/sync/runs")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        let denied = body_json(denied).await;
        assert_eq!(denied["error"]["code"], "unauthorized");
        assert!(denied["meta"]["request_id"].is_string());

        let allowed = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/sync/runs")
                    .header("authorization", "Bearer secret-key")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn sync_triggers_have_their_own_budget(pool: PgPool) {
        let app = build_app(
            test_state(pool, None),
            AuthState::disabled(),
            RateLimitState::new(10, 1, Duration::from_secs(60)),
        );
        // Inverted range: rejected before anything reaches upstream.
        let body = serde_json::json!({"start_date": "2024-02-01", "end_date": "2024-01-01"});

        let first = app
            .clone()
            .oneshot(post_json("/api/v1/sync/sales", &body))
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::BAD_REQUEST);

        let second = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/sync/sales")
                    .header("content-type", "application/json")
                    .header("x-request-id", "req-limited")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(second).await;
        assert_eq!(json["error"]["code"], "rate_limited");
        assert_eq!(json["meta"]["request_id"], "req-limited");

        let read = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/sync/runs")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(read.status(), StatusCode::OK, "reads draw from a separate budget");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn webhook_delivery_is_stored_and_deduplicated(pool: PgPool) {
        let payload = serde_json::json!({
            "webhook_event_type": "order_approved",
            "order_id": "o-1",
            "order_status": "paid",
            "Product": {"product_id": "p-1", "product_name": "Curso"},
            "Customer": {"email": "Maria@Example.com", "full_name": "Maria"},
            "Commissions": {"charge_amount": "497,90"}
        });

        let first = app(pool.clone(), None)
            .oneshot(post_json("/api/v1/webhooks/kiwify", &payload))
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::OK);
        let first = body_json(first).await;
        assert_eq!(first["data"]["trigger"], "approved");

        let second = app(pool.clone(), None)
            .oneshot(post_json("/api/v1/webhooks/kiwify", &payload))
            .await
            .expect("response");
        let second = body_json(second).await;
        assert_eq!(first["data"]["event_row_id"], second["data"]["event_row_id"]);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn webhook_with_wrong_token_is_rejected(pool: PgPool) {
        let payload = serde_json::json!({"order_id": "o-1", "order_status": "paid"});
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/kiwify")
            .header("content-type", "application/json")
            .header("x-kiwify-webhook-token", "wrong")
            .body(Body::from(payload.to_string()))
            .expect("request");

        let response = app(pool.clone(), Some("expected"))
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 0, "rejected deliveries are not stored");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn webhook_with_invalid_json_is_bad_request(pool: PgPool) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/kiwify")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let response = app(pool, None).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn sync_sales_rejects_inverted_range(pool: PgPool) {
        let response = app(pool, None)
            .oneshot(post_json(
                "/api/v1/sync/sales",
                &serde_json::json!({"start_date": "2024-02-01", "end_date": "2024-01-01"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn sales_summary_returns_every_bucket(pool: PgPool) {
        let response = app(pool, None)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/sales/summary?start_date=2024-10-01&end_date=2024-10-31")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["total_orders"], 0);
        assert_eq!(
            json["data"]["buckets"].as_array().map(Vec::len),
            Some(kiwidash_ingest::Bucket::ALL.len() + 1)
        );
    }
}
