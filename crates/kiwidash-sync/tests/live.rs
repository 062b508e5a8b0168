//! End-to-end pipeline tests: a `wiremock` Kiwify in front, a fresh
//! migrated Postgres from `#[sqlx::test]` behind.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use kiwidash_core::IncomingWebhookEvent;
use kiwidash_db::{get_order_by_external_id, get_sync_run, list_sync_runs, DbError};
use kiwidash_ingest::KiwifyClient;
use kiwidash_sync::{
    ingest_webhook, preview_sales_sync, run_products_sync, run_sales_sync, sales_summary,
    SalesSyncRequest, SyncOptions, TriggerSource,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid test date")
}

fn options() -> SyncOptions {
    SyncOptions {
        trigger: TriggerSource::Cli,
        chunk_size: 500,
    }
}

fn raw_sale(id: &str, product: &str, customer: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "status": status,
        "created_at": "2024-10-18 17:40:00",
        "product": {"id": product, "name": format!("Produto {product}")},
        "customer": {"id": customer, "email": format!("{customer}@example.com")},
        "amount": 1_000
    })
}

async fn mount_sales(server: &MockServer, sales: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/v1/sales"))
        .and(query_param("page_number", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": sales, "has_more": false})),
        )
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> KiwifyClient {
    KiwifyClient::with_base_url(&server.uri(), Some("test-token"))
        .expect("failed to build test client")
}

#[sqlx::test(migrations = "../../migrations")]
async fn sales_sync_persists_and_records_run(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    mount_sales(
        &server,
        vec![
            raw_sale("s-1", "p-1", "c-1", "paid"),
            raw_sale("s-2", "p-1", "c-2", "refunded"),
            json!({"id": "s-3", "customer": {"id": "c-3"}}),
        ],
    )
    .await;

    let request = SalesSyncRequest {
        start: d("2024-10-18"),
        end: None,
        page_size: 50,
    };
    let summary = run_sales_sync(&pool, &client(&server), &request, &options())
        .await
        .expect("sales sync failed");

    assert_eq!(summary.sales_fetched, 3);
    assert_eq!(summary.sales_dropped, 1);
    assert_eq!(summary.orders, 2);
    assert_eq!(summary.products, 1);
    assert_eq!(summary.customers, 2);
    assert_eq!(summary.total_intervals, 1);
    assert!(summary.run_id.is_some());

    let order = get_order_by_external_id(&pool, "s-2")
        .await
        .expect("order should be stored");
    assert_eq!(order.status, "refunded");

    let runs = list_sync_runs(&pool, 5).await.expect("list runs failed");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, "succeeded");
    assert_eq!(runs[0].orders_upserted, 2);
    assert_eq!(runs[0].records_dropped, 1);
    assert_eq!(runs[0].window_start, Some(d("2024-10-18")));
}

#[sqlx::test(migrations = "../../migrations")]
async fn rerunning_a_sync_is_idempotent(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    mount_sales(&server, vec![raw_sale("s-1", "p-1", "c-1", "paid")]).await;

    let request = SalesSyncRequest {
        start: d("2024-10-18"),
        end: Some(d("2024-10-18")),
        page_size: 50,
    };
    let client = client(&server);
    run_sales_sync(&pool, &client, &request, &options())
        .await
        .expect("first sync failed");
    let first = get_order_by_external_id(&pool, "s-1")
        .await
        .expect("order should exist");
    run_sales_sync(&pool, &client, &request, &options())
        .await
        .expect("second sync failed");
    let second = get_order_by_external_id(&pool, "s-1")
        .await
        .expect("order should exist");

    assert_eq!(first.id, second.id);
    assert_eq!(first.created_at, second.created_at);
    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await
        .expect("count failed");
    assert_eq!(orders, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn upstream_failure_marks_run_failed(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sales"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let request = SalesSyncRequest {
        start: d("2024-10-18"),
        end: None,
        page_size: 50,
    };
    let err = run_sales_sync(&pool, &client(&server), &request, &options())
        .await
        .expect_err("404 must abort the sync");
    assert_eq!(err.code(), "upstream_error");

    let runs = list_sync_runs(&pool, 5).await.expect("list runs failed");
    assert_eq!(runs.len(), 1);
    let run = get_sync_run(&pool, runs[0].id).await.expect("run exists");
    assert_eq!(run.status, "failed");
    assert!(run.error_message.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn inverted_range_is_rejected_before_any_run(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    let request = SalesSyncRequest {
        start: d("2024-02-01"),
        end: Some(d("2024-01-01")),
        page_size: 50,
    };
    let err = run_sales_sync(&pool, &client(&server), &request, &options())
        .await
        .expect_err("inverted range must fail");
    assert_eq!(err.code(), "validation_error");
    assert!(list_sync_runs(&pool, 5).await.expect("list").is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn products_sync_upserts_catalog(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "p-1", "name": "Curso A", "price": 19_700},
                {"name": "sem id"}
            ],
            "has_more": false
        })))
        .mount(&server)
        .await;

    let summary = run_products_sync(&pool, &client(&server), 50, &options())
        .await
        .expect("products sync failed");
    assert_eq!(summary.products, 1);
    assert_eq!(summary.products_fetched, 2);
    assert_eq!(summary.products_dropped, 1);
    assert_eq!(summary.sales_fetched, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn preview_writes_nothing(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    mount_sales(&server, vec![raw_sale("s-1", "p-1", "c-1", "paid")]).await;

    let request = SalesSyncRequest {
        start: d("2024-10-18"),
        end: None,
        page_size: 50,
    };
    let summary = preview_sales_sync(&client(&server), &request)
        .await
        .expect("preview failed");
    assert_eq!(summary.orders, 1);
    assert!(summary.run_id.is_none());
    assert!(matches!(
        get_order_by_external_id(&pool, "s-1").await,
        Err(DbError::NotFound)
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn webhook_with_sale_persists_order_and_dedups(pool: sqlx::PgPool) {
    let event = IncomingWebhookEvent {
        event_id: Some("evt-1".to_string()),
        trigger: Some("approved".to_string()),
        status: Some("paid".to_string()),
        source: "kiwify".to_string(),
        webhook_id: None,
        webhook_token: None,
        headers: BTreeMap::new(),
        payload: json!({
            "webhook_event_type": "order_approved",
            "order": raw_sale("s-9", "p-9", "c-9", "paid")
        }),
        occurred_at: None,
        received_at: Utc::now(),
    };

    let first = ingest_webhook(&pool, &event, 500)
        .await
        .expect("first ingest failed");
    let second = ingest_webhook(&pool, &event, 500)
        .await
        .expect("second ingest failed");

    assert!(first.order_persisted);
    assert_eq!(first.event_row_id, second.event_row_id);
    let order = get_order_by_external_id(&pool, "s-9")
        .await
        .expect("order should exist");
    assert_eq!(order.status, "approved");
}

#[sqlx::test(migrations = "../../migrations")]
async fn webhook_without_sale_still_stores_event(pool: sqlx::PgPool) {
    let event = IncomingWebhookEvent {
        event_id: Some("evt-abandoned".to_string()),
        trigger: Some("abandoned".to_string()),
        status: None,
        source: "kiwify".to_string(),
        webhook_id: None,
        webhook_token: None,
        headers: BTreeMap::new(),
        payload: json!({"webhook_event_type": "cart_abandoned", "email": "x@example.com"}),
        occurred_at: None,
        received_at: Utc::now(),
    };

    let outcome = ingest_webhook(&pool, &event, 500)
        .await
        .expect("ingest failed");
    assert!(!outcome.order_persisted);
    assert_eq!(outcome.event_id.as_deref(), Some("evt-abandoned"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn sales_summary_buckets_stored_orders(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    mount_sales(
        &server,
        vec![
            raw_sale("s-1", "p-1", "c-1", "paid"),
            raw_sale("s-2", "p-1", "c-2", "refunded"),
        ],
    )
    .await;
    let request = SalesSyncRequest {
        start: d("2024-10-18"),
        end: None,
        page_size: 50,
    };
    run_sales_sync(&pool, &client(&server), &request, &options())
        .await
        .expect("sync failed");

    let summary = sales_summary(&pool, d("2024-10-18"), d("2024-10-18"))
        .await
        .expect("summary failed");
    assert_eq!(summary.total_orders, 2);
    let approved = summary
        .buckets
        .iter()
        .find(|b| b.bucket == "approved")
        .expect("approved bucket");
    assert_eq!(approved.orders, 1);

    let err = sales_summary(&pool, d("2024-10-19"), d("2024-10-18"))
        .await
        .expect_err("inverted range");
    assert_eq!(err.code(), "validation_error");
}
