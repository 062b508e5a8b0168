//! Live integration tests for kiwidash-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database from the sqlx
//! test harness. `"../../migrations"` is relative to `crates/kiwidash-db/`.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use kiwidash_core::{
    CanonicalCustomer, CanonicalOrder, CanonicalProduct, IncomingWebhookEvent, OrderStatus,
    PaymentMethod, ProductStatus, UNKNOWN_CUSTOMER_EMAIL, UNKNOWN_CUSTOMER_NAME,
};
use kiwidash_db::{
    complete_sync_run, create_sync_run, fail_sync_run, get_customer_by_external_id,
    get_order_by_external_id, get_product_by_external_id, get_sync_run,
    get_webhook_event_by_event_id, list_ingest_events, list_orders_for_summary, list_sync_runs,
    persist_batch, start_sync_run, upsert_customers, upsert_products, upsert_webhook_event,
    DbError, EntityType, SinkOptions, SyncRunCounters,
};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn product(id: &str, price_cents: i64) -> CanonicalProduct {
    CanonicalProduct {
        external_id: id.to_string(),
        title: format!("Curso {id}"),
        description: None,
        image_url: None,
        price_cents,
        currency: "BRL".to_string(),
        status: ProductStatus::Active,
        source_created_at: None,
        source_updated_at: None,
        raw: json!({ "id": id }),
    }
}

fn customer(id: &str, email: &str) -> CanonicalCustomer {
    CanonicalCustomer {
        external_id: id.to_string(),
        name: "Maria Souza".to_string(),
        email: email.to_string(),
        phone: None,
        country: Some("BR".to_string()),
        source_created_at: None,
        source_updated_at: None,
        raw: json!({ "id": id, "email": email }),
    }
}

fn order(id: &str, product_id: &str, customer_id: &str) -> CanonicalOrder {
    CanonicalOrder {
        external_id: id.to_string(),
        product_external_id: product_id.to_string(),
        customer_external_id: customer_id.to_string(),
        status: OrderStatus::Approved,
        payment_method: PaymentMethod::Pix,
        gross_cents: 49_790,
        fee_cents: 4_979,
        net_cents: 44_811,
        commission_cents: 44_811,
        currency: "BRL".to_string(),
        approved_at: Some(Utc.with_ymd_and_hms(2024, 10, 18, 20, 40, 0).unwrap()),
        refunded_at: None,
        canceled_at: None,
        source_created_at: Some(Utc.with_ymd_and_hms(2024, 10, 18, 20, 0, 0).unwrap()),
        source_updated_at: None,
        raw: json!({ "id": id, "order_status": "paid" }),
    }
}

fn webhook(event_id: Option<&str>, status: &str) -> IncomingWebhookEvent {
    IncomingWebhookEvent {
        event_id: event_id.map(str::to_string),
        trigger: Some("order_approved".to_string()),
        status: Some(status.to_string()),
        source: "kiwify".to_string(),
        webhook_id: Some("wh-1".to_string()),
        webhook_token: None,
        headers: BTreeMap::from([("x-kiwify-event".to_string(), "order_approved".to_string())]),
        payload: json!({ "order_id": "o-1", "order_status": status }),
        occurred_at: None,
        received_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Section 1: Upserts and the sink
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn persist_batch_writes_all_entities_and_events(pool: sqlx::PgPool) {
    let report = persist_batch(
        &pool,
        &[product("p-1", 49_790)],
        &[customer("c-1", "maria@example.com")],
        &[order("o-1", "p-1", "c-1")],
        SinkOptions::default(),
    )
    .await
    .expect("persist_batch failed");

    assert_eq!(report.products, 1);
    assert_eq!(report.customers, 1);
    assert_eq!(report.orders, 1);
    assert_eq!(report.events, 3);

    let stored = get_order_by_external_id(&pool, "o-1")
        .await
        .expect("order should exist");
    let product_row = get_product_by_external_id(&pool, "p-1")
        .await
        .expect("product should exist");
    assert_eq!(stored.product_id, product_row.id);
    assert_eq!(stored.status, "approved");
    assert_eq!(stored.payment_method, "pix");
    assert_eq!(stored.net_cents, 44_811);

    let events = list_ingest_events(&pool, Some(EntityType::Order), 10)
        .await
        .expect("list_ingest_events failed");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].external_id, "o-1");
    assert_eq!(events[0].entity_id, stored.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn persisting_same_batch_twice_is_idempotent(pool: sqlx::PgPool) {
    let products = [product("p-1", 1_000)];
    let customers = [customer("c-1", "a@example.com")];
    let orders = [order("o-1", "p-1", "c-1")];

    persist_batch(&pool, &products, &customers, &orders, SinkOptions::default())
        .await
        .expect("first persist failed");
    let first = get_order_by_external_id(&pool, "o-1")
        .await
        .expect("order should exist");

    persist_batch(&pool, &products, &customers, &orders, SinkOptions::default())
        .await
        .expect("second persist failed");
    let second = get_order_by_external_id(&pool, "o-1")
        .await
        .expect("order should exist");

    let counts: (i64, i64, i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM products), (SELECT COUNT(*) FROM customers), \
                (SELECT COUNT(*) FROM orders), (SELECT COUNT(*) FROM ingest_events)",
    )
    .fetch_one(&pool)
    .await
    .expect("count query failed");

    assert_eq!(counts, (1, 1, 1, 3), "re-ingestion must not add rows");
    assert_eq!(first.id, second.id);
    assert_eq!(first.created_at, second.created_at);
    assert_eq!(first.gross_cents, second.gross_cents);
    assert!(second.updated_at >= first.updated_at);
}

#[sqlx::test(migrations = "../../migrations")]
async fn orders_with_unknown_references_are_dropped(pool: sqlx::PgPool) {
    let report = persist_batch(
        &pool,
        &[product("p-1", 1_000)],
        &[customer("c-1", "a@example.com")],
        &[
            order("o-ok", "p-1", "c-1"),
            order("o-orphan-product", "p-missing", "c-1"),
            order("o-orphan-customer", "p-1", "c-missing"),
        ],
        SinkOptions::default(),
    )
    .await
    .expect("persist_batch failed");

    assert_eq!(report.orders, 1);
    assert_eq!(report.orders_unresolved, 2);
    assert!(matches!(
        get_order_by_external_id(&pool, "o-orphan-product").await,
        Err(DbError::NotFound)
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn invalid_orders_are_dropped_but_invalid_products_fail(pool: sqlx::PgPool) {
    let mut bad_order = order("o-bad", "p-1", "c-1");
    bad_order.fee_cents = -1;

    let report = persist_batch(
        &pool,
        &[product("p-1", 1_000)],
        &[customer("c-1", "a@example.com")],
        &[bad_order, order("o-good", "p-1", "c-1")],
        SinkOptions::default(),
    )
    .await
    .expect("persist_batch failed");
    assert_eq!(report.orders_invalid, 1);
    assert_eq!(report.orders, 1);

    let err = persist_batch(
        &pool,
        &[product("p-2", -5)],
        &[],
        &[],
        SinkOptions::default(),
    )
    .await
    .expect_err("negative price must be rejected");
    assert!(matches!(err, DbError::Validation(_)));
    assert!(matches!(
        get_product_by_external_id(&pool, "p-2").await,
        Err(DbError::NotFound)
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn chunked_sink_handles_duplicates_across_input(pool: sqlx::PgPool) {
    let products: Vec<CanonicalProduct> = (0..7)
        .map(|i| product(&format!("p-{}", i % 5), 100 * i))
        .collect();

    let report = persist_batch(
        &pool,
        &products,
        &[],
        &[],
        SinkOptions {
            chunk_size: 2,
            sync_run_id: None,
        },
    )
    .await
    .expect("persist_batch failed");

    assert_eq!(report.products, 5);
    let row = get_product_by_external_id(&pool, "p-0")
        .await
        .expect("product should exist");
    assert_eq!(row.price_cents, 500, "last occurrence wins");
}

#[sqlx::test(migrations = "../../migrations")]
async fn placeholder_customer_fields_do_not_clobber_real_ones(pool: sqlx::PgPool) {
    upsert_customers(&pool, &[customer("c-1", "real@example.com")])
        .await
        .expect("first upsert failed");

    let mut placeholder = customer("c-1", UNKNOWN_CUSTOMER_EMAIL);
    placeholder.name = UNKNOWN_CUSTOMER_NAME.to_string();
    upsert_customers(&pool, &[placeholder])
        .await
        .expect("second upsert failed");

    let row = get_customer_by_external_id(&pool, "c-1")
        .await
        .expect("customer should exist");
    assert_eq!(row.email, "real@example.com");
    assert_eq!(row.name, "Maria Souza");
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_upsert_returns_surrogate_ids(pool: sqlx::PgPool) {
    let written = upsert_products(&pool, &[product("p-1", 1), product("p-2", 2)])
        .await
        .expect("upsert failed");
    assert_eq!(written.len(), 2);
    assert!(written.iter().any(|(ext, _)| ext == "p-2"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn summary_listing_filters_by_source_creation_time(pool: sqlx::PgPool) {
    persist_batch(
        &pool,
        &[product("p-1", 1_000)],
        &[customer("c-1", "a@example.com")],
        &[order("o-1", "p-1", "c-1")],
        SinkOptions::default(),
    )
    .await
    .expect("persist_batch failed");

    let inside = list_orders_for_summary(
        &pool,
        Utc.with_ymd_and_hms(2024, 10, 18, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 10, 19, 0, 0, 0).unwrap(),
    )
    .await
    .expect("list failed");
    let outside = list_orders_for_summary(
        &pool,
        Utc.with_ymd_and_hms(2024, 10, 19, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 10, 20, 0, 0, 0).unwrap(),
    )
    .await
    .expect("list failed");

    assert_eq!(inside.len(), 1);
    assert_eq!(inside[0].external_id, "o-1");
    assert!(outside.is_empty());
}

// ---------------------------------------------------------------------------
// Section 2: Webhook events
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn redelivered_webhook_overwrites_single_row(pool: sqlx::PgPool) {
    let first_id = upsert_webhook_event(&pool, &webhook(Some("evt-1"), "waiting_payment"))
        .await
        .expect("first upsert failed");
    let second_id = upsert_webhook_event(&pool, &webhook(Some("evt-1"), "paid"))
        .await
        .expect("second upsert failed");

    assert_eq!(first_id, second_id);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events")
        .fetch_one(&pool)
        .await
        .expect("count failed");
    assert_eq!(count, 1);

    let row = get_webhook_event_by_event_id(&pool, "evt-1")
        .await
        .expect("event should exist");
    assert_eq!(row.status.as_deref(), Some("paid"));
    assert_eq!(row.payload["order_status"], "paid");
    assert_eq!(row.headers["x-kiwify-event"], "order_approved");
}

#[sqlx::test(migrations = "../../migrations")]
async fn webhooks_without_event_id_are_never_merged(pool: sqlx::PgPool) {
    let a = upsert_webhook_event(&pool, &webhook(None, "paid"))
        .await
        .expect("first insert failed");
    let b = upsert_webhook_event(&pool, &webhook(None, "paid"))
        .await
        .expect("second insert failed");
    assert_ne!(a, b);
}

// ---------------------------------------------------------------------------
// Section 3: Sync run lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_lifecycle_queued_to_succeeded(pool: sqlx::PgPool) {
    let run = create_sync_run(&pool, "sales", "cli", None, None)
        .await
        .expect("create_sync_run failed");
    assert_eq!(run.status, "queued");

    start_sync_run(&pool, run.id)
        .await
        .expect("start_sync_run failed");
    complete_sync_run(
        &pool,
        run.id,
        SyncRunCounters {
            orders_upserted: 12,
            records_dropped: 1,
            total_intervals: 2,
            total_pages: 3,
            ..SyncRunCounters::default()
        },
    )
    .await
    .expect("complete_sync_run failed");

    let row = get_sync_run(&pool, run.id)
        .await
        .expect("get_sync_run failed");
    assert_eq!(row.status, "succeeded");
    assert_eq!(row.orders_upserted, 12);
    assert_eq!(row.total_pages, 3);
    assert!(row.started_at.is_some());
    assert!(row.completed_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_transitions_are_guarded(pool: sqlx::PgPool) {
    let run = create_sync_run(&pool, "products", "api", None, None)
        .await
        .expect("create_sync_run failed");

    let err = complete_sync_run(&pool, run.id, SyncRunCounters::default())
        .await
        .expect_err("a queued run cannot complete");
    assert!(matches!(
        err,
        DbError::InvalidSyncRunTransition {
            expected_status: "running",
            ..
        }
    ));

    start_sync_run(&pool, run.id)
        .await
        .expect("start_sync_run failed");
    fail_sync_run(&pool, run.id, "upstream returned 503")
        .await
        .expect("fail_sync_run failed");

    let row = get_sync_run(&pool, run.id)
        .await
        .expect("get_sync_run failed");
    assert_eq!(row.status, "failed");
    assert_eq!(row.error_message.as_deref(), Some("upstream returned 503"));

    let runs = list_sync_runs(&pool, 10).await.expect("list failed");
    assert_eq!(runs.len(), 1);
}
