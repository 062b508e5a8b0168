use kiwidash_core::IncomingWebhookEvent;
use kiwidash_db::{persist_batch, upsert_webhook_event, SinkOptions};
use kiwidash_ingest::normalize_sales_batch;
use kiwidash_ingest::webhook::sale_payload;
use serde::Serialize;
use sqlx::PgPool;

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub event_row_id: i64,
    pub event_id: Option<String>,
    pub trigger: Option<String>,
    /// Whether the delivery carried a sale that reached the `orders` table.
    pub order_persisted: bool,
}

/// Stores a resolved delivery, then pushes the sale it carries (if any)
/// through the sink as a batch of one.
///
/// The event row is written first, so a payload that is not a usable sale
/// is still recorded.
///
/// # Errors
///
/// Returns [`SyncError::Persistence`] if the event upsert or the sale
/// persistence fails.
pub async fn ingest_webhook(
    pool: &PgPool,
    event: &IncomingWebhookEvent,
    chunk_size: usize,
) -> Result<WebhookOutcome, SyncError> {
    let event_row_id = upsert_webhook_event(pool, event).await?;

    let sale = sale_payload(&event.payload);
    let batch = normalize_sales_batch(std::slice::from_ref(sale));

    let order_persisted = if batch.orders.is_empty() {
        tracing::debug!(
            event_row_id,
            trigger = event.trigger.as_deref().unwrap_or("-"),
            "webhook payload carries no persistable sale"
        );
        false
    } else {
        let report = persist_batch(
            pool,
            &batch.products,
            &batch.customers,
            &batch.orders,
            SinkOptions {
                chunk_size,
                sync_run_id: None,
            },
        )
        .await?;
        report.orders > 0
    };

    tracing::info!(
        event_row_id,
        event_id = event.event_id.as_deref().unwrap_or("-"),
        trigger = event.trigger.as_deref().unwrap_or("-"),
        order_persisted,
        "webhook ingested"
    );

    Ok(WebhookOutcome {
        event_row_id,
        event_id: event.event_id.clone(),
        trigger: event.trigger.clone(),
        order_persisted,
    })
}
