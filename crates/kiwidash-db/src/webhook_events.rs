//! Persistence for inbound webhook deliveries.

use chrono::{DateTime, Utc};
use kiwidash_core::IncomingWebhookEvent;
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebhookEventRow {
    pub id: i64,
    pub event_id: Option<String>,
    pub trigger: Option<String>,
    pub status: Option<String>,
    pub source: String,
    pub webhook_id: Option<String>,
    pub webhook_token: Option<String>,
    pub headers: serde_json::Value,
    pub payload: serde_json::Value,
    pub occurred_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inserts or overwrites a webhook event, keyed on `event_id`.
///
/// A redelivery of a known event id replaces the mutable fields in place.
/// Events without an id never conflict (NULLs are distinct) and always get
/// a fresh row. Returns the row id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_webhook_event(
    pool: &PgPool,
    event: &IncomingWebhookEvent,
) -> Result<i64, DbError> {
    let headers = serde_json::to_value(&event.headers).unwrap_or_default();

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO webhook_events \
             (event_id, trigger, status, source, webhook_id, webhook_token, headers, payload, \
              occurred_at, received_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (event_id) DO UPDATE SET \
             trigger       = EXCLUDED.trigger, \
             status        = EXCLUDED.status, \
             source        = EXCLUDED.source, \
             webhook_id    = COALESCE(EXCLUDED.webhook_id, webhook_events.webhook_id), \
             webhook_token = COALESCE(EXCLUDED.webhook_token, webhook_events.webhook_token), \
             headers       = EXCLUDED.headers, \
             payload       = EXCLUDED.payload, \
             occurred_at   = COALESCE(EXCLUDED.occurred_at, webhook_events.occurred_at), \
             received_at   = EXCLUDED.received_at, \
             updated_at    = NOW() \
         RETURNING id",
    )
    .bind(event.event_id.as_deref())
    .bind(event.trigger.as_deref())
    .bind(event.status.as_deref())
    .bind(&event.source)
    .bind(event.webhook_id.as_deref())
    .bind(event.webhook_token.as_deref())
    .bind(&headers)
    .bind(&event.payload)
    .bind(event.occurred_at)
    .bind(event.received_at)
    .fetch_one(pool)
    .await?;

    tracing::debug!(
        id,
        event_id = event.event_id.as_deref().unwrap_or("-"),
        trigger = event.trigger.as_deref().unwrap_or("-"),
        "webhook event stored"
    );

    Ok(id)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no event has `event_id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_webhook_event_by_event_id(
    pool: &PgPool,
    event_id: &str,
) -> Result<WebhookEventRow, DbError> {
    sqlx::query_as::<_, WebhookEventRow>(
        "SELECT id, event_id, trigger, status, source, webhook_id, webhook_token, headers, \
                payload, occurred_at, received_at, created_at, updated_at \
         FROM webhook_events \
         WHERE event_id = $1",
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
