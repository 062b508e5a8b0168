//! The `ingest_events` audit log: one row per `(entity_type, external_id)`,
//! overwritten on every re-ingestion.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Product,
    Customer,
    Order,
}

impl EntityType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Customer => "customer",
            EntityType::Order => "order",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event to be recorded for an entity that was just upserted.
#[derive(Debug, Clone)]
pub struct NewIngestEvent {
    pub entity_type: EntityType,
    pub external_id: String,
    pub entity_id: i64,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestEventRow {
    pub id: i64,
    pub entity_type: String,
    pub external_id: String,
    pub entity_id: i64,
    pub sync_run_id: Option<i64>,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// Records `events`, keyed on `(entity_type, external_id)`. Returns the
/// number of rows written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn record_ingest_events(
    pool: &PgPool,
    events: &[NewIngestEvent],
    sync_run_id: Option<i64>,
) -> Result<u64, DbError> {
    if events.is_empty() {
        return Ok(0);
    }

    let entity_types: Vec<&str> = events.iter().map(|e| e.entity_type.as_str()).collect();
    let external_ids: Vec<&str> = events.iter().map(|e| e.external_id.as_str()).collect();
    let entity_ids: Vec<i64> = events.iter().map(|e| e.entity_id).collect();
    let payloads: Vec<serde_json::Value> = events.iter().map(|e| e.payload.clone()).collect();

    let result = sqlx::query(
        "INSERT INTO ingest_events (entity_type, external_id, entity_id, sync_run_id, payload) \
         SELECT t.entity_type, t.external_id, t.entity_id, $4, t.payload \
         FROM UNNEST($1::text[], $2::text[], $3::int8[], $5::jsonb[]) \
              AS t(entity_type, external_id, entity_id, payload) \
         ON CONFLICT (entity_type, external_id) DO UPDATE SET \
             entity_id   = EXCLUDED.entity_id, \
             sync_run_id = EXCLUDED.sync_run_id, \
             payload     = EXCLUDED.payload, \
             recorded_at = NOW()",
    )
    .bind(&entity_types)
    .bind(&external_ids)
    .bind(&entity_ids)
    .bind(sync_run_id)
    .bind(&payloads)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Returns the most recent `limit` events, optionally restricted to one
/// entity type.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ingest_events(
    pool: &PgPool,
    entity_type: Option<EntityType>,
    limit: i64,
) -> Result<Vec<IngestEventRow>, DbError> {
    let rows = sqlx::query_as::<_, IngestEventRow>(
        "SELECT id, entity_type, external_id, entity_id, sync_run_id, payload, recorded_at \
         FROM ingest_events \
         WHERE ($1::text IS NULL OR entity_type = $1) \
         ORDER BY recorded_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(entity_type.map(EntityType::as_str))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
