//! Database operations for the `customers` table.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use kiwidash_core::{CanonicalCustomer, UNKNOWN_CUSTOMER_EMAIL, UNKNOWN_CUSTOMER_NAME};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `customers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerRow {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upserts `customers` in one statement, keyed on `external_id`.
///
/// A placeholder name or email never overwrites a real one already stored.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn upsert_customers(
    pool: &PgPool,
    customers: &[CanonicalCustomer],
) -> Result<Vec<(String, i64)>, DbError> {
    if customers.is_empty() {
        return Ok(Vec::new());
    }

    let n = customers.len();
    let mut external_ids: Vec<String> = Vec::with_capacity(n);
    let mut names: Vec<String> = Vec::with_capacity(n);
    let mut emails: Vec<String> = Vec::with_capacity(n);
    let mut phones: Vec<Option<String>> = Vec::with_capacity(n);
    let mut countries: Vec<Option<String>> = Vec::with_capacity(n);
    let mut created: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(n);
    let mut updated: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(n);
    let mut raws: Vec<serde_json::Value> = Vec::with_capacity(n);

    for c in customers {
        external_ids.push(c.external_id.clone());
        names.push(c.name.clone());
        emails.push(c.email.clone());
        phones.push(c.phone.clone());
        countries.push(c.country.clone());
        created.push(c.source_created_at);
        updated.push(c.source_updated_at);
        raws.push(c.raw.clone());
    }

    let rows = sqlx::query_as::<_, (String, i64)>(
        "INSERT INTO customers \
             (external_id, name, email, phone, country, source_created_at, source_updated_at, raw) \
         SELECT * FROM UNNEST(\
              $1::text[], $2::text[], $3::text[], $4::text[], $5::text[], \
              $6::timestamptz[], $7::timestamptz[], $8::jsonb[]) \
         ON CONFLICT (external_id) DO UPDATE SET \
             name              = CASE WHEN EXCLUDED.name = $9 THEN customers.name ELSE EXCLUDED.name END, \
             email             = CASE WHEN EXCLUDED.email = $10 THEN customers.email ELSE EXCLUDED.email END, \
             phone             = COALESCE(EXCLUDED.phone, customers.phone), \
             country           = COALESCE(EXCLUDED.country, customers.country), \
             source_created_at = COALESCE(EXCLUDED.source_created_at, customers.source_created_at), \
             source_updated_at = COALESCE(EXCLUDED.source_updated_at, customers.source_updated_at), \
             raw               = EXCLUDED.raw, \
             updated_at        = NOW() \
         RETURNING external_id, id",
    )
    .bind(&external_ids)
    .bind(&names)
    .bind(&emails)
    .bind(&phones)
    .bind(&countries)
    .bind(&created)
    .bind(&updated)
    .bind(&raws)
    .bind(UNKNOWN_CUSTOMER_NAME)
    .bind(UNKNOWN_CUSTOMER_EMAIL)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn customer_ids_by_external_id(
    pool: &PgPool,
    external_ids: &[String],
) -> Result<HashMap<String, i64>, DbError> {
    if external_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT external_id, id FROM customers WHERE external_id = ANY($1::text[])",
    )
    .bind(external_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no customer has `external_id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_customer_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<CustomerRow, DbError> {
    sqlx::query_as::<_, CustomerRow>(
        "SELECT id, external_id, name, email, phone, country, \
                source_created_at, source_updated_at, raw, created_at, updated_at \
         FROM customers \
         WHERE external_id = $1",
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
