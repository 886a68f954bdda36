use chrono::Utc;
use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db::{common::InsertKeyResult, sqlite::SqliteDatabaseError},
    db_types::{IdempotencyRecord, IdempotencyStatus, IDEMPOTENCY_KEY_TTL},
};

const KEY_COLUMNS: &str = "id, key, customer_id, request_hash, status, response, created_at, expires_at";

pub async fn fetch_key(
    key: &str,
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<IdempotencyRecord>, SqliteDatabaseError> {
    let q = format!("SELECT {KEY_COLUMNS} FROM idempotency_keys WHERE key = $1 AND customer_id = $2");
    let record = sqlx::query_as::<_, IdempotencyRecord>(&q).bind(key).bind(customer_id).fetch_optional(conn).await?;
    Ok(record)
}

/// Claims the `(key, customer)` pair. The insert is backed by the unique constraint, so of any number of concurrent
/// duplicate submissions exactly one sees [`InsertKeyResult::Inserted`]; the rest receive the surviving record.
///
/// An expired record is purged first and treated as if the key had never been seen.
pub async fn try_insert_key(
    key: &str,
    customer_id: &str,
    request_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<InsertKeyResult, SqliteDatabaseError> {
    let now = Utc::now();
    if let Some(existing) = fetch_key(key, customer_id, &mut *conn).await? {
        if existing.is_expired_at(now) {
            debug!("🔑️ Purging expired idempotency record for key {key}");
            sqlx::query("DELETE FROM idempotency_keys WHERE id = $1").bind(existing.id).execute(&mut *conn).await?;
        } else {
            return Ok(InsertKeyResult::AlreadyExists(existing));
        }
    }
    let res = sqlx::query(
        r#"
            INSERT INTO idempotency_keys (key, customer_id, request_hash, status, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key, customer_id) DO NOTHING;
        "#,
    )
    .bind(key)
    .bind(customer_id)
    .bind(request_hash)
    .bind(IdempotencyStatus::Processing)
    .bind(now + IDEMPOTENCY_KEY_TTL)
    .execute(&mut *conn)
    .await?;
    if res.rows_affected() == 1 {
        return Ok(InsertKeyResult::Inserted);
    }
    // Lost the race to a concurrent submission. The winner's record must exist now.
    match fetch_key(key, customer_id, conn).await? {
        Some(existing) => Ok(InsertKeyResult::AlreadyExists(existing)),
        None => Err(SqliteDatabaseError::QueryError(format!("Idempotency record for key {key} vanished mid-insert"))),
    }
}

/// Caches the response against an admitted key. Only a `Processing` record is completed; a record that already
/// carries a cached response is left untouched.
pub async fn complete_key(
    key: &str,
    customer_id: &str,
    response: &serde_json::Value,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        r#"
            UPDATE idempotency_keys SET status = $1, response = $2
            WHERE key = $3 AND customer_id = $4 AND status = $5;
        "#,
    )
    .bind(IdempotencyStatus::Completed)
    .bind(Json(response))
    .bind(key)
    .bind(customer_id)
    .bind(IdempotencyStatus::Processing)
    .execute(conn)
    .await?;
    Ok(())
}

/// Drops the record for an operation that failed before producing a cacheable response, so the client can retry
/// with the same key.
pub async fn release_key(key: &str, customer_id: &str, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    sqlx::query("DELETE FROM idempotency_keys WHERE key = $1 AND customer_id = $2")
        .bind(key)
        .bind(customer_id)
        .execute(conn)
        .await?;
    Ok(())
}
