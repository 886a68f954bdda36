use log::trace;
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    db::{common::AuditQueryFilter, sqlite::SqliteDatabaseError},
    db_types::{AuditLogEntry, NewAuditEntry},
};

const AUDIT_COLUMNS: &str = "id, payment_id, order_id, customer_id, event, severity, message, metadata, ip_address, \
                             user_agent, duration_ms, created_at";

pub async fn insert_entry(entry: NewAuditEntry, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    let (ip_address, user_agent) = match entry.origin {
        Some(origin) => (origin.ip_address, origin.user_agent),
        None => (None, None),
    };
    sqlx::query(
        r#"
            INSERT INTO audit_log
                (payment_id, order_id, customer_id, event, severity, message, metadata, ip_address, user_agent,
                 duration_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10);
        "#,
    )
    .bind(entry.payment_id)
    .bind(entry.order_id)
    .bind(entry.customer_id)
    .bind(entry.event)
    .bind(entry.severity)
    .bind(entry.message)
    .bind(entry.metadata.map(Json))
    .bind(ip_address)
    .bind(user_agent)
    .bind(entry.duration_ms)
    .execute(conn)
    .await?;
    Ok(())
}

/// Fetches audit entries matching the filter, oldest first. The insertion id is the ordering key, so entries for
/// a single order read as the exact sequence of events that happened to it.
pub async fn fetch_entries(
    query: AuditQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<AuditLogEntry>, SqliteDatabaseError> {
    let mut builder = QueryBuilder::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_log "));
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.0);
    }
    if let Some(payment_id) = query.payment_id {
        where_clause.push("payment_id = ");
        where_clause.push_bind_unseparated(payment_id.0);
    }
    if let Some(event) = query.event {
        where_clause.push("event = ");
        where_clause.push_bind_unseparated(event.to_string());
    }
    builder.push(" ORDER BY id ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let entries = builder.build_query_as::<AuditLogEntry>().fetch_all(conn).await?;
    Ok(entries)
}
