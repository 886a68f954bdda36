use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db::{common::OrderQueryFilter, sqlite::SqliteDatabaseError},
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
};

const ORDER_COLUMNS: &str = "id, order_id, customer_id, memo, amount, currency, status, attempts, max_attempts, \
                             created_at, updated_at, expires_at, paid_at";

pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, SqliteDatabaseError> {
    sqlx::query(
        r#"
            INSERT INTO orders (order_id, customer_id, memo, amount, currency, max_attempts, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7);
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.customer_id)
    .bind(&order.memo)
    .bind(order.amount)
    .bind(order.currency)
    .bind(order.max_attempts)
    .bind(order.expires_at)
    .execute(&mut *conn)
    .await?;
    fetch_order_unscoped(&order.order_id, conn)
        .await?
        .ok_or_else(|| SqliteDatabaseError::OrderNotFound(order.order_id.clone()))
}

/// Fetches an order scoped to its owner. An order belonging to another customer is reported as absent.
pub async fn fetch_order(
    order_id: &OrderId,
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let q = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1 AND customer_id = $2");
    let order = sqlx::query_as::<_, Order>(&q).bind(order_id).bind(customer_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_unscoped(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let q = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1");
    let order = sqlx::query_as::<_, Order>(&q).bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn fetch_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders "));
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(customer_id) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(customer_id);
    }
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.0);
    }
    if !query.statuses.is_empty() {
        let statuses = query.statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    builder.push(" ORDER BY created_at ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(orders)
}

/// The conditional half of opening an attempt: moves the order to `Processing` and bumps the attempt counter, but
/// only if the order still has the status and attempt count the caller read. Returns whether a row was updated;
/// `false` means the race was lost and the caller must fail closed.
pub async fn try_open_attempt(
    order_pk: i64,
    expected_status: OrderStatusType,
    expected_attempts: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let res = sqlx::query(
        r#"
            UPDATE orders SET status = $1, attempts = attempts + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = $3 AND attempts = $4;
        "#,
    )
    .bind(OrderStatusType::Processing)
    .bind(order_pk)
    .bind(expected_status)
    .bind(expected_attempts)
    .execute(conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Applies the post-attempt status to an order. Conditional on `Processing` so that a concurrent or repeated
/// completion can never mutate an order that has already reached a terminal state.
pub async fn apply_attempt_outcome(
    order_pk: i64,
    new_status: OrderStatusType,
    paid_at: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let res = sqlx::query(
        r#"
            UPDATE orders SET status = $1, paid_at = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = $4;
        "#,
    )
    .bind(new_status)
    .bind(paid_at)
    .bind(order_pk)
    .bind(OrderStatusType::Processing)
    .execute(conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn fetch_order_by_pk(order_pk: i64, conn: &mut SqliteConnection) -> Result<Order, SqliteDatabaseError> {
    let q = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    let order = sqlx::query_as::<_, Order>(&q)
        .bind(order_pk)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| SqliteDatabaseError::QueryError(format!("Order row {order_pk} disappeared")))?;
    Ok(order)
}
