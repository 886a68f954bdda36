use chrono::Utc;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewPayment, Payment, PaymentId, PaymentStatusType},
    provider::ProviderOutcome,
};

const PAYMENT_COLUMNS: &str = "id, payment_id, order_id, customer_id, amount, currency, method, status, instrument, \
                               gateway_response, failure_reason, idempotency_key, retry_count, webhook_sent, \
                               webhook_sent_at, processed_at, created_at, updated_at";

pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, SqliteDatabaseError> {
    sqlx::query(
        r#"
            INSERT INTO payments
                (payment_id, order_id, customer_id, amount, currency, method, instrument, idempotency_key, retry_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9);
        "#,
    )
    .bind(&payment.payment_id)
    .bind(&payment.order_id)
    .bind(&payment.customer_id)
    .bind(payment.amount)
    .bind(payment.currency)
    .bind(payment.method)
    .bind(Json(&payment.instrument))
    .bind(&payment.idempotency_key)
    .bind(payment.retry_count)
    .execute(&mut *conn)
    .await?;
    fetch_payment(&payment.payment_id, conn)
        .await?
        .ok_or_else(|| SqliteDatabaseError::PaymentNotFound(payment.payment_id.clone()))
}

pub async fn fetch_payment(
    payment_id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, SqliteDatabaseError> {
    let q = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = $1");
    let payment = sqlx::query_as::<_, Payment>(&q).bind(payment_id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn mark_processing(payment_id: &PaymentId, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    let res = sqlx::query(
        r#"
            UPDATE payments SET status = $1, updated_at = CURRENT_TIMESTAMP
            WHERE payment_id = $2 AND status = $3;
        "#,
    )
    .bind(PaymentStatusType::Processing)
    .bind(payment_id)
    .bind(PaymentStatusType::Pending)
    .execute(conn)
    .await?;
    if res.rows_affected() == 0 {
        return Err(SqliteDatabaseError::PaymentNotFound(payment_id.clone()));
    }
    Ok(())
}

/// Writes the provider's verdict against the payment and returns the updated row.
pub async fn apply_outcome(
    payment_id: &PaymentId,
    outcome: &ProviderOutcome,
    conn: &mut SqliteConnection,
) -> Result<Payment, SqliteDatabaseError> {
    let (status, gateway, failure_reason) = match outcome {
        ProviderOutcome::Approved { gateway } => (PaymentStatusType::Success, Some(gateway), None),
        ProviderOutcome::Declined { reason, gateway } => {
            (PaymentStatusType::Failed, gateway.as_ref(), Some(reason.as_str()))
        },
    };
    sqlx::query(
        r#"
            UPDATE payments
            SET status = $1, gateway_response = $2, failure_reason = $3, processed_at = $4,
                updated_at = CURRENT_TIMESTAMP
            WHERE payment_id = $5;
        "#,
    )
    .bind(status)
    .bind(gateway.map(Json))
    .bind(failure_reason)
    .bind(Utc::now())
    .bind(payment_id)
    .execute(&mut *conn)
    .await?;
    fetch_payment(payment_id, conn).await?.ok_or_else(|| SqliteDatabaseError::PaymentNotFound(payment_id.clone()))
}

pub async fn mark_webhook_dispatched(
    payment_id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let res = sqlx::query(
        r#"
            UPDATE payments SET webhook_sent = 1, webhook_sent_at = $1, updated_at = CURRENT_TIMESTAMP
            WHERE payment_id = $2;
        "#,
    )
    .bind(Utc::now())
    .bind(payment_id)
    .execute(conn)
    .await?;
    if res.rows_affected() == 0 {
        return Err(SqliteDatabaseError::PaymentNotFound(payment_id.clone()));
    }
    Ok(())
}
