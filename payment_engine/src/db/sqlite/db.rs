use std::fmt::Debug;

use chrono::Utc;
use log::debug;
use sqlx::SqlitePool;

use crate::{
    db::{
        common::{AuditQueryFilter, InsertKeyResult, OrderQueryFilter, PaymentGatewayDatabase},
        sqlite::{audit, db_url, idempotency, new_pool, orders, payments, SqliteDatabaseError},
    },
    db_types::{
        AuditLogEntry, NewAuditEntry, NewOrder, NewPayment, Order, OrderId, OrderStatusType, Payment, PaymentId,
    },
    provider::ProviderOutcome,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase").field("url", &self.url).finish()
    }
}

impl SqliteDatabase {
    /// Creates a new database connection pool using the `PPG_DATABASE_URL` environment variable, or the default.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    type Error = SqliteDatabaseError;

    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(order, &mut conn).await
    }

    async fn fetch_order(&self, order_id: &OrderId, customer_id: &str) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(order_id, customer_id, &mut conn).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders(query, &mut conn).await
    }

    async fn begin_attempt(&self, order: &Order, payment: NewPayment) -> Result<Option<(Payment, Order)>, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let opened = orders::try_open_attempt(order.id, order.status, order.attempts, &mut tx).await?;
        if !opened {
            tx.rollback().await?;
            debug!(
                "⚡️ Order {} changed underneath attempt {} (status was {}, attempts {}). Backing out.",
                order.order_id, payment.payment_id, order.status, order.attempts
            );
            return Ok(None);
        }
        let payment = payments::insert_payment(payment, &mut tx).await?;
        let order = orders::fetch_order_by_pk(order.id, &mut tx).await?;
        tx.commit().await?;
        Ok(Some((payment, order)))
    }

    async fn mark_payment_processing(&self, payment_id: &PaymentId) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        payments::mark_processing(payment_id, &mut conn).await
    }

    async fn record_outcome(
        &self,
        payment_id: &PaymentId,
        outcome: &ProviderOutcome,
    ) -> Result<Option<(Payment, Order)>, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::apply_outcome(payment_id, outcome, &mut tx).await?;
        let order = orders::fetch_order_unscoped(&payment.order_id, &mut tx)
            .await?
            .ok_or_else(|| SqliteDatabaseError::OrderNotFound(payment.order_id.clone()))?;
        let new_status = OrderStatusType::after_attempt(outcome.is_approved(), order.attempts, order.max_attempts);
        let paid_at = outcome.is_approved().then(Utc::now);
        let applied = orders::apply_attempt_outcome(order.id, new_status, paid_at, &mut tx).await?;
        if !applied {
            tx.rollback().await?;
            debug!(
                "⚡️ Order {} was not processing when the outcome for payment {payment_id} arrived. Backing out.",
                order.order_id
            );
            return Ok(None);
        }
        let order = orders::fetch_order_by_pk(order.id, &mut tx).await?;
        tx.commit().await?;
        Ok(Some((payment, order)))
    }

    async fn try_insert_idempotency_key(
        &self,
        key: &str,
        customer_id: &str,
        request_hash: &str,
    ) -> Result<InsertKeyResult, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        idempotency::try_insert_key(key, customer_id, request_hash, &mut conn).await
    }

    async fn complete_idempotency_key(
        &self,
        key: &str,
        customer_id: &str,
        response: &serde_json::Value,
    ) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        idempotency::complete_key(key, customer_id, response, &mut conn).await
    }

    async fn release_idempotency_key(&self, key: &str, customer_id: &str) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        idempotency::release_key(key, customer_id, &mut conn).await
    }

    async fn write_audit_entry(&self, entry: NewAuditEntry) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        audit::insert_entry(entry, &mut conn).await
    }

    async fn fetch_audit_entries(&self, query: AuditQueryFilter) -> Result<Vec<AuditLogEntry>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        audit::fetch_entries(query, &mut conn).await
    }

    async fn mark_webhook_dispatched(&self, payment_id: &PaymentId) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        payments::mark_webhook_dispatched(payment_id, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.pool.close().await;
        Ok(())
    }
}
