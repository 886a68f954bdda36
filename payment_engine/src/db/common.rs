use std::future::Future;

use crate::{
    db_types::{
        AuditEventType, AuditLogEntry, IdempotencyRecord, NewAuditEntry, NewOrder, NewPayment, Order, OrderId,
        OrderStatusType, Payment, PaymentId,
    },
    provider::ProviderOutcome,
};

/// The result of an idempotency-key admission attempt. A conflict on the unique `(key, customer)` constraint means
/// another submission won the race; it is a normal outcome, not an error.
#[derive(Debug, Clone)]
pub enum InsertKeyResult {
    Inserted,
    AlreadyExists(IdempotencyRecord),
}

/// This trait defines the behaviour a backend must provide to support the payment engine.
///
/// The operations are deliberately narrow. Each multi-row mutation is a single trait method so that a backend can
/// make it atomic; the flow API composes *only* these operations and owns no transaction of its own.
///
/// Methods return `impl Future + Send` rather than plain `async fn` because the webhook notifier awaits them from
/// inside spawned handler tasks, which need `Send` futures. Implementations can still be written as `async fn`.
pub trait PaymentGatewayDatabase: Clone {
    type Error: std::error::Error;

    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a brand-new order and returns the stored row.
    fn insert_order(&self, order: NewOrder) -> impl Future<Output = Result<Order, Self::Error>> + Send;

    /// Fetches the order with the given id, scoped to its owner. An order belonging to a different customer is
    /// reported as absent, not as a permission failure.
    fn fetch_order(
        &self,
        order_id: &OrderId,
        customer_id: &str,
    ) -> impl Future<Output = Result<Option<Order>, Self::Error>> + Send;

    /// Fetches orders matching the given filter, ordered by creation time.
    fn search_orders(&self, query: OrderQueryFilter) -> impl Future<Output = Result<Vec<Order>, Self::Error>> + Send;

    /// Opens a payment attempt in a single atomic transaction:
    /// * the new payment is stored in `Pending` status;
    /// * the order moves to `Processing` and its attempt counter is incremented, conditional on the order still
    ///   having the status and attempt count the caller read.
    ///
    /// If the conditional update matches no row the race was lost; the transaction is rolled back (including the
    /// payment insert) and `None` is returned so the caller can fail closed.
    fn begin_attempt(
        &self,
        order: &Order,
        payment: NewPayment,
    ) -> impl Future<Output = Result<Option<(Payment, Order)>, Self::Error>> + Send;

    /// Moves a pending payment to `Processing`, immediately before the authorization provider is called.
    fn mark_payment_processing(&self, payment_id: &PaymentId)
        -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Applies a provider outcome in a single atomic transaction:
    /// * the payment becomes `Success`/`Failed`, storing the gateway payload, failure reason and processed time;
    /// * the order status follows [`OrderStatusType::after_attempt`], setting `paid_at` on success. The order
    ///   update is conditional on `Processing` status, so a paid order can never be mutated again.
    ///
    /// If the order is no longer `Processing` the whole transaction, payment finalization included, is rolled back
    /// and `None` is returned; nothing about a completed attempt may commit once the order has moved on.
    fn record_outcome(
        &self,
        payment_id: &PaymentId,
        outcome: &ProviderOutcome,
    ) -> impl Future<Output = Result<Option<(Payment, Order)>, Self::Error>> + Send;

    /// Atomically claims the `(key, customer)` pair: a single insert backed by a unique constraint. Expired records
    /// are purged first and treated as absent. Exactly one of any set of concurrent duplicate submissions receives
    /// [`InsertKeyResult::Inserted`].
    fn try_insert_idempotency_key(
        &self,
        key: &str,
        customer_id: &str,
        request_hash: &str,
    ) -> impl Future<Output = Result<InsertKeyResult, Self::Error>> + Send;

    /// Marks an admitted key as completed and caches the response body. The cached response is written exactly
    /// once; a record that is already `Completed` is left untouched.
    fn complete_idempotency_key(
        &self,
        key: &str,
        customer_id: &str,
        response: &serde_json::Value,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Deletes the record for a failed operation so the key remains retryable with a fresh attempt.
    fn release_idempotency_key(
        &self,
        key: &str,
        customer_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Appends one audit entry. The audit log is a pure sink; entries are never updated or deleted.
    fn write_audit_entry(&self, entry: NewAuditEntry) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Fetches audit entries matching the filter, oldest first.
    fn fetch_audit_entries(
        &self,
        query: AuditQueryFilter,
    ) -> impl Future<Output = Result<Vec<AuditLogEntry>, Self::Error>> + Send;

    /// Records that the webhook for this payment was handed to the transport.
    fn mark_webhook_dispatched(&self, payment_id: &PaymentId)
        -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Closes the database connection.
    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async { Ok(()) }
    }
}

//--------------------------------------   OrderQueryFilter    -------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    pub customer_id: Option<String>,
    pub order_id: Option<OrderId>,
    pub statuses: Vec<OrderStatusType>,
}

impl OrderQueryFilter {
    pub fn with_customer_id(mut self, customer_id: &str) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self
    }

    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() && self.order_id.is_none() && self.statuses.is_empty()
    }
}

//--------------------------------------   AuditQueryFilter    -------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct AuditQueryFilter {
    pub order_id: Option<OrderId>,
    pub payment_id: Option<PaymentId>,
    pub event: Option<AuditEventType>,
}

impl AuditQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_payment_id(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn with_event(mut self, event: AuditEventType) -> Self {
        self.event = Some(event);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() && self.payment_id.is_none() && self.event.is_none()
    }
}
