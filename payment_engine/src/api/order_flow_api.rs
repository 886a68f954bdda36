use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::timeout;

use crate::{
    api::errors::PaymentFlowError,
    db::common::{AuditQueryFilter, InsertKeyResult, OrderQueryFilter, PaymentGatewayDatabase},
    db_types::{
        AuditEventType, AuditLogEntry, AuditSeverity, IdempotencyStatus, NewAuditEntry, NewOrder, NewPayment, Order,
        OrderId, OrderStatusType, Payment, PaymentInstrument, RequestOrigin,
    },
    events::{EventProducers, OrderCreatedEvent, PaymentCompletedEvent},
    helpers::request_fingerprint,
    provider::{AuthRequest, AuthorizationProvider, ProviderOutcome},
};

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_IDEMPOTENCY_KEY_LEN: usize = 16;
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

//--------------------------------------    PaymentRequest     -------------------------------------------------------
/// One payment attempt as submitted by a client. The instrument carries the raw secrets; they live only as long as
/// this request and the provider call.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub customer_id: String,
    pub idempotency_key: String,
    pub instrument: PaymentInstrument,
    pub origin: RequestOrigin,
}

impl PaymentRequest {
    pub fn new(order_id: OrderId, customer_id: &str, idempotency_key: &str, instrument: PaymentInstrument) -> Self {
        Self {
            order_id,
            customer_id: customer_id.to_string(),
            idempotency_key: idempotency_key.to_string(),
            instrument,
            origin: RequestOrigin::default(),
        }
    }

    pub fn with_origin(mut self, origin: RequestOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// The stable fingerprint of this request's intent. Two requests with the same key must agree on this, or the
    /// key reuse is rejected.
    fn fingerprint(&self) -> String {
        let body = json!({
            "order_id": self.order_id,
            "method": self.instrument.method(),
            "instrument": self.instrument.summary(),
        });
        request_fingerprint(&self.customer_id, &body)
    }
}

//--------------------------------------     PaymentResult     -------------------------------------------------------
/// The outcome of an executed attempt: the terminal payment and the order as it stands afterwards. This is also the
/// body that gets cached against the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResult {
    pub payment: Payment,
    pub order: Order,
}

/// Whether the caller's request actually ran, or was answered from the idempotency cache.
#[derive(Debug, Clone)]
pub enum AttemptResponse {
    /// The attempt was executed against the provider. Approved and declined attempts both land here.
    Executed(PaymentResult),
    /// A completed request with the same key and fingerprint was replayed from the cache. The provider was not
    /// called and no state changed.
    Replayed(serde_json::Value),
}

impl AttemptResponse {
    pub fn is_replay(&self) -> bool {
        matches!(self, AttemptResponse::Replayed(_))
    }
}

/// How the idempotency ledger answers an admission request.
#[derive(Debug, Clone)]
pub enum AdmitOutcome {
    /// The key was claimed; the operation may run.
    Proceed,
    /// A completed request with this key and fingerprint exists; this is its cached response, byte for byte.
    CachedHit(serde_json::Value),
    /// A request with this key is still in flight.
    Conflict,
}

//--------------------------------------    PaymentFlowApi     -------------------------------------------------------
/// `PaymentFlowApi` is the primary API for creating orders and driving payment attempts through the authorization
/// provider. It composes the narrow atomic operations of the backend; it holds no transaction of its own.
pub struct PaymentFlowApi<B, P> {
    db: B,
    provider: P,
    producers: EventProducers,
    provider_timeout: Duration,
}

impl<B, P> Debug for PaymentFlowApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B, P> PaymentFlowApi<B, P> {
    pub fn new(db: B, provider: P, producers: EventProducers) -> Self {
        Self { db, provider, producers, provider_timeout: DEFAULT_PROVIDER_TIMEOUT }
    }

    pub fn with_provider_timeout(mut self, provider_timeout: Duration) -> Self {
        self.provider_timeout = provider_timeout;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B, P> PaymentFlowApi<B, P>
where
    B: PaymentGatewayDatabase,
    P: AuthorizationProvider,
{
    /// Creates a new order. The amount must be positive; everything else about the order is the caller's business.
    pub async fn create_order(
        &self,
        order: NewOrder,
        origin: RequestOrigin,
    ) -> Result<Order, PaymentFlowError<B>> {
        if !order.amount.is_positive() {
            return Err(PaymentFlowError::InvalidAmount);
        }
        let order = self.db.insert_order(order).await.map_err(PaymentFlowError::DatabaseError)?;
        debug!("🛒️ Order {} created for customer {}. Amount: {}", order.order_id, order.customer_id, order.amount);
        let entry = NewAuditEntry::new(
            AuditEventType::OrderCreated,
            AuditSeverity::Info,
            format!("Order created for {} {}", order.amount, order.currency),
        )
        .for_order(&order.order_id)
        .for_customer(&order.customer_id)
        .with_origin(origin);
        self.audit(entry).await;
        self.call_order_created_hook(&order).await;
        Ok(order)
    }

    /// Executes one idempotent payment attempt against an order.
    ///
    /// The idempotency key is claimed before any order state is touched. A completed request with the same key and
    /// fingerprint is replayed from the cache without calling the provider; an in-flight duplicate is turned away
    /// with [`PaymentFlowError::IdempotencyConflict`]; a key reused for a different request is rejected outright.
    ///
    /// If the attempt fails any precondition, the key is released again so the client can retry with it once the
    /// problem is fixed. A decline is not a precondition failure: the attempt ran, the outcome is cached, and
    /// replays of the same key return the decline.
    pub async fn attempt_payment(&self, request: PaymentRequest) -> Result<AttemptResponse, PaymentFlowError<B>> {
        validate_idempotency_key(&request.idempotency_key)?;
        let fingerprint = request.fingerprint();
        match self.admit_idempotent(&request.idempotency_key, &request.customer_id, &fingerprint).await? {
            AdmitOutcome::Conflict => Err(PaymentFlowError::IdempotencyConflict),
            AdmitOutcome::CachedHit(response) => {
                debug!("🔁️ Replaying cached response for order {}", request.order_id);
                let entry = NewAuditEntry::new(
                    AuditEventType::IdempotencyHit,
                    AuditSeverity::Info,
                    "Duplicate request served from the idempotency cache",
                )
                .for_order(&request.order_id)
                .for_customer(&request.customer_id)
                .with_origin(request.origin.clone());
                self.audit(entry).await;
                Ok(AttemptResponse::Replayed(response))
            },
            AdmitOutcome::Proceed => match self.execute_attempt(&request).await {
                Ok(result) => {
                    let response = serde_json::to_value(&result)
                        .map_err(|e| PaymentFlowError::ResponseEncoding(e.to_string()))?;
                    self.db
                        .complete_idempotency_key(&request.idempotency_key, &request.customer_id, &response)
                        .await
                        .map_err(PaymentFlowError::DatabaseError)?;
                    Ok(AttemptResponse::Executed(result))
                },
                Err(e) => {
                    debug!("🔁️ Attempt for order {} failed before completion. Releasing key.", request.order_id);
                    if let Err(release_err) =
                        self.db.release_idempotency_key(&request.idempotency_key, &request.customer_id).await
                    {
                        warn!("🔁️ Could not release idempotency key after a failed attempt: {release_err}");
                    }
                    Err(e)
                },
            },
        }
    }

    /// Drives another attempt at an order through the retry path. This is [`Self::attempt_payment`] with an audited
    /// retry marker in front; a fresh order is as retryable as a re-opened one, so clients can loop over this call
    /// until the order settles. The one state the retry path rejects outright is an attempt still in flight: a
    /// retry is only meaningful between attempts.
    pub async fn retry_payment(&self, request: PaymentRequest) -> Result<AttemptResponse, PaymentFlowError<B>> {
        validate_idempotency_key(&request.idempotency_key)?;
        let order = self
            .db
            .fetch_order(&request.order_id, &request.customer_id)
            .await
            .map_err(PaymentFlowError::DatabaseError)?
            .ok_or_else(|| PaymentFlowError::OrderNotFound(request.order_id.clone()))?;
        if order.status == OrderStatusType::Processing {
            return Err(PaymentFlowError::InvalidRetryState(order.order_id));
        }
        check_order_accepts_attempts(&order)?;
        info!("🔁️ Retrying payment on order {}. Attempt {}/{}", order.order_id, order.attempts + 1, order.max_attempts);
        let entry = NewAuditEntry::new(
            AuditEventType::PaymentRetry,
            AuditSeverity::Info,
            format!("Retrying payment. Attempt {}/{}", order.attempts + 1, order.max_attempts),
        )
        .for_order(&order.order_id)
        .for_customer(&order.customer_id)
        .with_origin(request.origin.clone());
        self.audit(entry).await;
        self.attempt_payment(request).await
    }

    pub async fn order_by_id(
        &self,
        order_id: &OrderId,
        customer_id: &str,
    ) -> Result<Option<Order>, PaymentFlowError<B>> {
        self.db.fetch_order(order_id, customer_id).await.map_err(PaymentFlowError::DatabaseError)
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PaymentFlowError<B>> {
        self.db.search_orders(query).await.map_err(PaymentFlowError::DatabaseError)
    }

    /// The full audit trail for an order, oldest entry first.
    pub async fn audit_trail(&self, order_id: &OrderId) -> Result<Vec<AuditLogEntry>, PaymentFlowError<B>> {
        let query = AuditQueryFilter::default().with_order_id(order_id.clone());
        self.db.fetch_audit_entries(query).await.map_err(PaymentFlowError::DatabaseError)
    }

    /// Claims the idempotency key, or resolves what an existing claim means for this request. A live record whose
    /// fingerprint differs from the request is a misused key and is rejected, never replayed.
    pub async fn admit_idempotent(
        &self,
        key: &str,
        customer_id: &str,
        fingerprint: &str,
    ) -> Result<AdmitOutcome, PaymentFlowError<B>> {
        let inserted = self
            .db
            .try_insert_idempotency_key(key, customer_id, fingerprint)
            .await
            .map_err(PaymentFlowError::DatabaseError)?;
        let record = match inserted {
            InsertKeyResult::Inserted => return Ok(AdmitOutcome::Proceed),
            InsertKeyResult::AlreadyExists(record) => record,
        };
        if record.request_hash != fingerprint {
            warn!("🔁️ Idempotency key reuse detected for customer {customer_id}. Rejecting.");
            return Err(PaymentFlowError::IdempotencyKeyReuse);
        }
        match (record.status, record.response) {
            (IdempotencyStatus::Completed, Some(response)) => Ok(AdmitOutcome::CachedHit(response.0)),
            _ => Ok(AdmitOutcome::Conflict),
        }
    }

    /// The attempt pipeline proper: preconditions, state mutation, the provider call, and the outcome. Runs only
    /// after the idempotency key has been claimed.
    async fn execute_attempt(&self, request: &PaymentRequest) -> Result<PaymentResult, PaymentFlowError<B>> {
        let order = self
            .db
            .fetch_order(&request.order_id, &request.customer_id)
            .await
            .map_err(PaymentFlowError::DatabaseError)?
            .ok_or_else(|| PaymentFlowError::OrderNotFound(request.order_id.clone()))?;
        check_order_accepts_attempts(&order)?;

        let new_payment = NewPayment::for_attempt(&order, &request.instrument, &request.idempotency_key);
        let (payment, order) = self
            .db
            .begin_attempt(&order, new_payment)
            .await
            .map_err(PaymentFlowError::DatabaseError)?
            .ok_or_else(|| PaymentFlowError::ConcurrentUpdate(request.order_id.clone()))?;
        debug!(
            "💳️ Payment {} opened on order {}. Attempt {}/{}",
            payment.payment_id, order.order_id, order.attempts, order.max_attempts
        );
        let entry = NewAuditEntry::new(
            AuditEventType::PaymentInitiated,
            AuditSeverity::Info,
            format!("Payment attempt {}/{} initiated via {}", order.attempts, order.max_attempts, payment.method),
        )
        .for_order(&order.order_id)
        .for_payment(&payment.payment_id)
        .for_customer(&order.customer_id)
        .with_origin(request.origin.clone());
        self.audit(entry).await;

        self.db.mark_payment_processing(&payment.payment_id).await.map_err(PaymentFlowError::DatabaseError)?;
        let entry = NewAuditEntry::new(
            AuditEventType::PaymentProcessing,
            AuditSeverity::Info,
            "Authorization request sent to the payment gateway",
        )
        .for_order(&order.order_id)
        .for_payment(&payment.payment_id)
        .for_customer(&order.customer_id);
        self.audit(entry).await;

        let started = Utc::now();
        let outcome = self.authorize(&order, request).await;
        let duration_ms = (Utc::now() - started).num_milliseconds();

        let (payment, order) = self
            .db
            .record_outcome(&payment.payment_id, &outcome)
            .await
            .map_err(PaymentFlowError::DatabaseError)?
            .ok_or_else(|| PaymentFlowError::ConcurrentUpdate(request.order_id.clone()))?;
        let entry = match &outcome {
            ProviderOutcome::Approved { .. } => {
                info!("💳️ Payment {} approved. Order {} is paid.", payment.payment_id, order.order_id);
                NewAuditEntry::new(
                    AuditEventType::PaymentSuccess,
                    AuditSeverity::Success,
                    format!("Payment of {} {} authorized", payment.amount, payment.currency),
                )
            },
            ProviderOutcome::Declined { reason, .. } => {
                info!(
                    "💳️ Payment {} declined: {reason}. Order {} is now {}.",
                    payment.payment_id, order.order_id, order.status
                );
                NewAuditEntry::new(AuditEventType::PaymentFailed, AuditSeverity::Error, format!("Payment declined: {reason}"))
            },
        };
        let entry = entry
            .for_order(&order.order_id)
            .for_payment(&payment.payment_id)
            .for_customer(&order.customer_id)
            .with_duration(duration_ms);
        self.audit(entry).await;

        self.call_payment_completed_hook(&payment, &order).await;
        Ok(PaymentResult { payment, order })
    }

    /// Calls the provider under the configured timeout. A timeout, like a provider error, becomes a synthetic
    /// decline; an unreachable gateway must never leave an order stuck in `Processing`.
    async fn authorize(&self, order: &Order, request: &PaymentRequest) -> ProviderOutcome {
        let auth_request = AuthRequest {
            order_id: order.order_id.clone(),
            amount: order.amount,
            currency: order.currency,
            method: request.instrument.method(),
            instrument: request.instrument.summary(),
        };
        match timeout(self.provider_timeout, self.provider.authorize(auth_request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("💳️ Authorization provider error for order {}: {e}", order.order_id);
                ProviderOutcome::unavailable()
            },
            Err(_) => {
                error!(
                    "💳️ Authorization provider timed out after {:?} for order {}",
                    self.provider_timeout, order.order_id
                );
                ProviderOutcome::unavailable()
            },
        }
    }

    /// Audit writes are best effort. A full payment flow must never be failed because the audit insert was not
    /// possible; the failure is logged instead.
    async fn audit(&self, entry: NewAuditEntry) {
        if let Err(e) = self.db.write_audit_entry(entry).await {
            warn!("📝️ Could not write audit entry: {e}");
        }
    }

    async fn call_order_created_hook(&self, order: &Order) {
        for emitter in &self.producers.order_created_producer {
            trace!("🛒️ Notifying order created subscribers");
            emitter.publish_event(OrderCreatedEvent::new(order.clone())).await;
        }
    }

    async fn call_payment_completed_hook(&self, payment: &Payment, order: &Order) {
        for emitter in &self.producers.payment_completed_producer {
            trace!("💳️ Notifying payment completed subscribers");
            emitter.publish_event(PaymentCompletedEvent::new(payment.clone(), order.clone())).await;
        }
    }
}

fn validate_idempotency_key<B: PaymentGatewayDatabase>(key: &str) -> Result<(), PaymentFlowError<B>> {
    if key.len() < MIN_IDEMPOTENCY_KEY_LEN || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(PaymentFlowError::InvalidIdempotencyKey(format!(
            "key must be between {MIN_IDEMPOTENCY_KEY_LEN} and {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(())
}

/// The order-side preconditions for opening an attempt, checked in a fixed sequence so clients always get the most
/// specific rejection.
fn check_order_accepts_attempts<B: PaymentGatewayDatabase>(order: &Order) -> Result<(), PaymentFlowError<B>> {
    match order.status {
        OrderStatusType::Paid => return Err(PaymentFlowError::OrderAlreadyPaid(order.order_id.clone())),
        OrderStatusType::Cancelled => return Err(PaymentFlowError::OrderCancelled(order.order_id.clone())),
        OrderStatusType::Failed => return Err(PaymentFlowError::AttemptsExhausted(order.order_id.clone())),
        OrderStatusType::Processing => return Err(PaymentFlowError::AttemptInFlight(order.order_id.clone())),
        OrderStatusType::Created => {},
    }
    if order.is_expired_at(Utc::now()) {
        return Err(PaymentFlowError::OrderExpired(order.order_id.clone()));
    }
    if order.attempts_exhausted() {
        return Err(PaymentFlowError::AttemptsExhausted(order.order_id.clone()));
    }
    Ok(())
}
