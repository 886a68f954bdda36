use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use ppg_common::{Currency, Money, Secret};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

use crate::helpers::{card_digest, detect_card_network, mask_card_number, new_order_id, new_payment_id};

/// Orders expire 30 minutes after creation unless a different expiry is given.
pub const DEFAULT_ORDER_TTL: Duration = Duration::minutes(30);
/// The default payment attempt budget per order.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 3;
/// Idempotency records are served as cache hits for 24 hours, after which the key becomes reusable.
pub const IDEMPOTENCY_KEY_TTL: Duration = Duration::hours(24);

#[derive(Debug, Clone, Error)]
#[error("Invalid {0}: {1}")]
pub struct ConversionError(&'static str, String);

//--------------------------------------        OrderId        -------------------------------------------------------
/// An opaque, externally stable order identifier. `ORD_` followed by 16 uppercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn random() -> Self {
        new_order_id()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------       PaymentId       -------------------------------------------------------
/// Identifier for a single payment attempt. `PAY_` followed by 16 uppercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PaymentId(pub String);

impl PaymentId {
    pub fn random() -> Self {
        new_payment_id()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PaymentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
/// The stored order statuses. `Expired` is deliberately absent: expiry is a derived condition
/// (`status == Created && now > expires_at`), checked via [`Order::is_expired_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// Newly created, or re-opened after a failed attempt with budget remaining. Payment attempts are accepted.
    Created,
    /// A payment attempt is currently in flight for this order.
    Processing,
    /// The order has been settled by exactly one successful payment. Terminal.
    Paid,
    /// The attempt budget is exhausted. Terminal.
    Failed,
    /// The order was cancelled by the customer or an admin. Terminal.
    Cancelled,
}

impl OrderStatusType {
    /// The explicit state-transition function for a completed payment attempt. All order status changes that follow
    /// an attempt outcome go through here; call sites never write status fields directly.
    ///
    /// A failed attempt re-opens the order (`Created`) while budget remains, and closes it (`Failed`) once
    /// `attempts >= max_attempts`.
    pub fn after_attempt(success: bool, attempts: i64, max_attempts: i64) -> Self {
        if success {
            OrderStatusType::Paid
        } else if attempts >= max_attempts {
            OrderStatusType::Failed
        } else {
            OrderStatusType::Created
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatusType::Created => "Created",
            OrderStatusType::Processing => "Processing",
            OrderStatusType::Paid => "Paid",
            OrderStatusType::Failed => "Failed",
            OrderStatusType::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "Processing" => Ok(Self::Processing),
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError("order status", s.to_string())),
        }
    }
}

//--------------------------------------  PaymentStatusType    -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatusType {
    /// The attempt has been recorded but the authorization provider has not been called yet.
    Pending,
    /// The authorization provider call is in flight.
    Processing,
    /// The provider approved the attempt. Terminal.
    Success,
    /// The provider declined, or was unreachable. Terminal.
    Failed,
}

impl Display for PaymentStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatusType::Pending => "Pending",
            PaymentStatusType::Processing => "Processing",
            PaymentStatusType::Success => "Success",
            PaymentStatusType::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PaymentStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Processing" => Ok(Self::Processing),
            "Success" => Ok(Self::Success),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError("payment status", s.to_string())),
        }
    }
}

//--------------------------------------    PaymentMethod      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    Card,
    Upi,
    NetBanking,
    Wallet,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentMethod::Card => "Card",
            PaymentMethod::Upi => "Upi",
            PaymentMethod::NetBanking => "NetBanking",
            PaymentMethod::Wallet => "Wallet",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Card" => Ok(Self::Card),
            "Upi" => Ok(Self::Upi),
            "NetBanking" => Ok(Self::NetBanking),
            "Wallet" => Ok(Self::Wallet),
            s => Err(ConversionError("payment method", s.to_string())),
        }
    }
}

//--------------------------------------   PaymentInstrument   -------------------------------------------------------
/// The instrument a customer pays with, as submitted by the caller. Card numbers and CVVs are wrapped in
/// [`Secret`], which has no serde implementations, so the raw values cannot reach the database, logs, or
/// webhook payloads. Persist [`InstrumentSummary`] instead.
#[derive(Debug, Clone)]
pub enum PaymentInstrument {
    Card { number: Secret<String>, expiry_month: String, expiry_year: String, cvv: Secret<String> },
    Upi { vpa: String },
    NetBanking { bank: String },
    Wallet { provider: String },
}

impl PaymentInstrument {
    pub fn card(number: &str, expiry_month: &str, expiry_year: &str, cvv: &str) -> Self {
        Self::Card {
            number: Secret::new(number.to_string()),
            expiry_month: expiry_month.to_string(),
            expiry_year: expiry_year.to_string(),
            cvv: Secret::new(cvv.to_string()),
        }
    }

    pub fn upi(vpa: &str) -> Self {
        Self::Upi { vpa: vpa.to_string() }
    }

    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentInstrument::Card { .. } => PaymentMethod::Card,
            PaymentInstrument::Upi { .. } => PaymentMethod::Upi,
            PaymentInstrument::NetBanking { .. } => PaymentMethod::NetBanking,
            PaymentInstrument::Wallet { .. } => PaymentMethod::Wallet,
        }
    }

    /// The persistable view of the instrument: masked and hashed, with the CVV dropped entirely.
    pub fn summary(&self) -> InstrumentSummary {
        match self {
            PaymentInstrument::Card { number, expiry_month, expiry_year, .. } => InstrumentSummary::Card {
                masked_number: mask_card_number(number.reveal()),
                card_digest: card_digest(number.reveal()),
                network: detect_card_network(number.reveal()),
                expiry_month: expiry_month.clone(),
                expiry_year: expiry_year.clone(),
            },
            PaymentInstrument::Upi { vpa } => InstrumentSummary::Upi { vpa: vpa.clone() },
            PaymentInstrument::NetBanking { bank } => InstrumentSummary::NetBanking { bank: bank.clone() },
            PaymentInstrument::Wallet { provider } => InstrumentSummary::Wallet { provider: provider.clone() },
        }
    }
}

//--------------------------------------   InstrumentSummary   -------------------------------------------------------
/// What the gateway stores about an instrument: enough to recognise and display it, never enough to charge it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstrumentSummary {
    Card {
        masked_number: String,
        card_digest: String,
        network: CardNetwork,
        expiry_month: String,
        expiry_year: String,
    },
    Upi {
        vpa: String,
    },
    NetBanking {
        bank: String,
    },
    Wallet {
        provider: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardNetwork {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Unknown,
}

impl Display for CardNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CardNetwork::Visa => "Visa",
            CardNetwork::Mastercard => "Mastercard",
            CardNetwork::Amex => "American Express",
            CardNetwork::Discover => "Discover",
            CardNetwork::Unknown => "Unknown",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------        Order       ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    pub memo: Option<String>,
    pub amount: Money,
    pub currency: Currency,
    pub status: OrderStatusType,
    pub attempts: i64,
    pub max_attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Expiry is a derived condition, not a stored status. An order whose stored status still reads `Created` is
    /// rejected by the payment engine once its expiry time has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatusType::Created && now > self.expires_at
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

//--------------------------------------      NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub customer_id: String,
    /// An optional free-text description supplied by the customer.
    pub memo: Option<String>,
    /// The amount owed, in minor units. Must be positive.
    pub amount: Money,
    pub currency: Currency,
    pub max_attempts: i64,
    pub expires_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(customer_id: &str, amount: Money) -> Self {
        Self {
            order_id: OrderId::random(),
            customer_id: customer_id.to_string(),
            memo: None,
            amount,
            currency: Currency::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            expires_at: Utc::now() + DEFAULT_ORDER_TTL,
        }
    }

    pub fn with_memo(mut self, memo: &str) -> Self {
        self.memo = Some(memo.to_string());
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i64) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = expires_at;
        self
    }
}

//--------------------------------------   GatewayResponse     -------------------------------------------------------
/// The payload returned by the authorization provider, stored verbatim against the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub transaction_id: String,
    /// Retrieval reference number assigned by the network.
    pub rrn: String,
    pub approval_code: Option<String>,
    pub response_code: String,
    pub response_message: String,
    pub network: Option<String>,
    pub processing_time_ms: i64,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------        Payment       --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub customer_id: String,
    /// Copied from the order at attempt creation. Never recomputed, never diverges.
    pub amount: Money,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub status: PaymentStatusType,
    pub instrument: Json<InstrumentSummary>,
    pub gateway_response: Option<Json<GatewayResponse>>,
    pub failure_reason: Option<String>,
    pub idempotency_key: String,
    /// The order's attempt count at the time this payment was created (0 for the first attempt).
    pub retry_count: i64,
    pub webhook_sent: bool,
    pub webhook_sent_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewPayment      --------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub customer_id: String,
    pub amount: Money,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub instrument: InstrumentSummary,
    pub idempotency_key: String,
    pub retry_count: i64,
}

impl NewPayment {
    /// Builds the record for one attempt against `order`. Amount and currency are copied from the order, and the
    /// retry count pins the order's attempt counter as it was when the attempt began.
    pub fn for_attempt(order: &Order, instrument: &PaymentInstrument, idempotency_key: &str) -> Self {
        Self {
            payment_id: PaymentId::random(),
            order_id: order.order_id.clone(),
            customer_id: order.customer_id.clone(),
            amount: order.amount,
            currency: order.currency,
            method: instrument.method(),
            instrument: instrument.summary(),
            idempotency_key: idempotency_key.to_string(),
            retry_count: order.attempts,
        }
    }
}

//--------------------------------------  IdempotencyRecord    -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum IdempotencyStatus {
    /// The admitted operation is in flight. Concurrent duplicates are turned away with a conflict.
    Processing,
    /// The operation finished and its response is cached for replay.
    Completed,
}

impl Display for IdempotencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IdempotencyStatus::Processing => "Processing",
            IdempotencyStatus::Completed => "Completed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for IdempotencyStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            s => Err(ConversionError("idempotency status", s.to_string())),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecord {
    pub id: i64,
    pub key: String,
    pub customer_id: String,
    /// Fingerprint of the originating request. A reused key whose fingerprint differs is a client bug and is
    /// rejected outright.
    pub request_hash: String,
    pub status: IdempotencyStatus,
    /// The cached response body. Written exactly once, on completion.
    pub response: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// An expired record must never be served as a cache hit; it is purged and treated as absent.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

//--------------------------------------    AuditEventType     -------------------------------------------------------
/// The closed set of audit events. Every state transition and externally observable action maps to exactly one of
/// these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum AuditEventType {
    #[sqlx(rename = "order.created")]
    #[serde(rename = "order.created")]
    OrderCreated,
    #[sqlx(rename = "payment.initiated")]
    #[serde(rename = "payment.initiated")]
    PaymentInitiated,
    #[sqlx(rename = "payment.processing")]
    #[serde(rename = "payment.processing")]
    PaymentProcessing,
    #[sqlx(rename = "payment.success")]
    #[serde(rename = "payment.success")]
    PaymentSuccess,
    #[sqlx(rename = "payment.failed")]
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[sqlx(rename = "payment.retry")]
    #[serde(rename = "payment.retry")]
    PaymentRetry,
    #[sqlx(rename = "webhook.sent")]
    #[serde(rename = "webhook.sent")]
    WebhookSent,
    #[sqlx(rename = "webhook.failed")]
    #[serde(rename = "webhook.failed")]
    WebhookFailed,
    #[sqlx(rename = "idempotency.hit")]
    #[serde(rename = "idempotency.hit")]
    IdempotencyHit,
}

impl Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditEventType::OrderCreated => "order.created",
            AuditEventType::PaymentInitiated => "payment.initiated",
            AuditEventType::PaymentProcessing => "payment.processing",
            AuditEventType::PaymentSuccess => "payment.success",
            AuditEventType::PaymentFailed => "payment.failed",
            AuditEventType::PaymentRetry => "payment.retry",
            AuditEventType::WebhookSent => "webhook.sent",
            AuditEventType::WebhookFailed => "webhook.failed",
            AuditEventType::IdempotencyHit => "idempotency.hit",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------    AuditSeverity      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum AuditSeverity {
    Info,
    Success,
    Warning,
    Error,
}

impl Display for AuditSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditSeverity::Info => "Info",
            AuditSeverity::Success => "Success",
            AuditSeverity::Warning => "Warning",
            AuditSeverity::Error => "Error",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------    AuditLogEntry      -------------------------------------------------------
/// One append-only fact in the transaction audit log. Entries are never mutated or deleted by the engine.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub payment_id: Option<PaymentId>,
    pub order_id: Option<OrderId>,
    pub customer_id: Option<String>,
    pub event: AuditEventType,
    pub severity: AuditSeverity,
    pub message: String,
    pub metadata: Option<Json<serde_json::Value>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     RequestOrigin     -------------------------------------------------------
/// Where a request came from, for the audit trail. Supplied by the routing layer when available.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

//--------------------------------------    NewAuditEntry      -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub event: AuditEventType,
    pub severity: AuditSeverity,
    pub message: String,
    pub payment_id: Option<PaymentId>,
    pub order_id: Option<OrderId>,
    pub customer_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub origin: Option<RequestOrigin>,
    pub duration_ms: Option<i64>,
}

impl NewAuditEntry {
    pub fn new(event: AuditEventType, severity: AuditSeverity, message: impl Into<String>) -> Self {
        Self {
            event,
            severity,
            message: message.into(),
            payment_id: None,
            order_id: None,
            customer_id: None,
            metadata: None,
            origin: None,
            duration_ms: None,
        }
    }

    pub fn for_order(mut self, order_id: &OrderId) -> Self {
        self.order_id = Some(order_id.clone());
        self
    }

    pub fn for_payment(mut self, payment_id: &PaymentId) -> Self {
        self.payment_id = Some(payment_id.clone());
        self
    }

    pub fn for_customer(mut self, customer_id: &str) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_origin(mut self, origin: RequestOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transition_function_reopens_while_budget_remains() {
        use OrderStatusType::*;
        assert_eq!(OrderStatusType::after_attempt(true, 1, 3), Paid);
        assert_eq!(OrderStatusType::after_attempt(false, 1, 3), Created);
        assert_eq!(OrderStatusType::after_attempt(false, 2, 3), Created);
        assert_eq!(OrderStatusType::after_attempt(false, 3, 3), Failed);
        assert_eq!(OrderStatusType::after_attempt(false, 4, 3), Failed);
        assert_eq!(OrderStatusType::after_attempt(true, 3, 3), Paid);
    }

    #[test]
    fn order_status_round_trip() {
        use OrderStatusType::*;
        for status in [Created, Processing, Paid, Failed, Cancelled] {
            assert_eq!(status.to_string().parse::<OrderStatusType>().unwrap(), status);
        }
        assert!("Expired".parse::<OrderStatusType>().is_err());
    }

    #[test]
    fn payment_status_round_trip() {
        use PaymentStatusType::*;
        for status in [Pending, Processing, Success, Failed] {
            assert_eq!(status.to_string().parse::<PaymentStatusType>().unwrap(), status);
        }
    }

    #[test]
    fn expiry_is_derived_from_created_status_only() {
        let now = Utc::now();
        let mut order = Order {
            id: 1,
            order_id: OrderId::random(),
            customer_id: "cust-1".to_string(),
            memo: None,
            amount: Money::from(999),
            currency: Currency::INR,
            status: OrderStatusType::Created,
            attempts: 0,
            max_attempts: 3,
            created_at: now - Duration::hours(1),
            updated_at: now - Duration::hours(1),
            expires_at: now - Duration::minutes(30),
            paid_at: None,
        };
        assert!(order.is_expired_at(now));
        order.status = OrderStatusType::Paid;
        assert!(!order.is_expired_at(now));
    }

    #[test]
    fn card_summary_never_contains_the_pan() {
        let instrument = PaymentInstrument::card("4242 4242 4242 4242", "12", "2030", "123");
        let summary = instrument.summary();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("4242 4242"));
        assert!(!json.contains("123\""));
        match summary {
            InstrumentSummary::Card { masked_number, network, .. } => {
                assert_eq!(masked_number, "**** **** **** 4242");
                assert_eq!(network, CardNetwork::Visa);
            },
            _ => panic!("expected a card summary"),
        }
    }

    #[test]
    fn new_payment_copies_order_amounts() {
        let order = Order {
            id: 7,
            order_id: OrderId::from("ORD_TEST".to_string()),
            customer_id: "cust-9".to_string(),
            memo: None,
            amount: Money::from(12_345),
            currency: Currency::USD,
            status: OrderStatusType::Created,
            attempts: 2,
            max_attempts: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(30),
            paid_at: None,
        };
        let payment = NewPayment::for_attempt(&order, &PaymentInstrument::upi("alice@upi"), "k".repeat(16).as_str());
        assert_eq!(payment.amount, order.amount);
        assert_eq!(payment.currency, order.currency);
        assert_eq!(payment.retry_count, 2);
        assert_eq!(payment.method, PaymentMethod::Upi);
    }
}
