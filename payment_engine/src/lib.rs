//! Payment Engine
//!
//! The payment engine is the core of the payment gateway: it owns orders, payment attempts, idempotency-key
//! deduplication, the audit log, and webhook notification. It is transport-agnostic; an HTTP layer is expected to
//! sit in front of it and do nothing more than translate requests.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@db`]). SQLite is the default backend. You should never need to access
//!    the database directly; use the public API instead. The exception is the data types used in the database,
//!    which are defined in the [`mod@db_types`] module and are public.
//! 2. The engine's public API ([`PaymentFlowApi`]). This drives the order and payment flows: order creation,
//!    idempotent payment attempts, retries, and querying. It is generic over the storage backend and the
//!    authorization provider.
//! 3. The event and notification layer ([`mod@events`], [`mod@webhook`]). A simple actor-style hook system emits
//!    events when orders are created and payments complete; the webhook notifier subscribes to these and delivers
//!    signed notifications to merchants.
mod api;
mod db;

pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod provider;
pub mod webhook;

pub use api::{
    AdmitOutcome,
    AttemptResponse,
    PaymentFlowApi,
    PaymentFlowError,
    PaymentRequest,
    PaymentResult,
    DEFAULT_PROVIDER_TIMEOUT,
};
#[cfg(feature = "sqlite")]
pub use db::sqlite::{db_url, new_pool, SqliteDatabase, SqliteDatabaseError, MIGRATOR};
pub use db::common::{AuditQueryFilter, InsertKeyResult, OrderQueryFilter, PaymentGatewayDatabase};
