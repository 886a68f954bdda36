use thiserror::Error;

use crate::{db::common::PaymentGatewayDatabase, db_types::OrderId};

#[derive(Debug, Error)]
pub enum PaymentFlowError<B: PaymentGatewayDatabase> {
    #[error("Database error: {0}")]
    DatabaseError(B::Error),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Order {0} has already been paid")]
    OrderAlreadyPaid(OrderId),
    #[error("Order {0} has no payment attempts remaining")]
    AttemptsExhausted(OrderId),
    #[error("Order {0} has expired")]
    OrderExpired(OrderId),
    #[error("Order {0} has been cancelled")]
    OrderCancelled(OrderId),
    #[error("Order {0} has a payment attempt in flight")]
    AttemptInFlight(OrderId),
    #[error("Order {0} is not in a retryable state")]
    InvalidRetryState(OrderId),
    #[error("Invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),
    #[error("A request with this idempotency key is already being processed")]
    IdempotencyConflict,
    #[error("This idempotency key was already used for a different request")]
    IdempotencyKeyReuse,
    #[error("The order changed while the attempt was being opened")]
    ConcurrentUpdate(OrderId),
    #[error("Order amount must be positive")]
    InvalidAmount,
    #[error("Could not encode the response for caching: {0}")]
    ResponseEncoding(String),
}
