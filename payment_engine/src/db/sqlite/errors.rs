use thiserror::Error;

use crate::db_types::{OrderId, PaymentId};

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Payment {0} not found")]
    PaymentNotFound(PaymentId),
}
