use crate::db_types::{Order, Payment};

/// Fired once when a new order is stored. Carries the order exactly as persisted.
#[derive(Debug, Clone)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Fired after a payment attempt reaches a terminal status, whether approved or declined. The order is the row as
/// it stood after the outcome was applied, so subscribers see the post-transition status.
#[derive(Debug, Clone)]
pub struct PaymentCompletedEvent {
    pub payment: Payment,
    pub order: Order,
}

impl PaymentCompletedEvent {
    pub fn new(payment: Payment, order: Order) -> Self {
        Self { payment, order }
    }
}
