//! End-to-end payment flows against a real SQLite database, with a deterministic provider standing in for the
//! gateway.
mod support;

use std::time::Duration;

use chrono::Utc;
use payment_engine::{
    db_types::*,
    events::EventProducers,
    provider::{ProviderOutcome, StaticProvider},
    AttemptResponse,
    PaymentFlowApi,
    PaymentFlowError,
    PaymentGatewayDatabase,
    PaymentRequest,
    SqliteDatabase,
};
use ppg_common::Money;

fn api_with(db: SqliteDatabase, provider: StaticProvider) -> PaymentFlowApi<SqliteDatabase, StaticProvider> {
    PaymentFlowApi::new(db, provider, EventProducers::default())
}

fn card() -> PaymentInstrument {
    PaymentInstrument::card("4242 4242 4242 4242", "12", "2030", "123")
}

async fn new_order(api: &PaymentFlowApi<SqliteDatabase, StaticProvider>, customer: &str) -> Order {
    api.create_order(NewOrder::new(customer, Money::from(99_900)), RequestOrigin::default())
        .await
        .expect("Error creating order")
}

#[tokio::test]
async fn approved_attempt_pays_the_order() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let order = new_order(&api, "alice").await;
    assert_eq!(order.status, OrderStatusType::Created);
    assert_eq!(order.attempts, 0);

    let request = PaymentRequest::new(order.order_id.clone(), "alice", &support::new_key(), card());
    let result = match api.attempt_payment(request).await.unwrap() {
        AttemptResponse::Executed(result) => result,
        AttemptResponse::Replayed(_) => panic!("first attempt must execute"),
    };
    assert_eq!(result.payment.status, PaymentStatusType::Success);
    assert_eq!(result.payment.amount, order.amount);
    assert_eq!(result.payment.retry_count, 0);
    assert!(result.payment.gateway_response.is_some());
    assert_eq!(result.order.status, OrderStatusType::Paid);
    assert_eq!(result.order.attempts, 1);
    assert!(result.order.paid_at.is_some());

    let trail = api.audit_trail(&order.order_id).await.unwrap();
    let events = trail.iter().map(|e| e.event).collect::<Vec<_>>();
    assert_eq!(events, vec![
        AuditEventType::OrderCreated,
        AuditEventType::PaymentInitiated,
        AuditEventType::PaymentProcessing,
        AuditEventType::PaymentSuccess,
    ]);
}

#[tokio::test]
async fn declined_attempt_reopens_the_order_and_a_retry_succeeds() {
    let db = support::new_test_db().await;
    let api = api_with(db.clone(), StaticProvider::declining("Insufficient funds"));
    let order = new_order(&api, "bob").await;

    let request = PaymentRequest::new(order.order_id.clone(), "bob", &support::new_key(), card());
    let result = match api.attempt_payment(request).await.unwrap() {
        AttemptResponse::Executed(result) => result,
        AttemptResponse::Replayed(_) => panic!("first attempt must execute"),
    };
    assert_eq!(result.payment.status, PaymentStatusType::Failed);
    assert_eq!(result.payment.failure_reason.as_deref(), Some("Insufficient funds"));
    // Budget remains, so the order is re-opened rather than failed.
    assert_eq!(result.order.status, OrderStatusType::Created);
    assert_eq!(result.order.attempts, 1);
    assert!(result.order.paid_at.is_none());

    let api = api_with(db, StaticProvider::approving());
    let request = PaymentRequest::new(order.order_id.clone(), "bob", &support::new_key(), card());
    let result = match api.retry_payment(request).await.unwrap() {
        AttemptResponse::Executed(result) => result,
        AttemptResponse::Replayed(_) => panic!("retry must execute"),
    };
    assert_eq!(result.payment.status, PaymentStatusType::Success);
    assert_eq!(result.payment.retry_count, 1);
    assert_eq!(result.order.status, OrderStatusType::Paid);
    assert_eq!(result.order.attempts, 2);

    let trail = api.audit_trail(&order.order_id).await.unwrap();
    let failed = trail.iter().filter(|e| e.event == AuditEventType::PaymentFailed).count();
    let succeeded = trail.iter().filter(|e| e.event == AuditEventType::PaymentSuccess).count();
    let initiated = trail.iter().filter(|e| e.event == AuditEventType::PaymentInitiated).count();
    let retries = trail.iter().filter(|e| e.event == AuditEventType::PaymentRetry).count();
    assert_eq!(failed, 1);
    assert_eq!(succeeded, 1);
    assert_eq!(initiated, 2);
    assert_eq!(retries, 1);
}

#[tokio::test]
async fn exhausting_the_attempt_budget_fails_the_order() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::declining("Do not honor - issuer declined"));
    let order = new_order(&api, "carol").await;

    // The whole budget is burned through the retry path; the first retry on a fresh order is just attempt one.
    for attempt in 1..=3 {
        let request = PaymentRequest::new(order.order_id.clone(), "carol", &support::new_key(), card());
        let result = match api.retry_payment(request).await.unwrap() {
            AttemptResponse::Executed(result) => result,
            AttemptResponse::Replayed(_) => panic!("retry must execute"),
        };
        assert_eq!(result.order.attempts, attempt);
    }
    let order_after = api.order_by_id(&order.order_id, "carol").await.unwrap().unwrap();
    assert_eq!(order_after.status, OrderStatusType::Failed);
    assert_eq!(order_after.attempts, 3);

    let request = PaymentRequest::new(order.order_id.clone(), "carol", &support::new_key(), card());
    match api.retry_payment(request).await {
        Err(PaymentFlowError::AttemptsExhausted(id)) => assert_eq!(id, order.order_id),
        other => panic!("expected AttemptsExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn paid_orders_reject_further_attempts() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let order = new_order(&api, "dave").await;

    let request = PaymentRequest::new(order.order_id.clone(), "dave", &support::new_key(), card());
    api.attempt_payment(request).await.unwrap();

    let request = PaymentRequest::new(order.order_id.clone(), "dave", &support::new_key(), card());
    match api.retry_payment(request).await {
        Err(PaymentFlowError::OrderAlreadyPaid(id)) => assert_eq!(id, order.order_id),
        other => panic!("expected OrderAlreadyPaid, got {other:?}"),
    }
    let request = PaymentRequest::new(order.order_id.clone(), "dave", &support::new_key(), card());
    match api.attempt_payment(request).await {
        Err(PaymentFlowError::OrderAlreadyPaid(_)) => {},
        other => panic!("expected OrderAlreadyPaid, got {other:?}"),
    }
    // Monotonicity: the failed attempts changed nothing about the paid order.
    let order = api.order_by_id(&order.order_id, "dave").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Paid);
    assert_eq!(order.attempts, 1);
}

#[tokio::test]
async fn expired_orders_reject_attempts() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let order = NewOrder::new("erin", Money::from(5_000)).with_expiry(Utc::now() - chrono::Duration::minutes(1));
    let order = api.create_order(order, RequestOrigin::default()).await.unwrap();

    let request = PaymentRequest::new(order.order_id.clone(), "erin", &support::new_key(), card());
    match api.attempt_payment(request).await {
        Err(PaymentFlowError::OrderExpired(id)) => assert_eq!(id, order.order_id),
        other => panic!("expected OrderExpired, got {other:?}"),
    }
    // The stored status is untouched; expiry is derived.
    let order = api.order_by_id(&order.order_id, "erin").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Created);
}

#[tokio::test]
async fn orders_are_scoped_to_their_owner() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let order = new_order(&api, "frank").await;

    let request = PaymentRequest::new(order.order_id.clone(), "mallory", &support::new_key(), card());
    match api.attempt_payment(request).await {
        Err(PaymentFlowError::OrderNotFound(id)) => assert_eq!(id, order.order_id),
        other => panic!("expected OrderNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    for amount in [0, -100] {
        match api.create_order(NewOrder::new("grace", Money::from(amount)), RequestOrigin::default()).await {
            Err(PaymentFlowError::InvalidAmount) => {},
            other => panic!("expected InvalidAmount, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn idempotency_keys_must_have_a_valid_length() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let order = new_order(&api, "heidi").await;
    for key in ["short", &"k".repeat(256)] {
        let request = PaymentRequest::new(order.order_id.clone(), "heidi", key, card());
        match api.attempt_payment(request).await {
            Err(PaymentFlowError::InvalidIdempotencyKey(_)) => {},
            other => panic!("expected InvalidIdempotencyKey, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn provider_timeout_is_a_decline_not_a_fault() {
    let db = support::new_test_db().await;
    let provider = StaticProvider::approving().with_latency(Duration::from_millis(500));
    let api = PaymentFlowApi::new(db, provider, EventProducers::default())
        .with_provider_timeout(Duration::from_millis(50));
    let order = new_order(&api, "ivan").await;

    let request = PaymentRequest::new(order.order_id.clone(), "ivan", &support::new_key(), card());
    let result = match api.attempt_payment(request).await.unwrap() {
        AttemptResponse::Executed(result) => result,
        AttemptResponse::Replayed(_) => panic!("attempt must execute"),
    };
    assert_eq!(result.payment.status, PaymentStatusType::Failed);
    assert_eq!(result.payment.failure_reason.as_deref(), Some("Payment gateway unavailable"));
    assert!(result.payment.gateway_response.is_none());
    // The order is re-opened; the customer may try again.
    assert_eq!(result.order.status, OrderStatusType::Created);
    assert_eq!(result.order.attempts, 1);
}

#[tokio::test]
async fn concurrent_duplicate_submissions_execute_exactly_once() {
    let db = support::new_test_db().await;
    let provider = StaticProvider::approving().with_latency(Duration::from_millis(100));
    let api = PaymentFlowApi::new(db, provider, EventProducers::default());
    let order = new_order(&api, "judy").await;

    let key = support::new_key();
    let first = api.attempt_payment(PaymentRequest::new(order.order_id.clone(), "judy", &key, card()));
    let second = api.attempt_payment(PaymentRequest::new(order.order_id.clone(), "judy", &key, card()));
    let (first, second) = tokio::join!(first, second);

    let executed = [&first, &second]
        .iter()
        .filter(|r| matches!(r, Ok(AttemptResponse::Executed(_))))
        .count();
    assert_eq!(executed, 1, "exactly one of the duplicates may reach the provider: {first:?} / {second:?}");
    for outcome in [first, second] {
        match outcome {
            Ok(AttemptResponse::Executed(result)) => {
                assert_eq!(result.payment.status, PaymentStatusType::Success);
                assert_eq!(result.order.status, OrderStatusType::Paid);
            },
            // The loser is either turned away while the winner is in flight, or replayed once it completed.
            Ok(AttemptResponse::Replayed(_)) | Err(PaymentFlowError::IdempotencyConflict) => {},
            other => panic!("unexpected duplicate outcome: {other:?}"),
        }
    }

    let order = api.order_by_id(&order.order_id, "judy").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Paid);
    assert_eq!(order.attempts, 1);
}

#[tokio::test]
async fn a_fresh_order_accepts_its_first_attempt_through_the_retry_path() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let order = new_order(&api, "karl").await;

    let request = PaymentRequest::new(order.order_id.clone(), "karl", &support::new_key(), card());
    let result = match api.retry_payment(request).await.unwrap() {
        AttemptResponse::Executed(result) => result,
        AttemptResponse::Replayed(_) => panic!("retry must execute"),
    };
    assert_eq!(result.order.status, OrderStatusType::Paid);
    assert_eq!(result.order.attempts, 1);

    let trail = api.audit_trail(&order.order_id).await.unwrap();
    assert_eq!(trail.iter().filter(|e| e.event == AuditEventType::PaymentRetry).count(), 1);
}

#[tokio::test]
async fn cancelled_orders_reject_attempts_and_retries() {
    let db = support::new_test_db().await;
    let api = api_with(db.clone(), StaticProvider::approving());
    let order = new_order(&api, "lena").await;
    sqlx::query("UPDATE orders SET status = 'Cancelled' WHERE order_id = $1")
        .bind(&order.order_id)
        .execute(db.pool())
        .await
        .unwrap();

    let request = PaymentRequest::new(order.order_id.clone(), "lena", &support::new_key(), card());
    match api.attempt_payment(request).await {
        Err(PaymentFlowError::OrderCancelled(id)) => assert_eq!(id, order.order_id),
        other => panic!("expected OrderCancelled, got {other:?}"),
    }
    let request = PaymentRequest::new(order.order_id.clone(), "lena", &support::new_key(), card());
    match api.retry_payment(request).await {
        Err(PaymentFlowError::OrderCancelled(id)) => assert_eq!(id, order.order_id),
        other => panic!("expected OrderCancelled, got {other:?}"),
    }
    let order = api.order_by_id(&order.order_id, "lena").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);
    assert_eq!(order.attempts, 0);
}

#[tokio::test]
async fn an_order_with_an_attempt_in_flight_is_not_retryable() {
    let db = support::new_test_db().await;
    let api = api_with(db.clone(), StaticProvider::approving());
    let order = new_order(&api, "mara").await;
    sqlx::query("UPDATE orders SET status = 'Processing' WHERE order_id = $1")
        .bind(&order.order_id)
        .execute(db.pool())
        .await
        .unwrap();

    let request = PaymentRequest::new(order.order_id.clone(), "mara", &support::new_key(), card());
    match api.retry_payment(request).await {
        Err(PaymentFlowError::InvalidRetryState(id)) => assert_eq!(id, order.order_id),
        other => panic!("expected InvalidRetryState, got {other:?}"),
    }
}

#[tokio::test]
async fn a_malformed_key_fails_a_retry_before_anything_is_audited() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let order = new_order(&api, "nina").await;

    let request = PaymentRequest::new(order.order_id.clone(), "nina", "short", card());
    match api.retry_payment(request).await {
        Err(PaymentFlowError::InvalidIdempotencyKey(_)) => {},
        other => panic!("expected InvalidIdempotencyKey, got {other:?}"),
    }
    let trail = api.audit_trail(&order.order_id).await.unwrap();
    assert_eq!(trail.iter().filter(|e| e.event == AuditEventType::PaymentRetry).count(), 0);
}

#[tokio::test]
async fn a_terminal_outcome_is_recorded_at_most_once() {
    let db = support::new_test_db().await;
    let api = api_with(db.clone(), StaticProvider::approving());
    let order = new_order(&api, "olga").await;

    let new_payment = NewPayment::for_attempt(&order, &card(), &support::new_key());
    let (payment, _) = db.begin_attempt(&order, new_payment).await.unwrap().expect("attempt must open");
    let outcome = ProviderOutcome::Declined { reason: "Network timeout".to_string(), gateway: None };
    let first = db.record_outcome(&payment.payment_id, &outcome).await.unwrap();
    assert!(first.is_some());

    // The order has left Processing; a second completion for the same payment must not commit anything.
    let second = db.record_outcome(&payment.payment_id, &outcome).await.unwrap();
    assert!(second.is_none());
    let order_after = api.order_by_id(&order.order_id, "olga").await.unwrap().unwrap();
    assert_eq!(order_after.status, OrderStatusType::Created);
    assert_eq!(order_after.attempts, 1);
}
