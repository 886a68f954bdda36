//! The idempotency-key protocol: replay, conflict, misuse and release.
mod support;

use payment_engine::{
    db_types::*,
    events::EventProducers,
    provider::StaticProvider,
    AdmitOutcome,
    AttemptResponse,
    PaymentFlowApi,
    PaymentFlowError,
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
    api.create_order(NewOrder::new(customer, Money::from(49_900)), RequestOrigin::default())
        .await
        .expect("Error creating order")
}

#[tokio::test]
async fn duplicate_requests_replay_the_cached_response() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let order = new_order(&api, "alice").await;
    let key = support::new_key();

    let request = PaymentRequest::new(order.order_id.clone(), "alice", &key, card());
    let result = match api.attempt_payment(request).await.unwrap() {
        AttemptResponse::Executed(result) => result,
        AttemptResponse::Replayed(_) => panic!("first attempt must execute"),
    };

    let request = PaymentRequest::new(order.order_id.clone(), "alice", &key, card());
    let replayed = match api.attempt_payment(request).await.unwrap() {
        AttemptResponse::Replayed(body) => body,
        AttemptResponse::Executed(_) => panic!("duplicate must not execute"),
    };
    // The replay is the cached body, byte for byte.
    assert_eq!(replayed, serde_json::to_value(&result).unwrap());

    // Nothing ran twice and the hit was audited.
    let order = api.order_by_id(&order.order_id, "alice").await.unwrap().unwrap();
    assert_eq!(order.attempts, 1);
    let trail = api.audit_trail(&order.order_id).await.unwrap();
    assert_eq!(trail.iter().filter(|e| e.event == AuditEventType::IdempotencyHit).count(), 1);
    assert_eq!(trail.iter().filter(|e| e.event == AuditEventType::PaymentSuccess).count(), 1);
}

#[tokio::test]
async fn declines_are_cached_and_replayed_too() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::declining("Card expired"));
    let order = new_order(&api, "bob").await;
    let key = support::new_key();

    let request = PaymentRequest::new(order.order_id.clone(), "bob", &key, card());
    api.attempt_payment(request).await.unwrap();

    let request = PaymentRequest::new(order.order_id.clone(), "bob", &key, card());
    let replayed = match api.attempt_payment(request).await.unwrap() {
        AttemptResponse::Replayed(body) => body,
        AttemptResponse::Executed(_) => panic!("duplicate must not execute"),
    };
    assert_eq!(replayed["payment"]["status"], "Failed");
    assert_eq!(replayed["payment"]["failure_reason"], "Card expired");
    // The duplicate consumed no attempt budget.
    let order = api.order_by_id(&order.order_id, "bob").await.unwrap().unwrap();
    assert_eq!(order.attempts, 1);
}

#[tokio::test]
async fn reusing_a_key_for_a_different_request_is_rejected() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let order = new_order(&api, "carol").await;
    let other_order = new_order(&api, "carol").await;
    let key = support::new_key();

    let request = PaymentRequest::new(order.order_id.clone(), "carol", &key, card());
    api.attempt_payment(request).await.unwrap();

    // Same key, different order.
    let request = PaymentRequest::new(other_order.order_id.clone(), "carol", &key, card());
    match api.attempt_payment(request).await {
        Err(PaymentFlowError::IdempotencyKeyReuse) => {},
        other => panic!("expected IdempotencyKeyReuse, got {other:?}"),
    }

    // Same key, same order, different instrument.
    let request = PaymentRequest::new(order.order_id.clone(), "carol", &key, PaymentInstrument::upi("carol@upi"));
    match api.attempt_payment(request).await {
        Err(PaymentFlowError::IdempotencyKeyReuse) => {},
        other => panic!("expected IdempotencyKeyReuse, got {other:?}"),
    }
}

#[tokio::test]
async fn keys_are_scoped_per_customer() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let order_a = new_order(&api, "dave").await;
    let order_b = new_order(&api, "erin").await;
    let key = support::new_key();

    let request = PaymentRequest::new(order_a.order_id.clone(), "dave", &key, card());
    assert!(!api.attempt_payment(request).await.unwrap().is_replay());
    // A different customer can use the same key without tripping over Dave's record.
    let request = PaymentRequest::new(order_b.order_id.clone(), "erin", &key, card());
    assert!(!api.attempt_payment(request).await.unwrap().is_replay());
}

#[tokio::test]
async fn a_failed_precondition_releases_the_key() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let key = support::new_key();

    // First use fails: the order does not exist. The key must not be burned by that.
    let request = PaymentRequest::new(OrderId::from("ORD_MISSING".to_string()), "frank", &key, card());
    match api.attempt_payment(request).await {
        Err(PaymentFlowError::OrderNotFound(_)) => {},
        other => panic!("expected OrderNotFound, got {other:?}"),
    }

    let order = new_order(&api, "frank").await;
    let request = PaymentRequest::new(order.order_id.clone(), "frank", &key, card());
    match api.attempt_payment(request).await.unwrap() {
        AttemptResponse::Executed(result) => assert_eq!(result.order.status, OrderStatusType::Paid),
        AttemptResponse::Replayed(_) => panic!("a released key must admit a fresh attempt"),
    }
}

#[tokio::test]
async fn in_flight_keys_conflict() {
    let db = support::new_test_db().await;
    let api = api_with(db, StaticProvider::approving());
    let key = support::new_key();

    let admitted = api.admit_idempotent(&key, "grace", "fingerprint-1").await.unwrap();
    assert!(matches!(admitted, AdmitOutcome::Proceed));
    // Same request again while the first is still processing.
    let admitted = api.admit_idempotent(&key, "grace", "fingerprint-1").await.unwrap();
    assert!(matches!(admitted, AdmitOutcome::Conflict));
    // A different fingerprint under the live key is misuse, not a conflict.
    match api.admit_idempotent(&key, "grace", "fingerprint-2").await {
        Err(PaymentFlowError::IdempotencyKeyReuse) => {},
        other => panic!("expected IdempotencyKeyReuse, got {other:?}"),
    }
}
