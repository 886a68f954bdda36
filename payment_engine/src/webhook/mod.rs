//! Webhook notification for completed payments.
//!
//! Every terminal payment produces one signed notification. Delivery is strictly best effort: a transport failure
//! is recorded in the audit log and logged, but it never rolls back or delays the payment itself. Merchants who
//! need certainty reconcile against the order, not the webhook.

use std::{future::Future, pin::Pin, sync::Arc};

use blake2::{digest::Mac, Blake2bMac512};
use chrono::{DateTime, Utc};
use log::*;
use ppg_common::{Currency, Money, Secret};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db::common::PaymentGatewayDatabase,
    db_types::{
        AuditEventType, AuditSeverity, GatewayResponse, NewAuditEntry, OrderId, OrderStatusType, PaymentId,
        PaymentMethod, PaymentStatusType,
    },
    events::{Handler, PaymentCompletedEvent},
    helpers::to_hex,
};

//--------------------------------------    WebhookPayload     -------------------------------------------------------
/// The body a merchant endpoint receives. Instrument details never appear here; the gateway response does, so the
/// merchant can reconcile against the acquirer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub customer_id: String,
    pub amount: Money,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub payment_status: PaymentStatusType,
    pub order_status: OrderStatusType,
    pub failure_reason: Option<String>,
    pub gateway_response: Option<GatewayResponse>,
    pub timestamp: DateTime<Utc>,
}

impl WebhookPayload {
    pub fn from_event(event: &PaymentCompletedEvent) -> Self {
        let payment = &event.payment;
        let name = match payment.status {
            PaymentStatusType::Success => "payment.success",
            _ => "payment.failed",
        };
        Self {
            event: name.to_string(),
            payment_id: payment.payment_id.clone(),
            order_id: payment.order_id.clone(),
            customer_id: payment.customer_id.clone(),
            amount: payment.amount,
            currency: payment.currency,
            method: payment.method,
            payment_status: payment.status,
            order_status: event.order.status,
            failure_reason: payment.failure_reason.clone(),
            gateway_response: payment.gateway_response.as_ref().map(|g| g.0.clone()),
            timestamp: Utc::now(),
        }
    }
}

//--------------------------------------      Signatures       -------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("Could not sign webhook payload: {0}")]
    SigningError(String),
    #[error("Webhook delivery failed: {0}")]
    DeliveryError(String),
}

/// Computes the hex signature for a serialized payload with a keyed Blake2b MAC. The merchant recomputes this over
/// the exact bytes received and compares.
pub fn sign_payload(body: &str, secret: &Secret<String>) -> Result<String, WebhookError> {
    let mut mac = Blake2bMac512::new_from_slice(secret.reveal().as_bytes())
        .map_err(|e| WebhookError::SigningError(e.to_string()))?;
    mac.update(body.as_bytes());
    Ok(to_hex(&mac.finalize().into_bytes()))
}

/// Constant-time signature check, for merchant-side verification and tests.
pub fn verify_signature(body: &str, signature: &str, secret: &Secret<String>) -> bool {
    let Ok(mut mac) = Blake2bMac512::new_from_slice(secret.reveal().as_bytes()) else {
        return false;
    };
    mac.update(body.as_bytes());
    let Ok(sig_bytes) = decode_hex(signature) else {
        return false;
    };
    mac.verify_slice(&sig_bytes).is_ok()
}

fn decode_hex(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ())).collect()
}

//--------------------------------------   WebhookTransport    -------------------------------------------------------
/// A signed, serialized notification ready for the wire.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub body: String,
    pub signature: String,
}

/// The outbound side of webhook delivery. The notifier signs and serializes; the transport only moves bytes, so
/// tests can swap in a recording transport and servers can plug in an HTTP client. The returned future must be
/// `Send` because deliveries run on spawned event-handler tasks; implementations can still be plain `async fn`.
pub trait WebhookTransport: Clone {
    fn deliver(&self, delivery: &WebhookDelivery) -> impl Future<Output = Result<(), WebhookError>> + Send;
}

/// A transport that writes notifications to the log instead of the network. The default for demos and tests.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

impl WebhookTransport for LogTransport {
    async fn deliver(&self, delivery: &WebhookDelivery) -> Result<(), WebhookError> {
        info!("📮️ Webhook delivered. Signature: {}. Body: {}", delivery.signature, delivery.body);
        Ok(())
    }
}

//--------------------------------------   WebhookNotifier     -------------------------------------------------------
pub struct WebhookNotifier<B, T>
where
    B: PaymentGatewayDatabase,
    T: WebhookTransport,
{
    db: B,
    transport: T,
    secret: Secret<String>,
}

impl<B, T> Clone for WebhookNotifier<B, T>
where
    B: PaymentGatewayDatabase,
    T: WebhookTransport,
{
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), transport: self.transport.clone(), secret: self.secret.clone() }
    }
}

impl<B, T> WebhookNotifier<B, T>
where
    B: PaymentGatewayDatabase,
    T: WebhookTransport,
{
    pub fn new(db: B, transport: T, secret: Secret<String>) -> Self {
        Self { db, transport, secret }
    }

    /// Signs and dispatches the notification for one completed payment, then records the outcome against the
    /// payment and in the audit log. Nothing here returns an error to the caller; a payment is never made to look
    /// less settled because a merchant endpoint was down.
    pub async fn notify(&self, event: PaymentCompletedEvent) {
        let payment_id = event.payment.payment_id.clone();
        let order_id = event.payment.order_id.clone();
        let payload = WebhookPayload::from_event(&event);
        let event_name = payload.event.clone();
        let result = self.try_deliver(payload).await;
        match result {
            Ok(()) => {
                debug!("📮️ Webhook {event_name} for payment {payment_id} handed to transport");
                if let Err(e) = self.db.mark_webhook_dispatched(&payment_id).await {
                    warn!("📮️ Could not mark webhook as dispatched for payment {payment_id}: {e}");
                }
                let entry = NewAuditEntry::new(
                    AuditEventType::WebhookSent,
                    AuditSeverity::Info,
                    format!("Webhook {event_name} dispatched"),
                )
                .for_payment(&payment_id)
                .for_order(&order_id);
                self.audit(entry).await;
            },
            Err(e) => {
                error!("📮️ Webhook {event_name} for payment {payment_id} was not delivered: {e}");
                let entry = NewAuditEntry::new(
                    AuditEventType::WebhookFailed,
                    AuditSeverity::Error,
                    format!("Webhook {event_name} delivery failed: {e}"),
                )
                .for_payment(&payment_id)
                .for_order(&order_id);
                self.audit(entry).await;
            },
        }
    }

    async fn try_deliver(&self, payload: WebhookPayload) -> Result<(), WebhookError> {
        let body = serde_json::to_string(&payload).map_err(|e| WebhookError::SigningError(e.to_string()))?;
        let signature = sign_payload(&body, &self.secret)?;
        self.transport.deliver(&WebhookDelivery { body, signature }).await
    }

    async fn audit(&self, entry: NewAuditEntry) {
        if let Err(e) = self.db.write_audit_entry(entry).await {
            warn!("📮️ Could not write webhook audit entry: {e}");
        }
    }
}

impl<B, T> WebhookNotifier<B, T>
where
    B: PaymentGatewayDatabase + Send + Sync + 'static,
    T: WebhookTransport + Send + Sync + 'static,
{
    /// Wraps the notifier as an event handler so it can be registered on
    /// [`EventHooks::on_payment_completed`](crate::events::EventHooks).
    pub fn hook(self) -> Handler<PaymentCompletedEvent> {
        Arc::new(move |event: PaymentCompletedEvent| {
            let notifier = self.clone();
            Box::pin(async move {
                notifier.notify(event).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let secret = Secret::new("whsec_test_secret".to_string());
        let body = r#"{"event":"payment.success","amount":99900}"#;
        let signature = sign_payload(body, &secret).unwrap();
        assert!(verify_signature(body, &signature, &secret));
        assert!(!verify_signature(body, &signature, &Secret::new("another_secret".to_string())));
        assert!(!verify_signature(r#"{"event":"payment.failed"}"#, &signature, &secret));
        assert!(!verify_signature(body, "deadbeef", &secret));
        assert!(!verify_signature(body, "not-hex", &secret));
    }
}
