//! The authorization provider seam.
//!
//! The engine never decides whether an instrument is good for an amount; that is provider policy. The
//! [`AuthorizationProvider`] trait models the external capability, [`RandomProvider`] simulates a real gateway for
//! demos (network latency, realistic decline reasons), and [`StaticProvider`] gives tests a deterministic outcome.
//! Provider unreachability is always converted to a decline by the payment flow, never to a crash.

use std::{env, fmt::Display, future::Future, time::Duration};

use chrono::Utc;
use log::*;
use ppg_common::{Currency, Money};
use rand::{thread_rng, Rng};
use thiserror::Error;

use crate::db_types::{GatewayResponse, InstrumentSummary, OrderId, PaymentMethod};

pub const DEFAULT_SUCCESS_RATE: f64 = 0.85;
pub const DEFAULT_MIN_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 3000;

const CARD_FAILURE_REASONS: [&str; 8] = [
    "Insufficient funds",
    "Card declined by issuing bank",
    "Transaction limit exceeded",
    "Invalid card credentials",
    "Network timeout",
    "Card expired",
    "Suspected fraud - transaction blocked",
    "Do not honor - issuer declined",
];

const UPI_FAILURE_REASONS: [&str; 4] =
    ["Payment declined by user", "UPI PIN incorrect", "Debit account limit exceeded", "VPA not found"];

//--------------------------------------      AuthRequest      -------------------------------------------------------
/// Everything a provider is given to make its decision. Only the masked instrument summary crosses this boundary.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub instrument: InstrumentSummary,
}

//--------------------------------------    ProviderOutcome    -------------------------------------------------------
#[derive(Debug, Clone)]
pub enum ProviderOutcome {
    Approved { gateway: GatewayResponse },
    Declined { reason: String, gateway: Option<GatewayResponse> },
}

impl ProviderOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, ProviderOutcome::Approved { .. })
    }

    /// A synthetic decline for an unreachable or timed-out provider.
    pub fn unavailable() -> Self {
        ProviderOutcome::Declined { reason: "Payment gateway unavailable".to_string(), gateway: None }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Authorization provider error: {0}")]
pub struct ProviderError(pub String);

//--------------------------------------  AuthorizationProvider ------------------------------------------------------
/// External capability that approves or declines an instrument for an amount. Implementations may be slow; the
/// payment flow guards every call with a timeout and treats both `Err` and timeout as a decline. The future is
/// `Send` so flows that call providers can themselves be driven from spawned tasks.
pub trait AuthorizationProvider: Clone {
    fn authorize(&self, request: AuthRequest) -> impl Future<Output = Result<ProviderOutcome, ProviderError>> + Send;
}

//--------------------------------------    ProviderConfig     -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Fraction of authorizations that succeed, in `[0, 1]`.
    pub success_rate: f64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            success_rate: DEFAULT_SUCCESS_RATE,
            min_delay_ms: DEFAULT_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl ProviderConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let success_rate = env_parsed("PAYMENT_SUCCESS_RATE", defaults.success_rate);
        let min_delay_ms = env_parsed("PAYMENT_MIN_DELAY_MS", defaults.min_delay_ms);
        let max_delay_ms = env_parsed("PAYMENT_MAX_DELAY_MS", defaults.max_delay_ms);
        Self { success_rate: success_rate.clamp(0.0, 1.0), min_delay_ms, max_delay_ms: max_delay_ms.max(min_delay_ms) }
    }
}

fn env_parsed<T: std::str::FromStr + Display>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|_| {
            warn!("🎲️ {s} is not a valid value for {var}. Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

//--------------------------------------    RandomProvider     -------------------------------------------------------
/// A mock gateway for demos: random latency inside a configured band, a configurable approval rate, and decline
/// reasons drawn from what real issuers actually say.
#[derive(Debug, Clone, Default)]
pub struct RandomProvider {
    config: ProviderConfig,
}

impl RandomProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

impl AuthorizationProvider for RandomProvider {
    async fn authorize(&self, request: AuthRequest) -> Result<ProviderOutcome, ProviderError> {
        let delay_ms = {
            let mut rng = thread_rng();
            rng.gen_range(self.config.min_delay_ms..=self.config.max_delay_ms)
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        let (approved, rrn, approval_code, reason_idx) = {
            let mut rng = thread_rng();
            let approved = rng.gen_bool(self.config.success_rate);
            let rrn = rng.gen_range(100_000_000_000_u64..=999_999_999_999_u64).to_string();
            let approval_code = random_approval_code(&mut rng);
            let reason_idx = rng.gen_range(0..CARD_FAILURE_REASONS.len());
            (approved, rrn, approval_code, reason_idx)
        };
        #[allow(clippy::cast_possible_wrap)]
        let processing_time_ms = delay_ms as i64;
        let network = match &request.instrument {
            InstrumentSummary::Card { network, .. } => Some(network.to_string()),
            _ => None,
        };
        debug!(
            "🎲️ Authorization for order {} processed. Approved: {approved}. Duration: {processing_time_ms}ms",
            request.order_id
        );

        if approved {
            let gateway = GatewayResponse {
                transaction_id: format!("TXN{rrn}"),
                rrn,
                approval_code: Some(approval_code),
                response_code: "00".to_string(),
                response_message: "Approved".to_string(),
                network,
                processing_time_ms,
                timestamp: Utc::now(),
            };
            return Ok(ProviderOutcome::Approved { gateway });
        }

        let (reason, response_code) = match request.method {
            PaymentMethod::Upi => (UPI_FAILURE_REASONS[reason_idx % UPI_FAILURE_REASONS.len()], "ZM"),
            _ => (CARD_FAILURE_REASONS[reason_idx], "05"),
        };
        let gateway = GatewayResponse {
            transaction_id: format!("TXN{rrn}"),
            rrn,
            approval_code: None,
            response_code: response_code.to_string(),
            response_message: reason.to_string(),
            network,
            processing_time_ms,
            timestamp: Utc::now(),
        };
        Ok(ProviderOutcome::Declined { reason: reason.to_string(), gateway: Some(gateway) })
    }
}

fn random_approval_code<R: Rng>(rng: &mut R) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..6).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char).collect()
}

//--------------------------------------    StaticProvider     -------------------------------------------------------
/// A deterministic provider for tests: fixed outcome, fixed latency, no randomness.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    approve: bool,
    decline_reason: String,
    latency: Duration,
}

impl StaticProvider {
    pub fn approving() -> Self {
        Self { approve: true, decline_reason: String::new(), latency: Duration::ZERO }
    }

    pub fn declining(reason: &str) -> Self {
        Self { approve: false, decline_reason: reason.to_string(), latency: Duration::ZERO }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl AuthorizationProvider for StaticProvider {
    async fn authorize(&self, request: AuthRequest) -> Result<ProviderOutcome, ProviderError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let gateway = GatewayResponse {
            transaction_id: format!("TXN-{}", request.order_id),
            rrn: "000000000000".to_string(),
            approval_code: self.approve.then(|| "STATIC".to_string()),
            response_code: if self.approve { "00" } else { "05" }.to_string(),
            response_message: if self.approve { "Approved".to_string() } else { self.decline_reason.clone() },
            network: None,
            processing_time_ms: 0,
            timestamp: Utc::now(),
        };
        if self.approve {
            Ok(ProviderOutcome::Approved { gateway })
        } else {
            Ok(ProviderOutcome::Declined { reason: self.decline_reason.clone(), gateway: Some(gateway) })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::PaymentInstrument;

    fn request() -> AuthRequest {
        let instrument = PaymentInstrument::card("4242424242424242", "12", "2030", "123");
        AuthRequest {
            order_id: OrderId::from("ORD_TEST".to_string()),
            amount: Money::from(999),
            currency: Currency::INR,
            method: instrument.method(),
            instrument: instrument.summary(),
        }
    }

    #[tokio::test]
    async fn static_provider_is_deterministic() {
        let provider = StaticProvider::approving();
        for _ in 0..3 {
            let outcome = provider.authorize(request()).await.unwrap();
            assert!(outcome.is_approved());
        }
        let provider = StaticProvider::declining("Insufficient funds");
        match provider.authorize(request()).await.unwrap() {
            ProviderOutcome::Declined { reason, gateway } => {
                assert_eq!(reason, "Insufficient funds");
                assert_eq!(gateway.unwrap().response_code, "05");
            },
            _ => panic!("expected a decline"),
        }
    }

    #[tokio::test]
    async fn random_provider_respects_certainties() {
        let config = ProviderConfig { success_rate: 1.0, min_delay_ms: 0, max_delay_ms: 1 };
        let provider = RandomProvider::new(config);
        let outcome = provider.authorize(request()).await.unwrap();
        assert!(outcome.is_approved());

        let config = ProviderConfig { success_rate: 0.0, min_delay_ms: 0, max_delay_ms: 1 };
        let provider = RandomProvider::new(config);
        let outcome = provider.authorize(request()).await.unwrap();
        assert!(!outcome.is_approved());
    }
}
