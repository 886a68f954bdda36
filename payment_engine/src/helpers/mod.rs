//! Small pure helpers: identifier generation, hashing and card-number handling.

use blake2::{Blake2b512, Digest};
use rand::Rng;

use crate::db_types::{CardNetwork, OrderId, PaymentId};

/// Generates a fresh order identifier: `ORD_` plus 16 uppercase hex characters.
pub fn new_order_id() -> OrderId {
    OrderId(random_token("ORD_"))
}

/// Generates a fresh payment identifier: `PAY_` plus 16 uppercase hex characters.
pub fn new_payment_id() -> PaymentId {
    PaymentId(random_token("PAY_"))
}

fn random_token(prefix: &str) -> String {
    let n: u64 = rand::thread_rng().gen();
    format!("{prefix}{n:016X}")
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// A deterministic fingerprint of a request body plus its owner. The same logical request always hashes to the same
/// value, so a reused idempotency key carrying a different intent can be detected and rejected.
pub fn request_fingerprint(customer_id: &str, body: &serde_json::Value) -> String {
    let mut hasher = Blake2b512::new();
    hasher.update(customer_id.as_bytes());
    hasher.update(b"|");
    hasher.update(body.to_string().as_bytes());
    to_hex(&hasher.finalize())
}

/// Masks a card number down to its last four digits. This is the only form of the PAN the gateway displays.
pub fn mask_card_number(card_number: &str) -> String {
    let cleaned: String = card_number.chars().filter(|c| !c.is_whitespace()).collect();
    let last_four = if cleaned.len() >= 4 { &cleaned[cleaned.len() - 4..] } else { cleaned.as_str() };
    format!("**** **** **** {last_four}")
}

/// A one-way digest of the PAN, used to recognise a returning instrument without storing the number.
pub fn card_digest(card_number: &str) -> String {
    let cleaned: String = card_number.chars().filter(|c| !c.is_whitespace()).collect();
    let mut hasher = Blake2b512::new();
    hasher.update(cleaned.as_bytes());
    to_hex(&hasher.finalize())
}

/// Best-effort card network detection from the leading digits of the PAN.
pub fn detect_card_network(card_number: &str) -> CardNetwork {
    let cleaned: String = card_number.chars().filter(|c| !c.is_whitespace()).collect();
    match cleaned.as_bytes() {
        [b'4', ..] => CardNetwork::Visa,
        [b'5', b'1'..=b'5', ..] => CardNetwork::Mastercard,
        [b'3', b'4' | b'7', ..] => CardNetwork::Amex,
        [b'6', ..] => CardNetwork::Discover,
        _ => CardNetwork::Unknown,
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn identifiers_have_the_documented_shape() {
        let oid = new_order_id();
        assert!(oid.as_str().starts_with("ORD_"));
        assert_eq!(oid.as_str().len(), 20);
        let pid = new_payment_id();
        assert!(pid.as_str().starts_with("PAY_"));
        assert_eq!(pid.as_str().len(), 20);
        assert_ne!(new_order_id(), new_order_id());
    }

    #[test]
    fn fingerprint_is_stable_and_owner_scoped() {
        let body = json!({"order_id": "ORD_1", "method": "Card"});
        let a = request_fingerprint("alice", &body);
        let b = request_fingerprint("alice", &body);
        assert_eq!(a, b);
        assert_ne!(a, request_fingerprint("bob", &body));
        assert_ne!(a, request_fingerprint("alice", &json!({"order_id": "ORD_2", "method": "Card"})));
    }

    #[test]
    fn card_masking() {
        assert_eq!(mask_card_number("4242 4242 4242 4242"), "**** **** **** 4242");
        assert_eq!(mask_card_number("5500005555555559"), "**** **** **** 5559");
    }

    #[test]
    fn card_network_detection() {
        assert_eq!(detect_card_network("4242424242424242"), CardNetwork::Visa);
        assert_eq!(detect_card_network("5500005555555559"), CardNetwork::Mastercard);
        assert_eq!(detect_card_network("378282246310005"), CardNetwork::Amex);
        assert_eq!(detect_card_network("6011111111111117"), CardNetwork::Discover);
        assert_eq!(detect_card_network("9999999999999999"), CardNetwork::Unknown);
    }

    #[test]
    fn card_digest_ignores_whitespace() {
        assert_eq!(card_digest("4242 4242 4242 4242"), card_digest("4242424242424242"));
        assert_ne!(card_digest("4242424242424242"), card_digest("4242424242424243"));
    }
}
