//! Signature verification for inbound payment provider webhooks.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
pub const SIGNATURE_HEADER: &str = "x-signature";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing or malformed")]
    Malformed,
    #[error("timestamp outside the tolerance window")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`
pub fn sign_payload(secret: &str, timestamp: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn check_timestamp(timestamp: &str, now: i64, tolerance_secs: u64) -> Result<(), SignatureError> {
    let ts: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    if (now - ts).unsigned_abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

/// Verifies a `Stripe-Signature` header (`t=...,v1=...`). Any matching `v1`
/// entry is accepted, which covers secret rotation.
pub fn verify_stripe_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    check_timestamp(timestamp, now, tolerance_secs)?;

    let expected = sign_payload(secret, timestamp, payload);
    if signatures.iter().any(|s| constant_time_eq(&expected, s)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Verifies the generic `x-timestamp` / `x-signature` HMAC pair used for PayPal
pub fn verify_hmac_signature(
    timestamp: &str,
    signature: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureError> {
    check_timestamp(timestamp, now, tolerance_secs)?;
    let expected = sign_payload(secret, timestamp, payload);
    if constant_time_eq(&expected, signature.trim()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn stripe_signature_round_trip() {
        let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let now = 1_717_200_000;
        let sig = sign_payload(SECRET, &now.to_string(), payload);
        let header = format!("t={},v1=deadbeef,v1={}", now, sig);

        assert_eq!(verify_stripe_signature(&header, payload, SECRET, 300, now + 10), Ok(()));
        assert_eq!(
            verify_stripe_signature(&header, payload, SECRET, 300, now + 301),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            verify_stripe_signature(&header, b"{}", SECRET, 300, now),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_stripe_signature("v1=abc", payload, SECRET, 300, now),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn hmac_signature_checks_timestamp_and_body() {
        let payload = br#"{"event_type":"PAYMENT.CAPTURE.COMPLETED"}"#;
        let now = 1_717_200_000;
        let sig = sign_payload(SECRET, &now.to_string(), payload);

        assert!(verify_hmac_signature(&now.to_string(), &sig, payload, SECRET, 300, now).is_ok());
        assert_eq!(
            verify_hmac_signature("not-a-number", &sig, payload, SECRET, 300, now),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_hmac_signature(&now.to_string(), &sig, payload, "other", 300, now),
            Err(SignatureError::Mismatch)
        );
    }

    proptest! {
        #[test]
        fn tampered_payloads_never_verify(body in proptest::collection::vec(any::<u8>(), 1..256), flip in any::<usize>()) {
            let ts = "1717200000";
            let sig = sign_payload(SECRET, ts, &body);
            let mut tampered = body.clone();
            let idx = flip % tampered.len();
            tampered[idx] ^= 0x01;
            prop_assert!(verify_hmac_signature(ts, &sig, &tampered, SECRET, 300, 1_717_200_000).is_err());
        }
    }
}
