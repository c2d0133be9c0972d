//! Webhook signature scheme.
//!
//! Deliveries carry a header of the form `t=<unix_ts>,v1=<hex_hmac>`
//! where the HMAC-SHA256 is computed over `"{t}.{raw_body}"` with the
//! shared webhook secret. The timestamp bounds replay of captured
//! deliveries.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Default replay tolerance in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Why a signature header was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Malformed signature header")]
    Malformed,

    #[error("Timestamp outside tolerance window")]
    TimestampOutOfRange,

    #[error("Signature mismatch")]
    Mismatch,
}

/// Computes the `v1` signature for a timestamp and raw body.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds a complete signature header. Used by tests and by tooling
/// that replays deliveries against a local instance.
pub fn header(secret: &str, timestamp: i64, body: &[u8]) -> String {
    format!("t={},v1={}", timestamp, sign(secret, timestamp, body))
}

/// Verifies a signature header against the raw body.
///
/// `now` is the verifier's clock as a unix timestamp; deliveries whose
/// embedded timestamp differs by more than `tolerance_secs` in either
/// direction are rejected before any comparison happens.
pub fn verify(
    secret: &str,
    body: &[u8],
    header: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let (timestamp, provided) = parse_header(header)?;

    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::TimestampOutOfRange);
    }

    let expected = sign(secret, timestamp, body);
    if expected.as_bytes().ct_eq(provided.as_bytes()).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn parse_header(header: &str) -> Result<(i64, &str), SignatureError> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signature = Some(v),
            _ => {}
        }
    }

    match (timestamp, signature) {
        (Some(t), Some(s)) if !s.is_empty() => Ok((t, s)),
        _ => Err(SignatureError::Malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_123";
    const BODY: &[u8] = br#"{"type":"payment_intent.succeeded"}"#;

    #[test]
    fn test_round_trip() {
        let now = 1_700_000_000;
        let h = header(SECRET, now, BODY);
        assert!(verify(SECRET, BODY, &h, now, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_wrong_secret() {
        let now = 1_700_000_000;
        let h = header(SECRET, now, BODY);
        assert_eq!(
            verify("whsec_other", BODY, &h, now, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_tampered_body() {
        let now = 1_700_000_000;
        let h = header(SECRET, now, BODY);
        assert_eq!(
            verify(SECRET, b"tampered", &h, now, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_stale_timestamp() {
        let signed_at = 1_700_000_000;
        let h = header(SECRET, signed_at, BODY);
        assert_eq!(
            verify(
                SECRET,
                BODY,
                &h,
                signed_at + DEFAULT_TOLERANCE_SECS + 1,
                DEFAULT_TOLERANCE_SECS
            ),
            Err(SignatureError::TimestampOutOfRange)
        );
    }

    #[test]
    fn test_future_timestamp() {
        let signed_at = 1_700_000_000;
        let h = header(SECRET, signed_at, BODY);
        assert_eq!(
            verify(
                SECRET,
                BODY,
                &h,
                signed_at - DEFAULT_TOLERANCE_SECS - 1,
                DEFAULT_TOLERANCE_SECS
            ),
            Err(SignatureError::TimestampOutOfRange)
        );
    }

    #[test]
    fn test_malformed_headers() {
        let now = 1_700_000_000;
        for bad in ["", "v1=abc", "t=123", "t=abc,v1=def,garbage", "t=,v1="] {
            assert_eq!(
                verify(SECRET, BODY, bad, now, DEFAULT_TOLERANCE_SECS),
                Err(SignatureError::Malformed),
                "header {:?} should be malformed",
                bad
            );
        }
    }

    #[test]
    fn test_extra_fields_ignored() {
        let now = 1_700_000_000;
        let h = format!("{},v0=legacy", header(SECRET, now, BODY));
        assert!(verify(SECRET, BODY, &h, now, DEFAULT_TOLERANCE_SECS).is_ok());
    }
}
