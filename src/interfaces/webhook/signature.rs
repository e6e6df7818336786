//! HMAC-SHA256 webhook signatures.

use crate::error::{PaymentError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Parsed `Stripe-Signature` header.
///
/// # Format
/// ```text
/// t=timestamp,v1=signature[,v1=signature...]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSignature {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

pub fn parse_stripe_header(header: &str) -> Result<StripeSignature> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    PaymentError::SignatureInvalid("invalid timestamp".to_string())
                })?)
            }
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(StripeSignature {
            timestamp,
            signatures,
        }),
        _ => Err(PaymentError::SignatureInvalid(
            "invalid signature header format".to_string(),
        )),
    }
}

fn hmac_hex(secret: &str, parts: &[&[u8]]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::SignatureInvalid("invalid secret key".to_string()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn matches(expected: &str, candidate: &str) -> bool {
    expected.as_bytes().ct_eq(candidate.as_bytes()).into()
}

/// Header value Stripe would send for `payload` signed at `timestamp`.
pub fn sign_stripe(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let ts = timestamp.to_string();
    let signature = hmac_hex(secret, &[ts.as_bytes(), b".", payload])?;
    Ok(format!("t={timestamp},v1={signature}"))
}

/// Checks a Stripe webhook against `secret`.
///
/// The signed payload is `"{t}.{body}"`. Timestamps further than
/// `tolerance_secs` from `now` are refused as replays.
pub fn verify_stripe(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<()> {
    let parsed = parse_stripe_header(header)?;

    if (now - parsed.timestamp).abs() > tolerance_secs {
        return Err(PaymentError::SignatureInvalid(
            "timestamp outside tolerance window".to_string(),
        ));
    }

    let ts = parsed.timestamp.to_string();
    let expected = hmac_hex(secret, &[ts.as_bytes(), b".", payload])?;
    if parsed.signatures.iter().any(|sig| matches(&expected, sig)) {
        Ok(())
    } else {
        Err(PaymentError::SignatureInvalid(
            "no matching signature".to_string(),
        ))
    }
}

/// Alma signs the payment id with the merchant's API key.
pub fn sign_alma(payment_id: &str, secret: &str) -> Result<String> {
    hmac_hex(secret, &[payment_id.as_bytes()])
}

pub fn verify_alma(payment_id: &str, signature: &str, secret: &str) -> Result<()> {
    let expected = sign_alma(payment_id, secret)?;
    if matches(&expected, signature.trim()) {
        Ok(())
    } else {
        Err(PaymentError::SignatureInvalid(
            "Alma signature mismatch".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"type":"payment_intent.succeeded"}"#;

    #[test]
    fn test_parse_stripe_header() {
        let parsed = parse_stripe_header("t=1609459200,v1=abcdef,v0=old,v1=123456").unwrap();
        assert_eq!(parsed.timestamp, 1609459200);
        assert_eq!(parsed.signatures, vec!["abcdef", "123456"]);
    }

    #[test]
    fn test_parse_stripe_header_invalid() {
        assert!(parse_stripe_header("invalid").is_err());
        assert!(parse_stripe_header("t=1609459200").is_err());
        assert!(parse_stripe_header("t=soon,v1=abc").is_err());
    }

    #[test]
    fn test_stripe_signature_accepted() {
        let header = sign_stripe(BODY, SECRET, 1_000).unwrap();
        verify_stripe(BODY, &header, SECRET, 300, 1_100).unwrap();
    }

    #[test]
    fn test_stripe_signature_tampered_body() {
        let header = sign_stripe(BODY, SECRET, 1_000).unwrap();
        let err = verify_stripe(b"{}", &header, SECRET, 300, 1_000).unwrap_err();
        assert!(matches!(err, PaymentError::SignatureInvalid(_)));
    }

    #[test]
    fn test_stripe_signature_wrong_secret() {
        let header = sign_stripe(BODY, "whsec_other", 1_000).unwrap();
        assert!(verify_stripe(BODY, &header, SECRET, 300, 1_000).is_err());
    }

    #[test]
    fn test_stripe_signature_replay_window() {
        let header = sign_stripe(BODY, SECRET, 1_000).unwrap();
        assert!(verify_stripe(BODY, &header, SECRET, 300, 1_301).is_err());
        assert!(verify_stripe(BODY, &header, SECRET, 300, 699).is_err());
        verify_stripe(BODY, &header, SECRET, 300, 1_300).unwrap();
    }

    #[test]
    fn test_alma_signature() {
        let signature = sign_alma("payment_123", "sk_alma").unwrap();
        verify_alma("payment_123", &signature, "sk_alma").unwrap();
        assert!(verify_alma("payment_456", &signature, "sk_alma").is_err());
        assert!(verify_alma("payment_123", &signature, "sk_other").is_err());
    }
}
