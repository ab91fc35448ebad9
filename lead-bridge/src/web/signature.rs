//! Stripe webhook signature verification.
//!
//! Stripe signs webhook requests using HMAC-SHA256.
//! Reference: https://docs.stripe.com/webhooks#verify-manually

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use crate::stripe::WebhookEvent;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Signature scheme Stripe uses for live signatures.
const EXPECTED_SCHEME: &str = "v1";

/// Reasons a webhook payload is rejected.
///
/// The display strings are returned to the caller after "Webhook Error: ".
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("No stripe-signature header value was provided.")]
    MissingHeader,

    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,

    #[error("No signatures found with expected scheme")]
    NoSignaturesForScheme,

    #[error("No signatures found matching the expected signature for payload")]
    Mismatch,

    #[error("Timestamp outside the tolerance zone")]
    TimestampOutOfTolerance,

    #[error("Webhook signing secret is not configured")]
    MissingSecret,

    #[error("Webhook signing secret is not a valid HMAC key")]
    InvalidSecret,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Parsed `Stripe-Signature` header.
#[derive(Debug, PartialEq)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

impl SignatureHeader {
    /// Parse `t=<unix>,v1=<hex>,v1=<hex>,v0=...`.
    fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for item in header.split(',') {
            let (key, value) = match item.trim().split_once('=') {
                Some(kv) => kv,
                None => continue,
            };

            match key {
                "t" => timestamp = value.parse::<i64>().ok(),
                EXPECTED_SCHEME => signatures.push(value.to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(SignatureError::NoSignaturesForScheme);
        }

        Ok(SignatureHeader {
            timestamp,
            signatures,
        })
    }
}

/// Compute the hex signature Stripe would send for `payload` at `timestamp`.
pub fn compute_signature(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, SignatureError> {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            warn!("stripe_signature_invalid_key");
            return Err(SignatureError::InvalidSecret);
        }
    };

    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a Stripe webhook signature.
///
/// # Arguments
///
/// * `payload` - The raw, unparsed request body
/// * `header` - The `Stripe-Signature` header value, if present
/// * `secret` - The endpoint's webhook signing secret
/// * `tolerance_secs` - Maximum allowed age of the signature timestamp (prevents replay attacks).
///   Timestamps ahead of the local clock are accepted, as in Stripe's own libraries.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: u64,
) -> Result<(), SignatureError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    verify_signature_at(payload, header, secret, tolerance_secs, now)
}

fn verify_signature_at(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureError> {
    if secret.trim().is_empty() {
        return Err(SignatureError::MissingSecret);
    }

    let header = match header.map(str::trim) {
        Some(h) if !h.is_empty() => SignatureHeader::parse(h)?,
        _ => return Err(SignatureError::MissingHeader),
    };

    let expected = compute_signature(secret, header.timestamp, payload)?;

    // Constant-time comparison to prevent timing attacks
    let matched = header
        .signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate));

    if !matched {
        warn!(
            signature_count = header.signatures.len(),
            payload_length = payload.len(),
            "stripe_signature_mismatch"
        );
        return Err(SignatureError::Mismatch);
    }

    let age = now.saturating_sub(header.timestamp);
    if tolerance_secs > 0 && age > i64::try_from(tolerance_secs).unwrap_or(i64::MAX) {
        warn!(
            webhook_time = header.timestamp,
            current_time = now,
            age_seconds = age,
            max_age_seconds = tolerance_secs,
            "stripe_signature_stale"
        );
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    Ok(())
}

/// Verify the signature, then parse the payload as a Stripe event.
pub fn construct_event(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: u64,
) -> Result<WebhookEvent, SignatureError> {
    verify_signature(payload, header, secret, tolerance_secs)?;
    Ok(serde_json::from_slice(payload)?)
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
