//! Cryptographic utilities for webhook verification and upload signing.
//!
//! This module provides shared cryptographic functions for verifying webhook
//! signatures from the render provider and Stripe, and for signing durable
//! storage uploads.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 and return hex-encoded result.
///
/// # Panics
///
/// This function will never panic in practice. The `expect` call is guarded by
/// the invariant that HMAC-SHA256 accepts keys of any size per RFC 2104.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    // INVARIANT: HMAC-SHA256 accepts keys of any size per RFC 2104, so
    // `new_from_slice` only fails if the Hmac implementation is broken.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(message: &str) -> String {
    hex::encode(Sha256::digest(message.as_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Verify a render provider webhook signature.
///
/// The header carries the hex HMAC-SHA256 of the raw body, optionally
/// prefixed with `sha256=`.
#[must_use]
pub fn verify_provider_signature(payload: &str, header: &str, secret: &str) -> bool {
    let signature = header.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    constant_time_eq(&hmac_sha256_hex(secret, payload), &signature.to_ascii_lowercase())
}

/// Verify a `Stripe-Signature` header (`t=timestamp,v1=signature,...`).
#[must_use]
pub fn verify_stripe_signature(payload: &str, header: &str, secret: &str) -> bool {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(ts)) => timestamp = Some(ts),
            (Some("v1"), Some(sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };

    let expected = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"));
    signatures.iter().any(|sig| constant_time_eq(&expected, sig))
}
