//! Cryptographic utilities for request signing and verification.
//!
//! Two callers present signed requests: the payment processor signs webhook
//! deliveries, and the cron scheduler (including our own self-requeue
//! requests) signs sweep invocations. Both use hex-encoded HMAC-SHA256 over
//! the raw request body.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 and return the hex-encoded result.
///
/// # Panics
///
/// This function will never panic in practice. The `expect` call is guarded
/// by the invariant that HMAC-SHA256 accepts keys of any size per RFC 2104.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    // INVARIANT: HMAC-SHA256 accepts keys of any size per RFC 2104, so
    // `new_from_slice` only fails if the Hmac implementation is broken.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message.as_bytes());
    let result = mac.finalize();

    hex::encode(result.into_bytes())
}

/// Constant-time string comparison to prevent timing attacks.
///
/// Used for signature comparison; never compare signatures with `==`.
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

/// Verify a hex-encoded HMAC-SHA256 signature over `body`.
#[must_use]
pub fn verify_signature(secret: &str, body: &str, signature: &str) -> bool {
    constant_time_eq(&hmac_sha256_hex(secret, body), signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_produces_64_hex_chars() {
        let result = hmac_sha256_hex("key", r#"{"cursor":null}"#);
        assert_eq!(result.len(), 64); // SHA256 = 32 bytes = 64 hex chars
    }

    #[test]
    fn hmac_sha256_is_deterministic() {
        assert_eq!(
            hmac_sha256_hex("secret", "message"),
            hmac_sha256_hex("secret", "message")
        );
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        assert_ne!(
            hmac_sha256_hex("secret-a", "message"),
            hmac_sha256_hex("secret-b", "message")
        );
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let sig = hmac_sha256_hex("secret", "body");
        assert!(verify_signature("secret", "body", &sig));
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let sig = hmac_sha256_hex("secret", "body");
        assert!(!verify_signature("secret", "tampered", &sig));
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(constant_time_eq("", ""));
    }
}
