//! HMAC request signatures.
//!
//! Both inbound API requests and outbound webhooks sign the exact string `"{timestamp}.{body}"`
//! with HMAC-SHA256 and send the result hex-encoded. The body is the raw byte payload, never a
//! re-serialisation, so verification happens before deserialization on the receiving side.
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Computes the hex-encoded signature for a timestamp and raw body.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded signature in constant time. Malformed hex fails verification rather
/// than erroring.
pub fn verify(secret: &str, timestamp: i64, body: &[u8], signature: &str) -> bool {
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

/// SHA-256 hex digest of an API key token, used for credential lookups so that raw keys are
/// never stored.
pub fn key_hash(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let body = br#"{"source":"webshop","sourceOrderId":"ORD-1001"}"#;
        let sig = sign("topsecret", 1_700_000_000, body);
        assert_eq!(sig.len(), 64);
        assert!(verify("topsecret", 1_700_000_000, body, &sig));
    }

    #[test]
    fn verification_failure_modes() {
        let body = b"payload";
        let sig = sign("topsecret", 1_700_000_000, body);
        // wrong secret
        assert!(!verify("othersecret", 1_700_000_000, body, &sig));
        // wrong timestamp
        assert!(!verify("topsecret", 1_700_000_001, body, &sig));
        // tampered body
        assert!(!verify("topsecret", 1_700_000_000, b"payloaX", &sig));
        // malformed hex
        assert!(!verify("topsecret", 1_700_000_000, body, "zz-not-hex"));
    }

    #[test]
    fn key_hash_is_stable() {
        assert_eq!(key_hash("fakt_live_abc"), key_hash("fakt_live_abc"));
        assert_ne!(key_hash("fakt_live_abc"), key_hash("fakt_live_abd"));
        assert_eq!(key_hash("x").len(), 64);
    }
}
