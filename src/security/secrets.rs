//! Generated credentials and payload signatures.
//!
//! Secrets are shown to the caller once and only their SHA-256 hex digest is
//! stored. Webhook payloads are signed with HMAC-SHA256 keyed by that digest.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_PREFIX: &str = "tdk_";
pub const WEBHOOK_SECRET_PREFIX: &str = "whsec_";
const DISPLAY_PREFIX_LEN: usize = 12;

/// A freshly generated credential: plaintext for the caller, hash for storage
#[derive(Debug, Clone)]
pub struct GeneratedSecret {
    pub plaintext: String,
    pub display_prefix: String,
    pub hash: String,
}

/// 64 hex characters drawn from two v4 UUIDs (244 random bits)
pub fn random_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn generate_with_prefix(prefix: &str) -> GeneratedSecret {
    let plaintext = format!("{}{}", prefix, random_token());
    GeneratedSecret {
        display_prefix: plaintext[..DISPLAY_PREFIX_LEN].to_string(),
        hash: sha256_hex(&plaintext),
        plaintext,
    }
}

pub fn generate_api_key() -> GeneratedSecret {
    generate_with_prefix(API_KEY_PREFIX)
}

pub fn generate_webhook_secret() -> GeneratedSecret {
    generate_with_prefix(WEBHOOK_SECRET_PREFIX)
}

pub fn generate_invitation_token() -> GeneratedSecret {
    generate_with_prefix("inv_")
}

fn mac_for(key: &[u8], timestamp: i64, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Some(mac)
}

/// `sha256=<hex>` over `"{timestamp}.{body}"`
pub fn sign_payload(key: &str, timestamp: i64, body: &[u8]) -> Option<String> {
    let mac = mac_for(key.as_bytes(), timestamp, body)?;
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Constant-time check of a hex HMAC-SHA256 over `"{timestamp}.{body}"`
pub fn verify_hex_signature(key: &str, timestamp: i64, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim_start_matches("sha256=")) else {
        return false;
    };
    mac_for(key.as_bytes(), timestamp, body)
        .map(|mac| mac.verify_slice(&expected).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_shape_and_hash() {
        let key = generate_api_key();
        assert!(key.plaintext.starts_with(API_KEY_PREFIX));
        assert_eq!(key.plaintext.len(), API_KEY_PREFIX.len() + 64);
        assert_eq!(key.display_prefix.len(), DISPLAY_PREFIX_LEN);
        assert!(key.plaintext.starts_with(&key.display_prefix));
        assert_eq!(key.hash, sha256_hex(&key.plaintext));
        assert_ne!(key.plaintext, generate_api_key().plaintext);
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn signature_verifies_and_detects_tampering() {
        let secret = generate_webhook_secret();
        let body = br#"{"event":"tender.created"}"#;
        let signature = sign_payload(&secret.hash, 1_700_000_000, body).unwrap();
        assert!(signature.starts_with("sha256="));

        assert!(verify_hex_signature(&secret.hash, 1_700_000_000, body, &signature));
        assert!(!verify_hex_signature(&secret.hash, 1_700_000_001, body, &signature));
        assert!(!verify_hex_signature(&secret.hash, 1_700_000_000, b"{}", &signature));
        assert!(!verify_hex_signature("other", 1_700_000_000, body, &signature));
        assert!(!verify_hex_signature(&secret.hash, 1_700_000_000, body, "zz-not-hex"));
    }
}
