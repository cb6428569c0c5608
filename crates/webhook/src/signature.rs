//! HMAC-SHA256 signing of webhook bodies

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use types::{PaylisError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Optional scheme prefix on signature headers
const SCHEME_PREFIX: &str = "sha256=";

/// Lowercase hex HMAC-SHA256 of `body` keyed with `secret`
pub fn sign_payload(secret: &[u8], body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| PaylisError::Internal("Invalid HMAC key".to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature header against `body`.
///
/// Accepts bare hex or `sha256=<hex>`, case-insensitive hex. An empty secret
/// never verifies.
pub fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> bool {
    if secret.is_empty() {
        return false;
    }

    let provided = header.trim();
    let provided = provided.strip_prefix(SCHEME_PREFIX).unwrap_or(provided);
    let provided = provided.to_ascii_lowercase();
    let expected = match sign_payload(secret, body) {
        Ok(expected) => expected,
        Err(_) => return false,
    };

    if provided.len() != expected.len() {
        return false;
    }
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
