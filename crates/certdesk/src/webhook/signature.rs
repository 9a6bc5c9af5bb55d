//! Webhook payload authentication.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Checks an HMAC-SHA256 signature over the raw payload. The signature is
/// hex, optionally prefixed with `sha256=`; comparison is constant-time.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let hex_sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
