//! Webhook Payload Signatures
//!
//! Outgoing webhook bodies are signed with HMAC-SHA256 under the tenant's
//! decrypted key. The lowercase hex digest travels in [`SIGNATURE_HEADER`].

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature on outgoing webhook requests.
pub const SIGNATURE_HEADER: &str = "x-hmac-signature";

fn keyed_mac(key: &[u8], payload: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(payload);
    mac
}

/// Lowercase hex HMAC-SHA256 of `payload` under `key`.
pub fn sign_payload(key: &[u8], payload: &[u8]) -> String {
    hex::encode(keyed_mac(key, payload).finalize().into_bytes())
}

/// Check a received signature the way a webhook consumer would.
///
/// Hex case and surrounding whitespace are ignored. Anything that does not
/// decode to a full digest is rejected; the digest itself is compared in
/// constant time.
pub fn verify_signature(key: &[u8], payload: &[u8], signature: &str) -> bool {
    let Ok(digest) = hex::decode(signature.trim()) else {
        return false;
    };
    keyed_mac(key, payload).verify_slice(&digest).is_ok()
}
