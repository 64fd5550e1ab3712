//! Digest and HMAC signature over canonical bytes.
//!
//! The service's security policy fixes SHA-1 for `DigestMethod` and HMAC-SHA1 for
//! `SignatureMethod`; the HMAC key is the STS-issued binary secret.

use crate::error::{KpsError, KpsResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

type HmacSha1 = Hmac<Sha1>;

/// `DigestValue`: base64 of SHA-1 over the canonical bytes.
pub fn digest(canonical: &[u8]) -> String {
    STANDARD.encode(Sha1::digest(canonical))
}

/// `SignatureValue`: base64 of HMAC-SHA1 over the canonical bytes, keyed with the
/// decoded secret.
pub fn sign(canonical: &[u8], key_b64: &str) -> KpsResult<String> {
    let key = decode_key(key_b64)?;
    let mut mac = HmacSha1::new_from_slice(&key).map_err(|e| KpsError::InvalidKey(e.to_string()))?;
    mac.update(canonical);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn decode_key(key_b64: &str) -> KpsResult<Vec<u8>> {
    let key = STANDARD
        .decode(key_b64.trim())
        .map_err(|e| KpsError::InvalidKey(format!("secret is not base64: {e}")))?;
    if key.is_empty() {
        return Err(KpsError::InvalidKey("secret is empty".to_string()));
    }
    Ok(key)
}
