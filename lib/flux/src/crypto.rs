//! HMAC-SHA-256 signing for the inter-process link (§4.1/§4.2), plus the
//! strict base64 decoding the keyring needs when loading a key from the
//! database or environment.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum size in bytes of an HMAC key accepted by the keyring (§3 "Keyring
/// entry").
pub const MAX_KEY_SIZE: usize = 64;

/// Size in bytes of a rendered hex-encoded HMAC-SHA-256 signature.
pub const SIGNATURE_HEX_LEN: usize = 64;

/// Computes the lowercase-hex HMAC-SHA-256 signature of `message` under
/// `key`. The wire encoding (hex, not base64) matches the reference
/// implementation's `hmac_sha256_hex`.
pub fn sign_hex(key: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    let bytes = mac.finalize().into_bytes();
    hex_encode(&bytes)
}

/// Verifies a lowercase-hex HMAC-SHA-256 signature in constant time.
pub fn verify_hex(key: &[u8], message: &[u8], signature_hex: &str) -> bool {
    let expected = match hex_decode(signature_hex) {
        Some(bytes) => bytes,
        None => return false,
    };

    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0xf) as usize] as char);
    }
    out
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let hi = (bytes[i] as char).to_digit(16)?;
        let lo = (bytes[i + 1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
        i += 2;
    }
    Some(out)
}

/// Strict base64 decode for keyring material: no embedded whitespace, length
/// must be a multiple of four including `=` padding. Mirrors
/// `s2s_keyring.c`'s `b64_decode_strict`, which rejects anything the
/// reference transport wouldn't itself have produced.
pub fn decode_key_b64(input: &str) -> Result<Vec<u8>, KeyDecodeError> {
    if input.is_empty() || input.len() % 4 != 0 {
        return Err(KeyDecodeError::BadLength);
    }
    if input.chars().any(|c| c.is_whitespace()) {
        return Err(KeyDecodeError::Whitespace);
    }

    let decoded = base64::decode(input).map_err(|_| KeyDecodeError::Invalid)?;
    if decoded.is_empty() || decoded.len() > MAX_KEY_SIZE {
        return Err(KeyDecodeError::BadLength);
    }
    Ok(decoded)
}

#[derive(Debug, Eq, PartialEq)]
pub enum KeyDecodeError {
    BadLength,
    Whitespace,
    Invalid,
}

/// Fills the provided buffer with cryptographically secure random bytes.
/// Used to synthesise nonces and placeholder keys.
pub fn random_bytes(out: &mut [u8]) {
    rand::rngs::OsRng.fill_bytes(out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let key = b"super-secret-key";
        let msg = b"{\"type\":\"health\"}";
        let sig = sign_hex(key, msg);

        assert!(verify_hex(key, msg, &sig));
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let msg = b"{\"type\":\"health\"}";
        let sig = sign_hex(b"key-a", msg);

        assert!(!verify_hex(b"key-b", msg, &sig));
    }

    #[test]
    fn verify_fails_with_tampered_message() {
        let key = b"super-secret-key";
        let sig = sign_hex(key, b"original");

        assert!(!verify_hex(key, b"tampered", &sig));
    }

    #[test]
    fn decode_key_rejects_whitespace() {
        assert_eq!(decode_key_b64("AA AA").unwrap_err(), KeyDecodeError::Whitespace);
    }

    #[test]
    fn decode_key_rejects_bad_length() {
        assert_eq!(decode_key_b64("AAA").unwrap_err(), KeyDecodeError::BadLength);
    }

    #[test]
    fn decode_key_accepts_well_formed_base64() {
        let encoded = base64::encode(b"0123456789012345678901234567890123456789012");
        assert!(decode_key_b64(&encoded).is_ok());
    }
}
