//! WireGuard key material
//!
//! Keys travel as standard base64 strings everywhere in wirelift; this module
//! converts between that form and X25519 keys.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Error, Result};

/// Length of a raw key in bytes
pub const KEY_LEN: usize = 32;

/// Decode a base64 key, checking its length
pub fn decode_key(key: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = BASE64
        .decode(key.trim())
        .map_err(|e| Error::Key(format!("invalid base64 key: {}", e)))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| Error::Key(format!("key must be {} bytes, got {}", KEY_LEN, b.len())))
}

/// Encode a raw key as base64
pub fn encode_key(key: &[u8; KEY_LEN]) -> String {
    BASE64.encode(key)
}

/// Check whether a string is a well formed base64 key
pub fn is_valid_key(key: &str) -> bool {
    decode_key(key).is_ok()
}

/// Generate a new clamped private key, base64 encoded
pub fn generate_private_key() -> String {
    let mut bytes: [u8; KEY_LEN] = rand::random();
    bytes[0] &= 248;
    bytes[31] &= 127;
    bytes[31] |= 64;
    encode_key(&bytes)
}

/// Generate a random preshared key, base64 encoded
pub fn generate_preshared_key() -> String {
    let bytes: [u8; KEY_LEN] = rand::random();
    encode_key(&bytes)
}

/// Derive the public key for a base64 private key
pub fn public_key(private_key: &str) -> Result<String> {
    let secret = StaticSecret::from(decode_key(private_key)?);
    Ok(encode_key(PublicKey::from(&secret).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_is_clamped() {
        let key = decode_key(&generate_private_key()).unwrap();
        assert_eq!(key[0] & 7, 0);
        assert_eq!(key[31] & 128, 0);
        assert_eq!(key[31] & 64, 64);
    }

    #[test]
    fn test_public_key_derivation() {
        // RFC 7748 section 6.1 test vector (Alice)
        let private = encode_key(&[
            0x77, 0x07, 0x6d, 0x0a, 0x73, 0x18, 0xa5, 0x7d, 0x3c, 0x16, 0xc1, 0x72, 0x51, 0xb2,
            0x66, 0x45, 0xdf, 0x4c, 0x2f, 0x87, 0xeb, 0xc0, 0x99, 0x2a, 0xb1, 0x77, 0xfb, 0xa5,
            0x1d, 0xb9, 0x2c, 0x2a,
        ]);
        let expected = encode_key(&[
            0x85, 0x20, 0xf0, 0x09, 0x89, 0x30, 0xa7, 0x54, 0x74, 0x8b, 0x7d, 0xdc, 0xb4, 0x3e,
            0xf7, 0x5a, 0x0d, 0xbf, 0x3a, 0x0d, 0x26, 0x38, 0x1a, 0xf4, 0xeb, 0xa4, 0xa9, 0x8e,
            0xaa, 0x9b, 0x4e, 0x6a,
        ]);
        assert_eq!(public_key(&private).unwrap(), expected);
    }

    #[test]
    fn test_bad_keys() {
        assert!(!is_valid_key("not base64!"));
        assert!(!is_valid_key("AAAA"));
        assert!(is_valid_key(&generate_preshared_key()));
    }
}
