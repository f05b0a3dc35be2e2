//! SHA-256 digests for input audit.
//!
//! - `sha256_canonical_value`: parsed JSON, hashed over canonical bytes so
//!   key order and whitespace in the source file do not matter.
//! - `sha256_hex`: raw bytes.
//!
//! Hex digests are lowercase.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical_json::to_canonical_json_bytes;

/// SHA-256 over raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 over the canonical bytes of a parsed JSON value.
pub fn sha256_canonical_value(v: &Value) -> String {
    sha256_hex(&to_canonical_json_bytes(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_vector_is_lowercase() {
        let h = sha256_hex(b"abc");
        assert_eq!(h, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_eq!(h, h.to_lowercase());
    }

    #[test]
    fn canonical_digest_ignores_key_order_and_whitespace() {
        let a = sha256_canonical_value(&json!({"math": 30, "language": 40}));
        let b: Value = serde_json::from_str("{ \"language\" : 40,\n  \"math\": 30 }").unwrap();
        assert_eq!(a, sha256_canonical_value(&b));
        assert_ne!(a, sha256_canonical_value(&json!({"language": 40, "math": 31})));
    }
}
