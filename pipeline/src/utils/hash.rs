//! Content hashing

use sha2::{Digest, Sha256};

/// SHA-256 of the input, lowercase hex.
///
/// Document dedup keys on this value, so it must be computed over the
/// extracted text, not the raw response body.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_hex_empty() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_hex_is_stable() {
        assert_eq!(sha256_hex(b"P0301"), sha256_hex(b"P0301"));
        assert_ne!(sha256_hex(b"P0301"), sha256_hex(b"P0302"));
    }
}
