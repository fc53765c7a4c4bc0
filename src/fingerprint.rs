//! Content fingerprints.
//!
//! A document's identity is the SHA-256 of its raw bytes, hex encoded. Two
//! files with identical bytes share a fingerprint whatever their names.

use sha2::{Digest, Sha256};

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 64;

pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn stable_and_fixed_length() {
        let a = fingerprint(b"same bytes");
        let b = fingerprint(b"same bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert_ne!(a, fingerprint(b"same bytes!"));
    }
}
