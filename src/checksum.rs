//! Integrity checksums for replicated rule payloads.
//!
//! Every committed rule carries a digest of its payload so replicas can detect
//! corruption before applying an entry received over the wire.

use sha2::{Digest, Sha256};

/// Computes the hex-encoded SHA-256 digest of a byte string.
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Checks a payload against a previously computed digest.
pub fn verify(data: &[u8], expected: &str) -> bool {
    digest(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let a = digest(b"{:>8.2}");
        let b = digest(b"{:>8.2}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // 32 bytes, hex-encoded
    }

    #[test]
    fn test_single_byte_corruption_detected() {
        let checksum = digest(b"value={}");
        assert!(verify(b"value={}", &checksum));
        assert!(!verify(b"value={]", &checksum));
    }

    #[test]
    fn test_empty_payload() {
        assert!(verify(b"", &digest(b"")));
    }
}
