//! Content checksums shared by the storage provider and the engine.

use sha2::{Digest, Sha256};

/// Length of a checksum in hex characters.
pub const CHECKSUM_HEX_LEN: usize = 64;

/// Computes the lowercase SHA-256 hex digest of `data`.
#[must_use]
pub fn content_checksum(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(CHECKSUM_HEX_LEN);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            content_checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn one_byte_changes_digest() {
        assert_ne!(content_checksum(b"hello"), content_checksum(b"hellp"));
        assert_eq!(content_checksum(b"").len(), CHECKSUM_HEX_LEN);
    }
}
