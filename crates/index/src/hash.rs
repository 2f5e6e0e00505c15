//! Block Hashing
//!
//! Digests are the first [`DIGEST_SIZE`] bytes of BLAKE3's extendable output.
//! Speed and coverage matter here, not collision resistance: collisions are
//! expected at scale and filtered out by the matcher's positional check.

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

/// Width of a digest as stored in an index record.
pub const DIGEST_SIZE: usize = 20;

/// Fixed-width content digest of one fine block.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_SIZE]);
impl Digest {
    /// All-zero digest. Only ever stored as part of a sentinel record.
    pub const ZERO: Digest = Digest([0; DIGEST_SIZE]);

    pub const fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}
impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        self.0.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
    }
}
impl Debug for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Digest({self})")
    }
}

/// Hash a block of data.
///
/// A short final block must be passed as-is; padding it would produce a digest
/// that the same content on another device never matches.
pub fn hash_block(data: &[u8]) -> Digest {
    let mut digest = [0; DIGEST_SIZE];
    let mut output = blake3::Hasher::new().update(data).finalize_xof();
    output.fill(&mut digest);
    Digest(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_digest_is_blake3_prefix() {
        let data = vec![0xAB; 8192];
        let digest = hash_block(&data);
        assert_eq!(digest.as_bytes(), &blake3::hash(&data).as_bytes()[..DIGEST_SIZE]);
    }

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"a".as_slice())]
    #[case(&[0u8; 8192])]
    fn test_hash_is_deterministic(#[case] data: &[u8]) {
        assert_eq!(hash_block(data), hash_block(data));
        assert_ne!(hash_block(data), Digest::ZERO);
    }

    #[test]
    fn test_short_block_is_not_padded() {
        let short = vec![7u8; 100];
        let mut padded = short.clone();
        padded.resize(8192, 0);
        assert_ne!(hash_block(&short), hash_block(&padded));
    }

    #[test]
    fn test_display_hex() {
        let mut bytes = [0u8; DIGEST_SIZE];
        bytes[0] = 0xde;
        bytes[1] = 0xad;
        bytes[19] = 0x01;
        let digest = Digest::from_bytes(bytes);
        assert_eq!(digest.to_string(), "dead000000000000000000000000000000000001");
        assert_eq!(format!("{digest:?}"), "Digest(dead000000000000000000000000000000000001)");
    }
}
