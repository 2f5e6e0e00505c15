//! Index records and their on-disk encoding.

use crate::hash::{DIGEST_SIZE, Digest};
use std::cmp::Ordering;

/// Size of one encoded record: digest followed by a native-endian `u64`.
pub const RECORD_SIZE: usize = DIGEST_SIZE + size_of::<u64>();

/// A `(digest, origin offset)` pair.
///
/// Records are totally ordered by `(is_sentinel, digest, offset)`: sentinels
/// sort after every real record and are all identical, and the offset breaks
/// ties between blocks with identical content. A given set of records
/// therefore has exactly one sorted arrangement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Record {
    pub digest: Digest,
    pub offset: u64,
}
impl Record {
    /// Marks an unused slot. Encodes to all-zero bytes, which is what a
    /// freshly sized index file already contains.
    pub const SENTINEL: Record = Record { digest: Digest::ZERO, offset: 0 };

    pub fn new(digest: Digest, offset: u64) -> Self {
        Self { digest, offset }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    /// Whether this is a real record for `digest`. Sentinels never match.
    pub fn matches(&self, digest: &Digest) -> bool {
        !self.is_sentinel() && self.digest == *digest
    }

    /// Compare against a search key, treating sentinels as larger than any
    /// digest.
    pub fn cmp_digest(&self, digest: &Digest) -> Ordering {
        if self.is_sentinel() { Ordering::Greater } else { self.digest.cmp(digest) }
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0; RECORD_SIZE];
        bytes[..DIGEST_SIZE].copy_from_slice(self.digest.as_bytes());
        bytes[DIGEST_SIZE..].copy_from_slice(&self.offset.to_ne_bytes());
        bytes
    }

    /// Decode a record from exactly [`RECORD_SIZE`] bytes.
    ///
    /// # Panics
    ///
    /// If `bytes` has the wrong length.
    pub fn decode(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), RECORD_SIZE, "record must be exactly {RECORD_SIZE} bytes");
        let mut digest = [0; DIGEST_SIZE];
        let mut offset = [0; size_of::<u64>()];
        digest.copy_from_slice(&bytes[..DIGEST_SIZE]);
        offset.copy_from_slice(&bytes[DIGEST_SIZE..]);
        Self { digest: Digest::from_bytes(digest), offset: u64::from_ne_bytes(offset) }
    }
}
impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        self.is_sentinel()
            .cmp(&other.is_sentinel())
            .then_with(|| self.digest.cmp(&other.digest))
            .then_with(|| self.offset.cmp(&other.offset))
    }
}
impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_block;

    fn digest(byte: u8) -> Digest {
        Digest::from_bytes([byte; DIGEST_SIZE])
    }

    #[test]
    fn test_record_size() {
        assert_eq!(RECORD_SIZE, 28);
    }

    #[test]
    fn test_encode_layout() {
        let record = Record::new(digest(0x11), 0x2000);
        let bytes = record.encode();
        assert_eq!(&bytes[..DIGEST_SIZE], &[0x11; DIGEST_SIZE]);
        assert_eq!(&bytes[DIGEST_SIZE..], &0x2000u64.to_ne_bytes());
        assert_eq!(Record::decode(&bytes), record);
    }

    #[test]
    fn test_sentinel_is_zeroed() {
        assert_eq!(Record::SENTINEL.encode(), [0; RECORD_SIZE]);
        assert!(Record::decode(&[0; RECORD_SIZE]).is_sentinel());
        assert!(!Record::new(hash_block(b""), 0).is_sentinel());
    }

    #[test]
    fn test_sentinel_sorts_last() {
        let max = Record::new(digest(0xFF), u64::MAX);
        assert!(max < Record::SENTINEL);
        assert_eq!(Record::SENTINEL.cmp(&Record::SENTINEL), Ordering::Equal);
        assert_eq!(Record::SENTINEL.cmp_digest(&digest(0xFF)), Ordering::Greater);
        assert!(!Record::SENTINEL.matches(&Digest::ZERO));
    }

    #[test]
    fn test_offset_breaks_ties() {
        let a = Record::new(digest(3), 8192);
        let b = Record::new(digest(3), 16384);
        let c = Record::new(digest(4), 0);
        assert!(a < b);
        assert!(b < c);
        assert!(a.matches(&digest(3)) && b.matches(&digest(3)));
        assert_eq!(a.cmp_digest(&digest(3)), Ordering::Equal);
        assert_eq!(a.cmp_digest(&digest(4)), Ordering::Less);
    }

    #[test]
    #[should_panic]
    fn test_decode_short_slice_panics() {
        Record::decode(&[1u8; 10]);
    }
}
