//! Block sizes shared by the builder, the sorted index and the matcher.

use crate::error::{ErrorKind, Result};
use crate::record::RECORD_SIZE;

/// Default fine block size (8 KiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 8 * 1024;
/// Default storage block size of the index file (8 KiB).
pub const DEFAULT_INDEX_BLOCK_SIZE: u64 = 8 * 1024;

/// How a device is cut into fine blocks and how an index file is cut into
/// storage blocks.
///
/// Index files carry no header: the same geometry that built an index has to
/// be used to sort and query it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    block_size: u64,
    index_block_size: u64,
}
impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            index_block_size: DEFAULT_INDEX_BLOCK_SIZE,
        }
    }
}
impl Geometry {
    pub fn new(block_size: u64, index_block_size: u64) -> Result<Self> {
        if block_size == 0 {
            exn::bail!(ErrorKind::InvalidLayout("block size must be non-zero".to_string()));
        }
        if index_block_size < RECORD_SIZE as u64 {
            exn::bail!(ErrorKind::InvalidLayout(format!(
                "index block size {index_block_size} cannot hold a single {RECORD_SIZE} byte record"
            )));
        }
        Ok(Self { block_size, index_block_size })
    }

    /// Size of a fine (hashed) block in bytes.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Size of an index storage block in bytes.
    pub fn index_block_size(&self) -> u64 {
        self.index_block_size
    }

    pub fn entries_per_block(&self) -> usize {
        (self.index_block_size / RECORD_SIZE as u64) as usize
    }

    /// One record per fine block, the last one possibly short.
    pub fn record_count(&self, device_size: u64) -> u64 {
        device_size.div_ceil(self.block_size)
    }

    /// Storage blocks needed for `record_count` records. Never zero, so that
    /// even an empty device produces a well-formed index.
    pub fn index_blocks(&self, record_count: u64) -> u64 {
        record_count.div_ceil(self.entries_per_block() as u64).max(1)
    }

    /// Exact index file size for a device of `device_size` bytes.
    pub fn index_size(&self, device_size: u64) -> u64 {
        self.index_blocks(self.record_count(device_size)) * self.index_block_size
    }

    /// Storage block and slot of the `n`th record in scan order.
    pub fn flat_position(&self, n: u64) -> (u64, usize) {
        let entries = self.entries_per_block() as u64;
        (n / entries, (n % entries) as usize)
    }

    /// Byte offset of a slot within the index file.
    pub fn slot_offset(&self, block: u64, slot: usize) -> u64 {
        block * self.index_block_size + (slot * RECORD_SIZE) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_geometry() {
        let geometry = Geometry::default();
        assert_eq!(geometry.block_size(), 8192);
        assert_eq!(geometry.entries_per_block(), 292);
    }

    #[rstest]
    #[case(0, 8192)]
    #[case(8192, 27)]
    fn test_invalid_geometry(#[case] block_size: u64, #[case] index_block_size: u64) {
        let err = Geometry::new(block_size, index_block_size).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidLayout(_)));
    }

    #[rstest]
    #[case(0, 0, 1)]
    #[case(1, 1, 1)]
    #[case(8192, 1, 1)]
    #[case(8193, 2, 1)]
    #[case(292 * 8192, 292, 1)]
    #[case(292 * 8192 + 1, 293, 2)]
    fn test_counts(#[case] device_size: u64, #[case] records: u64, #[case] blocks: u64) {
        let geometry = Geometry::default();
        assert_eq!(geometry.record_count(device_size), records);
        assert_eq!(geometry.index_blocks(records), blocks);
        assert_eq!(geometry.index_size(device_size), blocks * 8192);
    }

    #[test]
    fn test_positions() {
        let geometry = Geometry::new(4096, 3 * RECORD_SIZE as u64 + 5).unwrap();
        assert_eq!(geometry.entries_per_block(), 3);
        assert_eq!(geometry.flat_position(0), (0, 0));
        assert_eq!(geometry.flat_position(4), (1, 1));
        // Trailing padding after the last whole record is skipped.
        assert_eq!(geometry.slot_offset(1, 1), 89 + 28);
    }
}
