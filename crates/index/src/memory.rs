//! In-memory multimap for indexes small enough to load whole.

use crate::error::{ErrorKind, Result};
use crate::file::IndexFile;
use crate::hash::Digest;
use crate::progress::Progress;
use std::collections::HashMap;
use tracing::instrument;

/// Every record of an index, loaded by one sequential pass. Works on sorted
/// and unsorted indexes alike.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    offsets: HashMap<Digest, Vec<u64>>,
    records: u64,
}
impl MemoryIndex {
    #[instrument(skip_all, fields(path = %file.path().display(), size = file.size()))]
    pub fn load(file: &mut IndexFile, progress: &mut Progress) -> Result<Self> {
        let block_size = file.geometry().block_size();
        let blocks = file.shape().blocks();
        let mut index = Self::default();
        progress.start(blocks, "blocks");
        for block in 0..blocks {
            for record in file.read_block(block)? {
                if record.is_sentinel() {
                    continue;
                }
                if record.offset % block_size != 0 {
                    exn::bail!(ErrorKind::Misaligned { offset: record.offset, block_size });
                }
                index.insert(record.digest, record.offset);
            }
            progress.advance(1);
        }
        // Storage block order is only scan order for an unsorted index.
        index.offsets.values_mut().for_each(|offsets| offsets.sort_unstable());
        progress.finish();
        tracing::debug!(records = index.records, digests = index.offsets.len(), "Loaded index into memory");
        Ok(index)
    }

    fn insert(&mut self, digest: Digest, offset: u64) {
        self.offsets.entry(digest).or_default().push(offset);
        self.records += 1;
    }

    /// Offsets recorded for `digest`, ascending.
    pub fn get(&self, digest: &Digest) -> &[u64] {
        match self.offsets.get(digest) {
            Some(offsets) => offsets,
            None => &[],
        }
    }

    /// Number of real records loaded.
    pub fn len(&self) -> u64 {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}
