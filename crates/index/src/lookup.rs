//! One query contract over both lookup strategies.

use crate::error::{ErrorKind, Result};
use crate::file::IndexFile;
use crate::hash::Digest;
use crate::memory::MemoryIndex;
use crate::progress::Progress;
use crate::sorted::SortedIndex;
use tracing::instrument;

/// Default largest index file loaded into memory (256 MiB).
pub const DEFAULT_MEMORY_LIMIT: u64 = 256 * 1024 * 1024;

/// Resolves a digest to the origin offsets that hashed to it.
pub trait Lookup {
    /// Append every offset recorded for `digest` to `offsets`, ascending.
    fn lookup(&mut self, digest: &Digest, offsets: &mut Vec<u64>) -> Result<()>;
}

impl Lookup for MemoryIndex {
    fn lookup(&mut self, digest: &Digest, offsets: &mut Vec<u64>) -> Result<()> {
        offsets.extend_from_slice(self.get(digest));
        Ok(())
    }
}

impl Lookup for SortedIndex {
    fn lookup(&mut self, digest: &Digest, offsets: &mut Vec<u64>) -> Result<()> {
        self.find(digest, offsets)
    }
}

/// Whichever strategy suits the size of the index.
pub enum Index {
    Memory(MemoryIndex),
    Sorted(SortedIndex),
}
impl Index {
    /// Load `file` into memory if it is no larger than `memory_limit` bytes.
    /// Otherwise query it on disk, which requires it to be sorted: fails with
    /// [`Unsorted`](ErrorKind::Unsorted) if it isn't.
    #[instrument(skip(file, progress), fields(path = %file.path().display(), size = file.size()))]
    pub fn open(mut file: IndexFile, memory_limit: u64, progress: &mut Progress) -> Result<Self> {
        if file.size() <= memory_limit {
            tracing::info!("Loading index into memory");
            return MemoryIndex::load(&mut file, progress).map(Self::Memory);
        }
        tracing::info!("Index exceeds memory limit; checking it is sorted");
        let mut sorted = SortedIndex::from(file);
        if !sorted.verify(progress)?.sorted {
            exn::bail!(ErrorKind::Unsorted);
        }
        Ok(Self::Sorted(sorted))
    }
}
impl Lookup for Index {
    fn lookup(&mut self, digest: &Digest, offsets: &mut Vec<u64>) -> Result<()> {
        match self {
            Self::Memory(index) => index.lookup(digest, offsets),
            Self::Sorted(index) => index.lookup(digest, offsets),
        }
    }
}
impl<L: Lookup + ?Sized> Lookup for &mut L {
    fn lookup(&mut self, digest: &Digest, offsets: &mut Vec<u64>) -> Result<()> {
        (**self).lookup(digest, offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::hash::hash_block;
    use crate::record::{RECORD_SIZE, Record};
    use crate::sort::sort;
    use cachemap_device::Device;
    use rstest::rstest;

    /// An unsorted index of five blocks where "a" appears twice.
    fn index_file(dir: &tempfile::TempDir) -> IndexFile {
        let geometry = Geometry::new(512, 2 * RECORD_SIZE as u64).unwrap();
        let device = Device::create(dir.path().join("index"), 5 * geometry.index_block_size()).unwrap();
        let mut file = IndexFile::from_device(device, geometry).unwrap();
        for (n, content) in [&b"a"[..], b"b", b"c", b"a", b"d"].into_iter().enumerate() {
            let (block, slot) = geometry.flat_position(n as u64);
            file.set_record(block, slot, &Record::new(hash_block(content), n as u64 * 512)).unwrap();
        }
        file
    }

    #[rstest]
    #[case::memory(u64::MAX, true)]
    #[case::sorted(0, false)]
    fn test_strategies_agree(#[case] memory_limit: u64, #[case] memory: bool) {
        let dir = tempfile::tempdir().unwrap();
        let mut file = index_file(&dir);
        sort(&mut file, &mut Progress::hidden()).unwrap();
        let mut index = Index::open(file, memory_limit, &mut Progress::hidden()).unwrap();
        assert_eq!(matches!(index, Index::Memory(_)), memory);

        let mut offsets = Vec::new();
        index.lookup(&hash_block(b"a"), &mut offsets).unwrap();
        assert_eq!(offsets, vec![0, 1536]);
        offsets.clear();
        index.lookup(&hash_block(b"d"), &mut offsets).unwrap();
        assert_eq!(offsets, vec![2048]);
        offsets.clear();
        index.lookup(&hash_block(b"zzz"), &mut offsets).unwrap();
        assert!(offsets.is_empty());
    }

    #[test]
    fn test_unsorted_small_index_loads() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::open(index_file(&dir), u64::MAX, &mut Progress::hidden()).unwrap();
        let mut offsets = Vec::new();
        index.lookup(&hash_block(b"c"), &mut offsets).unwrap();
        assert_eq!(offsets, vec![1024]);
    }

    #[test]
    fn test_unsorted_large_index_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Index::open(index_file(&dir), 0, &mut Progress::hidden()).err().unwrap();
        assert_eq!(*err, ErrorKind::Unsorted);
        assert!(err.to_string().contains("run `sort`"));
    }
}
