//! Disk-resident lookups on a sorted index.

use crate::cursor::Cursor;
use crate::error::{ErrorKind, Result};
use crate::file::IndexFile;
use crate::hash::Digest;
use crate::progress::Progress;
use crate::record::Record;
use tracing::instrument;

/// What [`SortedIndex::verify`] found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexReport {
    pub blocks: u64,
    pub records: u64,
    pub sentinels: u64,
    /// Whether tree-order traversal is non-decreasing.
    pub sorted: bool,
}

/// A sorted index queried by descending the tree, touching one storage block
/// per level.
pub struct SortedIndex {
    file: IndexFile,
}
impl SortedIndex {
    /// Cursor on the first record whose digest is not less than `digest`.
    pub fn lower_bound(&mut self, digest: &Digest) -> Result<Cursor<'_>> {
        Cursor::lower_bound(&mut self.file, digest)
    }

    /// Append the origin offset of every record with `digest` to `offsets`, in
    /// ascending order.
    pub fn find(&mut self, digest: &Digest, offsets: &mut Vec<u64>) -> Result<()> {
        for record in self.lower_bound(digest)? {
            let record = record?;
            if !record.matches(digest) {
                break;
            }
            offsets.push(record.offset);
        }
        Ok(())
    }

    /// All records in tree order.
    pub fn records(&mut self) -> Cursor<'_> {
        Cursor::first(&mut self.file)
    }

    /// Walk the whole index, checking that every record is aligned to the fine
    /// block size and whether the traversal is ordered.
    ///
    /// A misaligned record is fatal: it means the index is corrupt or was
    /// built with another geometry.
    #[instrument(skip_all, fields(path = %self.file.path().display()))]
    pub fn verify(&mut self, progress: &mut Progress) -> Result<IndexReport> {
        let block_size = self.file.geometry().block_size();
        let shape = self.file.shape();
        let mut report = IndexReport { blocks: shape.blocks(), records: 0, sentinels: 0, sorted: true };
        let mut previous: Option<Record> = None;
        progress.start(shape.len(), "records");
        for record in self.records() {
            let record = record?;
            if record.is_sentinel() {
                report.sentinels += 1;
            } else {
                if record.offset % block_size != 0 {
                    exn::bail!(ErrorKind::Misaligned { offset: record.offset, block_size });
                }
                report.records += 1;
            }
            if report.sorted && previous.is_some_and(|previous| previous > record) {
                tracing::debug!(rank = report.records + report.sentinels - 1, "Index is out of order");
                report.sorted = false;
            }
            previous = Some(record);
            progress.advance(1);
        }
        progress.finish();
        Ok(report)
    }
}
impl From<IndexFile> for SortedIndex {
    fn from(file: IndexFile) -> Self {
        Self { file }
    }
}
