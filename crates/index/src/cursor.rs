//! In-order traversal of the implicit tree without recursion.

use crate::error::Result;
use crate::file::IndexFile;
use crate::hash::Digest;
use crate::record::Record;
use crate::tree::TreeShape;
use std::cmp::Ordering;

/// One level of the traversal: having descended into child `slot` of `block`,
/// the next record of this block to visit is `slot`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Frame {
    block: u64,
    slot: usize,
}

/// Walks the records of an index in tree order (the sorted order, once the
/// index has been sorted). Holds one frame per tree level.
pub struct Cursor<'a> {
    file: &'a mut IndexFile,
    shape: TreeShape,
    stack: Vec<Frame>,
}
impl<'a> Cursor<'a> {
    /// Positioned on the first record in tree order.
    pub fn first(file: &'a mut IndexFile) -> Self {
        let shape = file.shape();
        let mut cursor = Self { file, shape, stack: Vec::with_capacity(shape.depth()) };
        if !shape.is_empty() {
            cursor.descend_leftmost(0);
        }
        cursor
    }

    /// Positioned on the first record whose digest is not less than `digest`
    /// (sentinels compare greater than everything). Only meaningful on a
    /// sorted index.
    pub fn lower_bound(file: &'a mut IndexFile, digest: &Digest) -> Result<Self> {
        let shape = file.shape();
        let mut cursor = Self { file, shape, stack: Vec::with_capacity(shape.depth()) };
        let mut block = Some(0).filter(|_| !shape.is_empty());
        while let Some(current) = block {
            let slot = cursor.partition_point(current, digest)?;
            cursor.stack.push(Frame { block: current, slot });
            block = shape.child(current, slot);
        }
        cursor.settle();
        Ok(cursor)
    }

    /// The record under the cursor, without moving.
    pub fn peek(&mut self) -> Result<Option<Record>> {
        match self.location() {
            Some((block, slot)) => self.file.record(block, slot).map(Some),
            None => Ok(None),
        }
    }

    /// Move to the next record in tree order.
    pub fn advance(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            top.slot += 1;
            let (block, slot) = (top.block, top.slot);
            if let Some(child) = self.shape.child(block, slot) {
                self.descend_leftmost(child);
            }
        }
        self.settle();
    }

    /// Block and slot of the record the cursor is on.
    fn location(&self) -> Option<(u64, usize)> {
        self.stack.last().map(|frame| (frame.block, frame.slot))
    }

    /// First slot of `block` whose record is not less than `digest`.
    fn partition_point(&mut self, block: u64, digest: &Digest) -> Result<usize> {
        let (mut lo, mut hi) = (0, self.shape.entries());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.file.record(block, mid)?.cmp_digest(digest) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    fn descend_leftmost(&mut self, block: u64) {
        let mut block = Some(block);
        while let Some(current) = block {
            self.stack.push(Frame { block: current, slot: 0 });
            block = self.shape.child(current, 0);
        }
    }

    /// Drop frames whose block has no records left to visit.
    fn settle(&mut self) {
        while self.stack.last().is_some_and(|frame| frame.slot >= self.shape.entries()) {
            self.stack.pop();
        }
    }
}
impl Iterator for Cursor<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.peek().transpose()?;
        match record {
            Ok(_) => self.advance(),
            Err(_) => self.stack.clear(),
        }
        Some(record)
    }
}
