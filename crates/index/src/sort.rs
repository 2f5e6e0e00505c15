//! In-place sorting of an index into B-tree order.
//!
//! Subtrees are sorted bottom-up. A leaf is sorted in memory. An internal
//! block's subtree is, in tree order, a sequence of already sorted runs:
//!
//! ```text
//! C0 s0 C1 s1 .. C(E-1) s(E-1) CE
//! ```
//!
//! where each `Ck` is a sorted child subtree and each `sk` is one of the
//! block's own records. Neighbouring runs are merged pairwise in rounds until
//! one run is left, addressed by tree-order rank.
//!
//! A merge whose shorter run fits in [`MERGE_BUFFER`] records copies that run
//! aside and merges linearly. Longer merges are split with a rotation-based
//! symmetric merge until the pieces fit. Records are read and written through
//! a small write-back cache of whole storage blocks, so a merge walking the
//! leaves touches each storage block (and each mapping window) in runs rather
//! than once per record.

use crate::cursor::Cursor;
use crate::error::Result;
use crate::file::IndexFile;
use crate::progress::Progress;
use crate::record::Record;
use crate::tree::TreeShape;
use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::instrument;

/// Longest run, in records, copied into memory for a linear merge (1.75 MiB).
pub const MERGE_BUFFER: u64 = 1 << 16;

/// What [`sort`] changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortSummary {
    /// Storage blocks visited.
    pub blocks: u64,
    /// Slot updates that replaced a record with a different one.
    pub writes: u64,
}

/// Sort `index` so that its tree-order traversal is non-decreasing.
///
/// Sorting an already sorted index performs no writes at all.
pub fn sort(index: &mut IndexFile, progress: &mut Progress) -> Result<SortSummary> {
    sort_with_buffer(index, progress, MERGE_BUFFER)
}

#[instrument(skip_all, fields(path = %index.path().display(), blocks = index.shape().blocks()))]
fn sort_with_buffer(index: &mut IndexFile, progress: &mut Progress, buffer: u64) -> Result<SortSummary> {
    let shape = index.shape();
    let mut summary = SortSummary::default();
    progress.start(shape.blocks(), "blocks");

    // Two rank streams per merge, each holding a leaf plus its ancestors.
    let capacity = NonZeroUsize::MIN.saturating_add(2 * shape.depth() + 3);
    let mut cache = BlockCache::new(index, capacity);
    // Post-order: (block, next child to descend into).
    let mut stack = vec![(0u64, 0usize)];
    while let Some(top) = stack.last_mut() {
        let (block, k) = *top;
        let child = (k <= shape.entries()).then(|| shape.child(block, k)).flatten();
        if let Some(child) = child {
            top.1 += 1;
            stack.push((child, 0));
            continue;
        }
        stack.pop();
        if shape.is_leaf(block) {
            cache.sort_block(block)?;
        } else {
            merge_subtree(&mut cache, block, buffer)?;
        }
        summary.blocks += 1;
        progress.advance(1);
    }
    summary.writes = cache.finish()?;
    index.flush()?;
    progress.finish();
    tracing::info!(blocks = summary.blocks, writes = summary.writes, "Index sorted");
    Ok(summary)
}

/// Merge the sorted runs making up the subtree of an internal block.
fn merge_subtree(cache: &mut BlockCache<'_>, block: u64, buffer: u64) -> Result<()> {
    let shape = cache.index.shape();
    let mut bounds = run_bounds(&shape, block);
    let mut view = SubtreeView { cache, shape, root: block, buffer, leaf: None };
    while bounds.len() > 2 {
        let mut merged = Vec::with_capacity(bounds.len() / 2 + 1);
        merged.push(bounds[0]);
        for pair in bounds[1..].chunks(2) {
            if let &[mid, end] = pair {
                view.merge(*merged.last().unwrap_or(&0), mid, end)?;
                merged.push(end);
            } else {
                merged.extend_from_slice(pair);
            }
        }
        bounds = merged;
    }
    Ok(())
}

/// Rank boundaries of the non-empty runs of `block`'s subtree, starting at 0
/// and ending at the subtree length.
fn run_bounds(shape: &TreeShape, block: u64) -> Vec<u64> {
    let entries = shape.entries();
    let mut bounds = Vec::with_capacity(2 * entries + 2);
    bounds.push(0);
    for slot in 0..entries {
        let rank = shape.slot_rank(block, slot);
        if rank > *bounds.last().unwrap_or(&0) {
            bounds.push(rank);
        }
        bounds.push(rank + 1);
    }
    let end = shape.subtree_len(block);
    if end > *bounds.last().unwrap_or(&0) {
        bounds.push(end);
    }
    bounds
}

struct CachedBlock {
    records: Vec<Record>,
    dirty: bool,
}

/// Write-back cache of whole storage blocks. Evicting the least recently used
/// block writes it back if it changed.
struct BlockCache<'a> {
    index: &'a mut IndexFile,
    blocks: LruCache<u64, CachedBlock>,
    writes: u64,
}
impl<'a> BlockCache<'a> {
    fn new(index: &'a mut IndexFile, capacity: NonZeroUsize) -> Self {
        Self { index, blocks: LruCache::new(capacity), writes: 0 }
    }

    fn entry(&mut self, block: u64) -> Result<&mut CachedBlock> {
        if !self.blocks.contains(&block) {
            let records = self.index.read_block(block)?;
            if let Some((evicted, cached)) = self.blocks.push(block, CachedBlock { records, dirty: false }) {
                write_back(self.index, evicted, &cached)?;
            }
        }
        Ok(self.blocks.get_mut(&block).expect("block cached above"))
    }

    fn get(&mut self, block: u64, slot: usize) -> Result<Record> {
        Ok(self.entry(block)?.records[slot])
    }

    fn set(&mut self, block: u64, slot: usize, record: Record) -> Result<()> {
        let cached = self.entry(block)?;
        let changed = cached.records[slot] != record;
        if changed {
            cached.records[slot] = record;
            cached.dirty = true;
        }
        self.writes += u64::from(changed);
        Ok(())
    }

    /// Sort the slots of one block among themselves.
    fn sort_block(&mut self, block: u64) -> Result<()> {
        let cached = self.entry(block)?;
        let mut sorted = cached.records.clone();
        sorted.sort_unstable();
        let changed = cached.records.iter().zip(&sorted).filter(|(before, after)| before != after).count() as u64;
        if changed > 0 {
            cached.records = sorted;
            cached.dirty = true;
        }
        self.writes += changed;
        Ok(())
    }

    /// Write back every dirty block in file order. Returns the write count.
    fn finish(mut self) -> Result<u64> {
        let mut remaining = Vec::with_capacity(self.blocks.len());
        while let Some(entry) = self.blocks.pop_lru() {
            remaining.push(entry);
        }
        remaining.sort_unstable_by_key(|(block, _)| *block);
        for (block, cached) in &remaining {
            write_back(self.index, *block, cached)?;
        }
        Ok(self.writes)
    }
}

fn write_back(index: &mut IndexFile, block: u64, cached: &CachedBlock) -> Result<()> {
    if cached.dirty { index.write_block(block, &cached.records) } else { Ok(()) }
}

/// The subtree of `root` seen as a flat array indexed by tree-order rank.
struct SubtreeView<'c, 'a> {
    cache: &'c mut BlockCache<'a>,
    shape: TreeShape,
    root: u64,
    buffer: u64,
    /// First rank and block number of the leaf located last. A leaf's slots
    /// have consecutive ranks.
    leaf: Option<(u64, u64)>,
}
impl SubtreeView<'_, '_> {
    fn locate(&mut self, rank: u64) -> (u64, usize) {
        if let Some((first, block)) = self.leaf
            && rank >= first
            && rank - first < self.shape.entries() as u64
        {
            return (block, (rank - first) as usize);
        }
        let (block, slot) = self.shape.locate(self.root, rank);
        if self.shape.is_leaf(block) {
            self.leaf = Some((rank - slot as u64, block));
        }
        (block, slot)
    }

    fn get(&mut self, rank: u64) -> Result<Record> {
        let (block, slot) = self.locate(rank);
        self.cache.get(block, slot)
    }

    fn set(&mut self, rank: u64, record: Record) -> Result<()> {
        let (block, slot) = self.locate(rank);
        self.cache.set(block, slot, record)
    }

    fn less(&mut self, i: u64, j: u64) -> Result<bool> {
        Ok(self.get(i)? < self.get(j)?)
    }

    fn swap(&mut self, i: u64, j: u64) -> Result<()> {
        let (a, b) = (self.get(i)?, self.get(j)?);
        if a != b {
            self.set(i, b)?;
            self.set(j, a)?;
        }
        Ok(())
    }

    fn swap_range(&mut self, a: u64, b: u64, n: u64) -> Result<()> {
        for i in 0..n {
            self.swap(a + i, b + i)?;
        }
        Ok(())
    }

    /// Exchange the blocks `a..m` and `m..b`.
    fn rotate(&mut self, a: u64, m: u64, b: u64) -> Result<()> {
        let (mut i, mut j) = (m - a, b - m);
        while i != j {
            if i > j {
                self.swap_range(m - i, m, j)?;
                i -= j;
            } else {
                self.swap_range(m - i, m + j - i, i)?;
                j -= i;
            }
        }
        self.swap_range(m - i, m, i)
    }

    fn run(&mut self, from: u64, to: u64) -> Result<Vec<Record>> {
        (from..to).map(|rank| self.get(rank)).collect()
    }

    /// Merge the sorted ranges `a..m` and `m..b` into one sorted range.
    ///
    /// Symmetric merge (Kim & Kutzner): split around the middle of the
    /// combined range, rotate the inner halves into place, then merge the
    /// two halves independently. Pieces whose shorter side fits the buffer
    /// are merged linearly instead.
    fn merge(&mut self, a: u64, m: u64, b: u64) -> Result<()> {
        let mut pending = vec![(a, m, b)];
        while let Some((a, m, b)) = pending.pop() {
            if a >= m || m >= b || !self.less(m, m - 1)? {
                continue;
            }
            if (m - a).min(b - m) <= self.buffer {
                self.merge_buffered(a, m, b)?;
                continue;
            }
            let mid = a + (b - a) / 2;
            let n = mid + m;
            let (mut start, mut r) = if m > mid { (n - b, mid) } else { (a, m) };
            let p = n - 1;
            while start < r {
                let c = start + (r - start) / 2;
                if !self.less(p - c, c)? {
                    start = c + 1;
                } else {
                    r = c;
                }
            }
            let end = n - start;
            if start < m && m < end {
                self.rotate(start, m, end)?;
            }
            pending.push((a, start, mid));
            pending.push((mid, end, b));
        }
        Ok(())
    }

    /// Copy the shorter of `a..m` and `m..b` aside and merge towards the far
    /// end of the other. Ties keep left records first.
    fn merge_buffered(&mut self, a: u64, m: u64, b: u64) -> Result<()> {
        if m - a <= b - m {
            let left = self.run(a, m)?;
            let (mut i, mut j) = (0, m);
            for k in a..b {
                if i == left.len() {
                    break;
                }
                let next = match (j < b).then(|| self.get(j)).transpose()? {
                    Some(right) if right < left[i] => {
                        j += 1;
                        right
                    },
                    _ => {
                        i += 1;
                        left[i - 1]
                    },
                };
                self.set(k, next)?;
            }
        } else {
            let right = self.run(m, b)?;
            let (mut i, mut j) = (right.len(), m);
            for k in (a..b).rev() {
                if i == 0 {
                    break;
                }
                let next = match (j > a).then(|| self.get(j - 1)).transpose()? {
                    Some(left) if left > right[i - 1] => {
                        j -= 1;
                        left
                    },
                    _ => {
                        i -= 1;
                        right[i]
                    },
                };
                self.set(k, next)?;
            }
        }
        Ok(())
    }
}

/// Whether the tree-order traversal of `index` is non-decreasing.
pub fn is_sorted(index: &mut IndexFile) -> Result<bool> {
    let mut previous: Option<Record> = None;
    for record in Cursor::first(index) {
        let record = record?;
        if previous.is_some_and(|previous| previous > record) {
            return Ok(false);
        }
        previous = Some(record);
    }
    Ok(true)
}
