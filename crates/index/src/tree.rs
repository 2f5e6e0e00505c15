//! Implicit B-tree arithmetic.
//!
//! Storage blocks are numbered in level order and never hold pointers: block
//! `i` has `entries + 1` children at `(entries + 1) * i + k + 1`. Because
//! numbering is level order, the tree is complete (filled left to right) and
//! the descendants of any contiguous run of siblings form a contiguous run on
//! every lower level, so subtree sizes are computed level by level instead of
//! by walking blocks.
//!
//! In-order sequence of the subtree at block `b` (`E` entries per block):
//!
//! ```text
//! child(b, 0) .. slot 0 .. child(b, 1) .. slot 1 .. slot E-1 .. child(b, E)
//! ```

/// Shape of an index: records per block and number of blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeShape {
    entries: u64,
    blocks: u64,
}
impl TreeShape {
    pub fn new(entries_per_block: usize, block_count: u64) -> Self {
        assert!(entries_per_block > 0, "a block must hold at least one record");
        Self { entries: entries_per_block as u64, blocks: block_count }
    }

    pub fn entries(&self) -> usize {
        self.entries as usize
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Children per block.
    pub fn fanout(&self) -> u64 {
        self.entries + 1
    }

    /// Total number of slots, sentinels included.
    pub fn len(&self) -> u64 {
        self.blocks * self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.blocks == 0
    }

    /// The `k`th child of `block`, if it exists.
    pub fn child(&self, block: u64, k: usize) -> Option<u64> {
        debug_assert!(k as u64 <= self.entries);
        self.fanout()
            .checked_mul(block)
            .and_then(|first| first.checked_add(k as u64 + 1))
            .filter(|child| *child < self.blocks)
    }

    pub fn is_leaf(&self, block: u64) -> bool {
        self.child(block, 0).is_none()
    }

    /// Number of existing blocks in the subtrees rooted at the sibling run
    /// `lo..=hi`.
    pub fn range_blocks(&self, lo: u64, hi: u64) -> u64 {
        let fanout = self.fanout();
        let (mut lo, mut hi) = (lo, hi);
        let mut total = 0;
        while lo < self.blocks && lo <= hi {
            total += hi.min(self.blocks - 1) - lo + 1;
            lo = lo.saturating_mul(fanout).saturating_add(1);
            hi = hi.saturating_mul(fanout).saturating_add(fanout);
        }
        total
    }

    pub fn subtree_blocks(&self, block: u64) -> u64 {
        self.range_blocks(block, block)
    }

    /// Number of slots in the subtree rooted at `block`.
    pub fn subtree_len(&self, block: u64) -> u64 {
        self.subtree_blocks(block) * self.entries
    }

    /// Slots in the subtrees of the first `k` children of `block`.
    pub fn children_len(&self, block: u64, k: usize) -> u64 {
        match (k, self.child(block, 0)) {
            (0, _) | (_, None) => 0,
            (k, Some(first)) => self.range_blocks(first, first + k as u64 - 1) * self.entries,
        }
    }

    /// In-order rank of `slot` within the subtree rooted at `block`.
    pub fn slot_rank(&self, block: u64, slot: usize) -> u64 {
        self.children_len(block, slot + 1) + slot as u64
    }

    /// Number of levels.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut block = Some(0).filter(|_| self.blocks > 0);
        while let Some(current) = block {
            depth += 1;
            block = self.child(current, 0);
        }
        depth
    }

    /// Map an in-order rank within the subtree rooted at `root` to the block
    /// and slot holding it.
    ///
    /// # Panics
    ///
    /// If `rank` is not below [`subtree_len(root)`](Self::subtree_len).
    pub fn locate(&self, root: u64, rank: u64) -> (u64, usize) {
        assert!(rank < self.subtree_len(root), "rank {rank} out of range for subtree {root}");
        let (mut block, mut rank) = (root, rank);
        loop {
            // First slot whose rank is >= the target.
            let (mut lo, mut hi) = (0, self.entries());
            while lo < hi {
                let mid = (lo + hi) / 2;
                if self.slot_rank(block, mid) < rank {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            if lo < self.entries() && self.slot_rank(block, lo) == rank {
                return (block, lo);
            }
            // Otherwise the rank falls inside the child just left of slot `lo`.
            rank -= self.children_len(block, lo) + lo as u64;
            block = match self.child(block, lo) {
                Some(child) => child,
                None => unreachable!("rank within subtree bounds always resolves to a slot"),
            };
        }
    }
}
