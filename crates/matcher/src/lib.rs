//! Content-based matching of cache blocks to origin blocks.
//!
//! Every fine sub-block of a cache block is hashed and looked up in the origin
//! index. A hit only counts as support for an origin cache block if the origin
//! fine block sits at the same position within its cache-block-sized unit as
//! the sub-block does within the cache block; anything else is a digest
//! collision (a "fake match") and only counted for diagnostics. A genuine copy
//! is positionally consistent across all of its sub-blocks, so even a weak or
//! frequently colliding digest gives an unambiguous top candidate.

pub mod error;

use crate::error::{ErrorKind, Result};
use cachemap_device::Device;
use cachemap_index::{Geometry, Lookup, Progress, hash_block};
use exn::ResultExt;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::instrument;

/// One origin cache block that a cache block may be a copy of.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchCandidate {
    pub origin_cache_block: u64,
    /// Sub-blocks that matched at the right position.
    pub support: u64,
    /// `support` as a fraction of the sub-blocks per cache block.
    pub ratio: f64,
}

/// The result of matching one cache block.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockMatch {
    pub cache_block: u64,
    /// Best first: support descending, then origin cache block ascending.
    pub candidates: Vec<MatchCandidate>,
    pub fake_matches: u64,
}
impl BlockMatch {
    pub fn best(&self) -> Option<&MatchCandidate> {
        self.candidates.first()
    }

    pub fn is_match(&self) -> bool {
        self.best().is_some()
    }
}
impl Display for BlockMatch {
    /// One line per candidate, alternates commented out, followed by the fake
    /// match count if there were any.
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut first = true;
        let mut line = |f: &mut Formatter<'_>| -> FmtResult {
            if std::mem::replace(&mut first, false) { Ok(()) } else { writeln!(f) }
        };
        for (n, candidate) in self.candidates.iter().enumerate() {
            line(f)?;
            write!(
                f,
                "{}{} -> {} ({:.2}% match)",
                if n == 0 { "" } else { "# " },
                self.cache_block,
                candidate.origin_cache_block,
                candidate.ratio * 100.0,
            )?;
        }
        if self.candidates.is_empty() {
            line(f)?;
            write!(f, "# no match found for cache block {}", self.cache_block)?;
        }
        if self.fake_matches != 0 {
            line(f)?;
            write!(f, "# {} fake matches", self.fake_matches)?;
        }
        Ok(())
    }
}

/// Totals over a whole cache device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub cache_blocks: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub fake_matches: u64,
}

/// Matches cache blocks against an origin index.
pub struct Matcher<L> {
    lookup: L,
    geometry: Geometry,
    cache_block_size: u64,
    offsets: Vec<u64>,
}
impl<L: Lookup> Matcher<L> {
    /// `cache_block_size` is in bytes and must be a non-zero multiple of the
    /// index's fine block size.
    pub fn new(lookup: L, geometry: Geometry, cache_block_size: u64) -> Result<Self> {
        let block_size = geometry.block_size();
        if cache_block_size == 0 || cache_block_size % block_size != 0 {
            exn::bail!(ErrorKind::InvalidGeometry(format!(
                "cache block size {cache_block_size} is not a positive multiple of the {block_size} byte block size"
            )));
        }
        Ok(Self { lookup, geometry, cache_block_size, offsets: Vec::new() })
    }

    pub fn cache_block_size(&self) -> u64 {
        self.cache_block_size
    }

    pub fn blocks_per_cache_block(&self) -> u64 {
        self.cache_block_size / self.geometry.block_size()
    }

    /// Whole cache blocks on `cache`; a trailing partial cache block is never
    /// matched.
    pub fn cache_blocks(&self, cache: &Device) -> u64 {
        cache.size() / self.cache_block_size
    }

    /// Score every candidate origin cache block for one cache block.
    ///
    /// # Panics
    ///
    /// If `cache_block` is not below [`cache_blocks`](Self::cache_blocks).
    pub fn match_block(&mut self, cache: &mut Device, cache_block: u64) -> Result<BlockMatch> {
        self.check_window(cache)?;
        let block_size = self.geometry.block_size();
        let per_cache_block = self.blocks_per_cache_block();
        let mut support: BTreeMap<u64, u64> = BTreeMap::new();
        let mut fake_matches = 0;

        for position in 0..per_cache_block {
            let offset = cache_block * self.cache_block_size + position * block_size;
            let digest = hash_block(cache.read(offset, block_size as usize).or_raise(|| ErrorKind::Device)?);
            self.offsets.clear();
            self.lookup.lookup(&digest, &mut self.offsets).or_raise(|| ErrorKind::Index)?;
            for origin in &self.offsets {
                if (origin / block_size) % per_cache_block == position {
                    *support.entry(origin / self.cache_block_size).or_default() += 1;
                } else {
                    fake_matches += 1;
                }
            }
        }

        let mut candidates: Vec<MatchCandidate> = support
            .into_iter()
            .map(|(origin_cache_block, support)| MatchCandidate {
                origin_cache_block,
                support,
                ratio: support as f64 / per_cache_block as f64,
            })
            .collect();
        // Stable on the ascending origin order the map yields.
        candidates.sort_by(|a, b| b.support.cmp(&a.support));
        Ok(BlockMatch { cache_block, candidates, fake_matches })
    }

    /// Match every whole cache block of `cache` in order, handing each result
    /// to `emit` as soon as it is known.
    #[instrument(skip_all, fields(cache = %cache.path().display(), cache_block_size = self.cache_block_size))]
    pub fn run(
        &mut self,
        cache: &mut Device,
        progress: &mut Progress,
        mut emit: impl FnMut(&BlockMatch) -> std::io::Result<()>,
    ) -> Result<MatchSummary> {
        self.check_window(cache)?;
        let total = self.cache_blocks(cache);
        if cache.size() % self.cache_block_size != 0 {
            tracing::warn!(
                trailing = cache.size() % self.cache_block_size,
                "Ignoring partial cache block at end of device"
            );
        }
        let mut summary = MatchSummary { cache_blocks: total, ..MatchSummary::default() };
        progress.start(total, "blocks");
        for cache_block in 0..total {
            progress.boundary(cache_block);
            let result = self.match_block(cache, cache_block)?;
            if result.is_match() {
                summary.matched += 1;
            } else {
                summary.unmatched += 1;
            }
            summary.fake_matches += result.fake_matches;
            emit(&result).or_raise(|| ErrorKind::Output)?;
        }
        progress.finish();
        tracing::info!(
            matched = summary.matched,
            unmatched = summary.unmatched,
            fake_matches = summary.fake_matches,
            "Matching complete"
        );
        Ok(summary)
    }

    /// Sub-block reads must never straddle two mapping windows.
    fn check_window(&self, cache: &Device) -> Result<()> {
        let block_size = self.geometry.block_size();
        if cache.window_size() % block_size != 0 {
            exn::bail!(ErrorKind::InvalidGeometry(format!(
                "window size {} is not a multiple of the {block_size} byte block size",
                cache.window_size()
            )));
        }
        Ok(())
    }
}
