//! Content-addressed index of the fine blocks of an origin device.
//!
//! An index is a flat file of fixed-size storage blocks, each holding as many
//! 28 byte [`Record`]s as fit. [`collect`] writes one record per fine block of
//! the origin in scan order; [`sort`] rearranges them in place into an
//! implicit B-tree so that a digest can be found by descending from the root
//! without loading the file. Small indexes can instead be loaded whole into a
//! [`MemoryIndex`]. Both answer queries through the [`Lookup`] trait.
//!
//! ```no_run
//! use cachemap_device::{Device, Mode};
//! use cachemap_index::error::ErrorKind;
//! use cachemap_index::{Geometry, IndexFile, Progress, collect, sort};
//! use exn::ResultExt;
//!
//! # fn example() -> cachemap_index::error::Result<()> {
//! let geometry = Geometry::default();
//! let mut origin = Device::open("/dev/mapper/origin", Mode::ReadOnly).or_raise(|| ErrorKind::Device)?;
//! collect(&mut origin, "origin.idx".as_ref(), &geometry, &mut Progress::stderr())?;
//! let mut index = IndexFile::open("origin.idx", geometry, Mode::ReadWrite)?;
//! sort(&mut index, &mut Progress::stderr())?;
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod cursor;
pub mod error;
pub mod file;
pub mod geometry;
pub mod hash;
pub mod lookup;
pub mod memory;
pub mod progress;
pub mod record;
pub mod sort;
pub mod sorted;
pub mod tree;

pub use crate::build::{BuildSummary, collect};
pub use crate::cursor::Cursor;
pub use crate::file::IndexFile;
pub use crate::geometry::{DEFAULT_BLOCK_SIZE, DEFAULT_INDEX_BLOCK_SIZE, Geometry};
pub use crate::hash::{DIGEST_SIZE, Digest, hash_block};
pub use crate::lookup::{DEFAULT_MEMORY_LIMIT, Index, Lookup};
pub use crate::memory::MemoryIndex;
pub use crate::progress::Progress;
pub use crate::record::{RECORD_SIZE, Record};
pub use crate::sort::{SortSummary, is_sorted, sort};
pub use crate::sorted::{IndexReport, SortedIndex};
pub use crate::tree::TreeShape;
