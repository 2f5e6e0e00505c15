//! Index Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Device failures are raised as
//! [`ErrorKind::Device`] with the device crate's error kept as a child frame.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An index error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reading or writing the origin device or index file failed.
    #[display("device error")]
    Device,
    /// Refusing to overwrite an existing index. Pick another path or delete it.
    #[display("index already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// A record points somewhere that isn't a fine block boundary; the index
    /// is corrupt or was built with a different block size.
    #[display("offset {offset} is not a multiple of the block size {block_size}")]
    Misaligned { offset: u64, block_size: u64 },
    /// Block sizes, window size or file size don't fit together.
    #[display("invalid index layout: {_0}")]
    InvalidLayout(#[error(not(source))] String),
    /// The disk-resident lookup needs a sorted index. Run `sort` first, or
    /// raise the memory limit so the index is loaded into memory instead.
    #[display("index is too large to load into memory and is not sorted; run `sort` on it or raise the memory limit")]
    Unsorted,
    /// Temporary file handling failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Device | Self::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exn::ResultExt;

    #[test]
    fn error_kind_display() {
        assert_eq!(
            ErrorKind::Misaligned { offset: 100, block_size: 8192 }.to_string(),
            "offset 100 is not a multiple of the block size 8192"
        );
        assert_eq!(
            ErrorKind::Unsorted.to_string(),
            "index is too large to load into memory and is not sorted; run `sort` on it or raise the memory limit"
        );
        assert_eq!(
            ErrorKind::AlreadyExists(PathBuf::from("/tmp/origin.idx")).to_string(),
            "index already exists: /tmp/origin.idx"
        );
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Device.is_retryable());
        assert!(!ErrorKind::Unsorted.is_retryable());
        assert!(!ErrorKind::Misaligned { offset: 1, block_size: 2 }.is_retryable());
    }

    #[test]
    fn error_from_io_result() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::other("disk on fire"));
        let err: Result<()> = result.or_raise(|| ErrorKind::Io);
        assert_eq!(*err.unwrap_err(), ErrorKind::Io);
    }
}
