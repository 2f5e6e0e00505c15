//! Device Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

/// A device error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for device operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Device or file does not exist
    #[display("device not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied (permissions)
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// File already exists (for operations that require new files)
    #[display("file already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// Attempted to write through a handle that was opened read-only
    #[display("device opened read-only: {}", _0.display())]
    ReadOnly(#[error(not(source))] PathBuf),
    /// Underlying I/O error (including failed mapping syscalls)
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
impl ErrorKind {
    pub(crate) fn from_io(err: IoError, path: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(std::io::ErrorKind::NotFound, "device not found: /dev/missing")]
    #[case(std::io::ErrorKind::PermissionDenied, "permission denied: /dev/missing")]
    #[case(std::io::ErrorKind::AlreadyExists, "file already exists: /dev/missing")]
    fn test_from_io(#[case] kind: std::io::ErrorKind, #[case] expected: &str) {
        let err = ErrorKind::from_io(IoError::from(kind), Path::new("/dev/missing"));
        assert_eq!(err.to_string(), expected);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_other_io_is_retryable() {
        let err = ErrorKind::from_io(IoError::other("mmap failed"), Path::new("/dev/sda"));
        assert!(matches!(err, ErrorKind::Io(_)));
        assert!(err.is_retryable());
    }
}
