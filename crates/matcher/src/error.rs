//! Matcher Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A matcher error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for matcher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Querying the origin index failed.
    #[display("index lookup failed")]
    Index,
    /// Reading the cache device failed.
    #[display("cache device error")]
    Device,
    /// Cache block size, fine block size and window size don't fit together.
    #[display("invalid geometry: {_0}")]
    InvalidGeometry(#[error(not(source))] String),
    /// The consumer of match results failed (e.g. a closed pipe).
    #[display("failed to emit match results")]
    Output,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Index | Self::Device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(
            ErrorKind::InvalidGeometry("cache block size 0".to_string()).to_string(),
            "invalid geometry: cache block size 0"
        );
        assert_eq!(ErrorKind::Device.to_string(), "cache device error");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Device.is_retryable());
        assert!(!ErrorKind::InvalidGeometry(String::new()).is_retryable());
        assert!(!ErrorKind::Output.is_retryable());
    }
}
