//! CLI Error Types
//!
//! Every library error is raised into one of these kinds, keeping the
//! library's error tree underneath for the `{:?}` report printed on exit.

use derive_more::{Display, Error};

/// A CLI error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for CLI commands.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("could not open device")]
    Device,
    #[display("index error")]
    Index,
    #[display("matching failed")]
    Matcher,
    #[display("failed to write output")]
    Output,
}
