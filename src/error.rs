use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the heap and index layers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A resource with the same name is already present.
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// The named resource is absent.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// A row or page index beyond the stored bounds.
    #[error("{what} index {index} out of range")]
    OutOfRange {
        /// Kind of position that was out of range ("row" or "page").
        what: &'static str,
        /// The offending index.
        index: usize,
    },
    /// The row cannot fit in an empty page.
    #[error("row of {0} bytes cannot fit in an empty page")]
    RowTooLarge(usize),
    /// Unique-index insert collision.
    #[error("key already exists in index {0}")]
    DuplicateKey(String),
    /// Structural invariant violated on read.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// Caller-supplied argument outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
