//! Custom error types for the pst-reader crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
///
/// Variants fall into four groups:
/// - format errors (corrupt or truncated structures) are fatal to the record
///   or stream being decoded, never to the whole file;
/// - index errors (an id that resolves to nothing) are fatal to one lookup;
/// - unsupported constructs are reported explicitly instead of being mis-parsed;
/// - encoding errors are caught by the typed accessors and downgraded to a warning.
#[derive(Debug, Error)]
pub enum PstError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The file header declares a format version this crate does not know.
    #[error("Unsupported file variant: wVer={0}")]
    UnsupportedVariant(u16),

    /// The file is structurally invalid.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A signature byte or magic value did not match.
    #[error("Bad signature in {context}: expected {expected:#x}, found {found:#x}")]
    BadSignature {
        context: &'static str,
        expected: u32,
        found: u32,
    },

    /// A buffer or data block has an unexpected size after an operation.
    #[error("Size mismatch for {context}: expected {expected} bytes, but found {found} bytes")]
    SizeMismatch {
        context: &'static str,
        expected: u64,
        found: u64,
    },

    /// A read ran past the end of its source.
    #[error("Truncated read at offset {offset}: wanted {wanted} bytes, {available} available")]
    Truncated {
        offset: u64,
        wanted: u64,
        available: u64,
    },

    /// An error occurred during decompression.
    #[error("Decompression failed: {0}")]
    DecompressionError(String),

    /// No node with this id exists in the node B-tree or sub-node tree.
    #[error("Node {0:#x} not found")]
    NodeNotFound(u32),

    /// No block with this id exists in the block B-tree.
    #[error("Block {0:#x} not found")]
    BlockNotFound(u64),

    /// A heap id points outside the heap's allocations.
    #[error("Heap id {0:#x} not found")]
    HeapIdNotFound(u32),

    /// A table row id or row index does not exist.
    #[error("Row {0:#x} not found")]
    RowNotFound(u32),

    /// The structure is well-formed but uses a construct this reader rejects.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Text could not be decoded (unknown codepage, malformed UTF-16).
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A mutex lock was poisoned, indicating a panic in another thread holding the lock.
    #[error("A mutex lock was poisoned, indicating a panic in another thread holding the lock.")]
    LockPoisoned,
}

impl PstError {
    /// Returns `true` when the error only invalidates the record being decoded.
    ///
    /// Callers walking a whole archive skip such records and carry on. I/O
    /// failures and poisoned locks affect every subsequent read and are not
    /// recoverable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PstError::Io(_) | PstError::LockPoisoned)
    }
}

/// A convenience `Result` type alias using the crate's `PstError` type.
pub type Result<T> = std::result::Result<T, PstError>;
