//! Error types for geopagedb.

use thiserror::Error;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
///
/// Callers that only care whether a failure came from storage, from a broken
/// tree invariant, or from bad input can match on this instead of every
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// I/O or malformed-record failure while reading or writing a page.
    Store,
    /// A tree invariant does not hold (missing parent, bad child count, ...).
    Structural,
    /// The caller passed something the index cannot accept.
    Usage,
}

/// All possible errors in geopagedb.
///
/// "Not found" is not an error: `delete` reports it by returning `false`.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes than requested could be read.
    #[error("short read at offset {offset}: wanted {wanted} bytes, {available} available")]
    ShortRead {
        offset: u64,
        wanted: usize,
        available: u64,
    },

    /// A node record or link block failed validation while decoding.
    #[error("malformed record at offset {offset}: {reason}")]
    MalformedRecord { offset: u64, reason: String },

    /// An offset or length does not fit the 32-bit on-disk address space.
    #[error("offset {0} exceeds the addressable store size")]
    OffsetOverflow(u64),

    /// Writing back an evicted node failed; the node is kept in the backlog.
    #[error("write-back of node at offset {offset} failed: {source}")]
    WriteBack {
        offset: u64,
        #[source]
        source: Box<Error>,
    },

    /// A tree invariant was violated.
    #[error("structural fault: {0}")]
    Structural(String),

    /// A region with NaN/infinite bounds or `min > max` on some axis.
    #[error("invalid region [{min_x}, {min_y}, {max_x}, {max_y}]")]
    InvalidRegion {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },

    /// Index options failed validation.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The store was written by an incompatible format or strategy.
    #[error("incompatible store: {0}")]
    IncompatibleStore(String),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> FaultKind {
        match self {
            Error::Io(_)
            | Error::ShortRead { .. }
            | Error::MalformedRecord { .. }
            | Error::OffsetOverflow(_)
            | Error::WriteBack { .. } => FaultKind::Store,
            Error::Structural(_) => FaultKind::Structural,
            Error::InvalidRegion { .. } | Error::InvalidOptions(_) | Error::IncompatibleStore(_) => {
                FaultKind::Usage
            }
        }
    }

    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            offset,
            reason: reason.into(),
        }
    }
}
