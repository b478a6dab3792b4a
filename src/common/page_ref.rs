//! Page reference type.

use std::fmt;

use crate::common::config::MAX_STORE_OFFSET;
use crate::common::{Error, Result};

/// A byte range in the store holding one node record or link block.
///
/// The offset is the node's identity for its whole life on disk; the length
/// is the size of the slot it was allocated, which can exceed the size of
/// the record currently stored in it.
///
/// # Example
/// ```
/// use geopagedb::PageRef;
///
/// let page = PageRef::new(64, 188);
/// assert_eq!(page.end(), 252);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageRef {
    pub offset: u64,
    pub length: u32,
}

impl PageRef {
    /// Create a new PageRef.
    #[inline]
    pub fn new(offset: u64, length: u32) -> Self {
        PageRef { offset, length }
    }

    /// First byte past the end of this range.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }

    /// Encode as the `(i32 offset, i32 length)` pair used on disk.
    pub(crate) fn to_link(self) -> Result<(i32, i32)> {
        if self.end() > MAX_STORE_OFFSET {
            return Err(Error::OffsetOverflow(self.end()));
        }
        Ok((self.offset as i32, self.length as i32))
    }

    /// Decode an on-disk `(offset, length)` pair. Negative values are rejected.
    pub(crate) fn from_link(offset: i32, length: i32) -> Option<Self> {
        if offset < 0 || length <= 0 {
            return None;
        }
        Some(PageRef::new(offset as u64, length as u32))
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({}+{})", self.offset, self.length)
    }
}
