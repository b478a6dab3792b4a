//! Storage layer - byte channels and the node page format.
//!
//! This module handles persistent storage:
//! - [`Channel`] - Random-access byte store (file or memory)
//! - [`PageCodec`] - Binary encoding of node records and child links
//! - [`PageStore`] - Slot allocation with a free-page stack
//! - [`IndexHeader`] - File header with root, counters and checksum

mod channel;
mod header;
mod page_codec;
mod page_store;

pub use channel::{Channel, FileChannel, MemoryChannel};
pub use header::IndexHeader;
pub use page_codec::{ByteOrder, PageCodec};
pub use page_store::{FreePageStack, PageStore};
