//! Page Store - slot allocation and node I/O over a [`Channel`].
//!
//! The [`PageStore`] owns the channel and handles:
//! - Allocating byte ranges for node records and child-link blocks
//! - Reclaiming ranges through a LIFO free-page stack
//! - Reading and writing node records and links via [`PageCodec`]

use log::debug;

use crate::buffer::WriteBack;
use crate::common::config::{HEADER_SIZE, LINK_SIZE, MAX_STORE_OFFSET};
use crate::common::{Error, PageRef, Result};
use crate::index::Node;
use crate::storage::{ByteOrder, Channel, IndexHeader, PageCodec};

/// LIFO stack of reclaimed byte ranges.
///
/// A range is pushed only after whatever occupied it is unreachable from the
/// tree and gone from the node cache.
#[derive(Debug, Default, Clone)]
pub struct FreePageStack {
    ranges: Vec<PageRef>,
}

impl FreePageStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, range: PageRef) {
        self.ranges.push(range);
    }

    /// Take `size` bytes from the most recently freed range that is large
    /// enough. An oversized range is split and its tail stays on the stack.
    pub fn take(&mut self, size: u32) -> Option<PageRef> {
        let pos = self.ranges.iter().rposition(|r| r.length >= size)?;
        let range = self.ranges[pos];
        if range.length == size {
            self.ranges.remove(pos);
        } else {
            self.ranges[pos] = PageRef::new(range.offset + size as u64, range.length - size);
        }
        Some(PageRef::new(range.offset, size))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total reclaimable bytes.
    pub fn total_bytes(&self) -> u64 {
        self.ranges.iter().map(|r| r.length as u64).sum()
    }

    /// Ranges from bottom to top of the stack.
    pub fn iter(&self) -> impl Iterator<Item = &PageRef> {
        self.ranges.iter()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}

/// Allocates slots and reads/writes node records on a single channel.
///
/// # Store Layout
/// ```text
/// ┌──────────┬────────┬────────┬───────┬────────┬─────┬───────────────┐
/// │ header   │ node   │ links  │ node  │ (free) │ ... │ saved free    │
/// │ 64 bytes │ slot   │ block  │ slot  │        │     │ list (trailer)│
/// └──────────┴────────┴────────┴───────┴────────┴─────┴───────────────┘
/// 0          64                                       end
/// ```
///
/// New ranges come from the free stack first and are otherwise appended at
/// `end`. The free-list trailer is only written by a checkpoint and is
/// overwritten by the next append.
pub struct PageStore {
    channel: Box<dyn Channel>,
    codec: PageCodec,
    free: FreePageStack,
    /// First byte past the last allocated range.
    end: u64,
    force_sync: bool,
}

impl PageStore {
    /// Create a store for an empty channel.
    pub fn new(channel: Box<dyn Channel>, byte_order: ByteOrder, force_sync: bool) -> Self {
        Self {
            channel,
            codec: PageCodec::new(byte_order),
            free: FreePageStack::new(),
            end: HEADER_SIZE,
            force_sync,
        }
    }

    /// Reattach to a store described by `header`, reloading its free list.
    pub fn restore(
        mut channel: Box<dyn Channel>,
        header: &IndexHeader,
        force_sync: bool,
    ) -> Result<Self> {
        let codec = PageCodec::new(header.byte_order);
        let mut free = FreePageStack::new();

        if let Some(offset) = header.free_list {
            let mut bytes = vec![0u8; header.free_count as usize * LINK_SIZE];
            channel.read_at(offset, &mut bytes)?;
            for (i, chunk) in bytes.chunks_exact(LINK_SIZE).enumerate() {
                free.push(codec.decode_link(offset + (i * LINK_SIZE) as u64, chunk)?);
            }
        }

        Ok(Self {
            channel,
            codec,
            free,
            end: header.end.max(HEADER_SIZE),
            force_sync,
        })
    }

    /// Read the header of an existing store.
    pub fn read_header(channel: &mut dyn Channel) -> Result<IndexHeader> {
        let mut data = [0u8; IndexHeader::SIZE];
        match channel.read_at(0, &mut data) {
            Ok(()) => IndexHeader::from_bytes(&data),
            Err(Error::ShortRead { .. }) => Err(Error::IncompatibleStore(
                "store is shorter than its header".into(),
            )),
            Err(e) => Err(e),
        }
    }

    pub fn write_header(&mut self, header: &IndexHeader) -> Result<()> {
        let data = header.to_bytes()?;
        self.channel.write_at(0, &data)?;
        self.sync_if_forced()
    }

    pub fn codec(&self) -> &PageCodec {
        &self.codec
    }

    /// First byte past the last allocated range.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn free_pages(&self) -> &FreePageStack {
        &self.free
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate `size` bytes, reusing a freed range when one is large enough.
    ///
    /// # Errors
    /// Returns `Error::OffsetOverflow` if appending would exceed the 32-bit
    /// address space of the format.
    pub fn allocate(&mut self, size: usize) -> Result<PageRef> {
        let size = u32::try_from(size).map_err(|_| Error::OffsetOverflow(size as u64))?;

        if let Some(range) = self.free.take(size) {
            debug!("reusing freed range {}", range);
            return Ok(range);
        }

        let page = PageRef::new(self.end, size);
        if page.end() > MAX_STORE_OFFSET {
            return Err(Error::OffsetOverflow(page.end()));
        }
        self.end = page.end();
        Ok(page)
    }

    /// Return a range to the free stack.
    pub fn release(&mut self, page: PageRef) {
        debug!("releasing {}", page);
        self.free.push(page);
    }

    // ========================================================================
    // Node I/O
    // ========================================================================

    /// Read and decode the node stored in `page`.
    pub fn read_node(&mut self, page: PageRef) -> Result<Node> {
        let mut bytes = vec![0u8; page.length as usize];
        self.channel.read_at(page.offset, &mut bytes)?;
        self.codec.decode_node(page, &bytes)
    }

    /// Write `node` to its slot.
    ///
    /// If the node's child list changed, a fresh link block is written first
    /// and the old one is released only after the record pointing at the new
    /// block is on the channel. On failure the node is left unchanged and any
    /// range allocated by this call is released again.
    pub fn write_node(&mut self, node: &mut Node) -> Result<()> {
        let fresh_block = if node.children_dirty {
            Some(self.write_links(node)?)
        } else {
            None
        };
        let block = match fresh_block {
            Some(block) => block,
            None => node.child_block,
        };

        if let Err(e) = self.write_record(node, block) {
            if let Some(Some(allocated)) = fresh_block {
                self.free.push(allocated);
            }
            return Err(e);
        }

        if let Some(block) = fresh_block {
            if let Some(old) = node.child_block.take() {
                self.release(old);
            }
            node.child_block = block;
            node.children_dirty = false;
        }
        self.sync_if_forced()
    }

    /// Read link `pos` of a child-link block.
    pub fn read_link(&mut self, block: PageRef, pos: usize) -> Result<PageRef> {
        let start = pos * LINK_SIZE;
        if start + LINK_SIZE > block.length as usize {
            return Err(Error::Structural(format!(
                "child {} is outside link block {}",
                pos, block
            )));
        }
        let at = block.offset + start as u64;
        let mut bytes = [0u8; LINK_SIZE];
        self.channel.read_at(at, &mut bytes)?;
        self.codec.decode_link(at, &bytes)
    }

    fn write_links(&mut self, node: &Node) -> Result<Option<PageRef>> {
        if node.children.len() != node.child_count {
            return Err(Error::Structural(format!(
                "node at {} rewrites {} of {} child links",
                node.page,
                node.children.len(),
                node.child_count
            )));
        }
        if node.children.is_empty() {
            return Ok(None);
        }

        let bytes = self.codec.encode_links(&node.children)?;
        let block = self.allocate(bytes.len())?;
        if let Err(e) = self.channel.write_at(block.offset, &bytes) {
            self.free.push(block);
            return Err(e);
        }
        Ok(Some(block))
    }

    fn write_record(&mut self, node: &Node, block: Option<PageRef>) -> Result<()> {
        let mut bytes = self.codec.encode_node(node, block)?;
        if bytes.len() > node.page.length as usize {
            return Err(Error::Structural(format!(
                "record of {} bytes does not fit slot {}",
                bytes.len(),
                node.page
            )));
        }
        bytes.resize(node.page.length as usize, 0);
        self.channel.write_at(node.page.offset, &bytes)
    }

    // ========================================================================
    // Whole-store operations
    // ========================================================================

    /// Save the free stack past `end`, returning its location and length.
    ///
    /// The channel is trimmed to end right after the saved list.
    pub fn save_free_list(&mut self) -> Result<(Option<u64>, u32)> {
        if self.free.is_empty() {
            self.channel.set_size(self.end)?;
            return Ok((None, 0));
        }

        let ranges: Vec<PageRef> = self.free.iter().copied().collect();
        let bytes = self.codec.encode_links(&ranges)?;
        let trailer_end = self.end + bytes.len() as u64;
        if trailer_end > MAX_STORE_OFFSET {
            return Err(Error::OffsetOverflow(trailer_end));
        }
        self.channel.write_at(self.end, &bytes)?;
        self.channel.set_size(trailer_end)?;
        Ok((Some(self.end), ranges.len() as u32))
    }

    /// Drop every slot: the store shrinks back to its header.
    pub fn truncate(&mut self) -> Result<()> {
        self.free.clear();
        self.end = HEADER_SIZE;
        self.channel.set_size(HEADER_SIZE)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.channel.sync()
    }

    fn sync_if_forced(&mut self) -> Result<()> {
        if self.force_sync {
            self.channel.sync()?;
        }
        Ok(())
    }
}

impl WriteBack for PageStore {
    fn write_back(&mut self, node: &mut Node) -> Result<()> {
        self.write_node(node)
    }
}
