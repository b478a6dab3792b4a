//! Binary encoding of node records and child-link blocks.
//!
//! Every node occupies one slot holding a single record. Children are not
//! stored inline: the record points at a separate contiguous block of
//! fixed-width links, one per child.
//!
//! ```text
//!  node slot                                    child-link block
//! ┌──────────────┬────────┬─────┬─────┬──────┐ ┌────────┬────────┬─────┐
//! │ block offset │ region │ ids │ #ch │ ...  │ │ link 0 │ link 1 │ ... │
//! └──────┬───────┴────────┴─────┴─────┴──────┘ └────────┴────────┴─────┘
//!        └───────────────────────────────────────▲
//! ```
//!
//! See [`crate::common::config::RECORD_FIXED_SIZE`] for the field layout.

use bytes::{Buf, BufMut, BytesMut};

use crate::common::config::{record_len, HEADER_SIZE, LINK_SIZE, RECORD_IDS_OFFSET};
use crate::common::{Entry, Error, PageRef, Region, Result};
use crate::index::Node;

/// Byte order of every multi-byte field in node records and link blocks.
///
/// Fixed for the life of a store and recorded in its header.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Little = 0,
    Big = 1,
}

impl ByteOrder {
    /// Convert from u8, returning None for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ByteOrder::Little),
            1 => Some(ByteOrder::Big),
            _ => None,
        }
    }
}

/// Encodes and decodes node records in one [`ByteOrder`].
#[derive(Debug, Clone, Copy)]
pub struct PageCodec {
    order: ByteOrder,
}

impl PageCodec {
    pub fn new(order: ByteOrder) -> Self {
        Self { order }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Size of the record `node` encodes to.
    pub fn encoded_len(&self, node: &Node) -> usize {
        record_len(node.entries.len())
    }

    // ========================================================================
    // Node records
    // ========================================================================

    /// Encode `node`, pointing its child count at `child_block`.
    ///
    /// `child_block` must be `Some` exactly when the node has children.
    pub fn encode_node(&self, node: &Node, child_block: Option<PageRef>) -> Result<BytesMut> {
        let block_offset = match (node.child_count, child_block) {
            (0, None) => -1,
            (0, Some(block)) => {
                return Err(Error::Structural(format!(
                    "childless node at {} points at link block {}",
                    node.page, block
                )))
            }
            (_, Some(block)) => block.to_link()?.0,
            (count, None) => {
                return Err(Error::Structural(format!(
                    "node at {} declares {} children but has no link block",
                    node.page, count
                )))
            }
        };

        let mut buf = BytesMut::with_capacity(self.encoded_len(node));
        self.put_i32(&mut buf, block_offset);
        self.put_region(&mut buf, &node.region);
        self.put_i32(&mut buf, count_to_i32(node.entries.len(), node.page)?);
        for entry in &node.entries {
            self.put_i32(&mut buf, entry.payload);
        }
        self.put_i32(&mut buf, count_to_i32(node.child_count, node.page)?);
        for entry in &node.entries {
            self.put_region(&mut buf, &entry.region);
        }
        Ok(buf)
    }

    /// Decode the record stored in `page`. `bytes` may include slot padding.
    ///
    /// # Errors
    /// Returns `Error::MalformedRecord` if the record is truncated, has
    /// negative counts, invalid regions, or an inconsistent link block.
    pub fn decode_node(&self, page: PageRef, bytes: &[u8]) -> Result<Node> {
        let at = page.offset;
        let mut buf = bytes;

        if buf.remaining() < record_len(0) {
            return Err(Error::malformed(at, "record shorter than its fixed part"));
        }
        let block_offset = self.get_i32(&mut buf);
        let region = self.get_region(&mut buf, at)?;

        let num_ids = self.get_i32(&mut buf);
        if num_ids < 0 {
            return Err(Error::malformed(at, format!("negative payload count {num_ids}")));
        }
        let num_ids = num_ids as usize;
        if buf.remaining() < record_len(num_ids) - RECORD_IDS_OFFSET {
            return Err(Error::malformed(
                at,
                format!("{num_ids} payload ids do not fit the slot"),
            ));
        }
        let payloads: Vec<i32> = (0..num_ids).map(|_| self.get_i32(&mut buf)).collect();

        let num_sub_nodes = self.get_i32(&mut buf);
        if num_sub_nodes < 0 {
            return Err(Error::malformed(
                at,
                format!("negative child count {num_sub_nodes}"),
            ));
        }
        let child_count = num_sub_nodes as usize;

        let mut entries = Vec::with_capacity(num_ids);
        for payload in payloads {
            let bounds = self.get_region(&mut buf, at)?;
            entries.push(Entry::new(bounds, payload));
        }

        let child_block = match (child_count, block_offset) {
            (0, -1) => None,
            (0, offset) => {
                return Err(Error::malformed(
                    at,
                    format!("childless node points at link block {offset}"),
                ))
            }
            (count, offset) if offset >= HEADER_SIZE as i32 => {
                Some(PageRef::new(offset as u64, (count * LINK_SIZE) as u32))
            }
            (_, offset) => {
                return Err(Error::malformed(
                    at,
                    format!("invalid link block offset {offset}"),
                ))
            }
        };

        Ok(Node::decoded(page, region, entries, child_block, child_count))
    }

    // ========================================================================
    // Child links
    // ========================================================================

    /// Encode a contiguous block of child links.
    pub fn encode_links(&self, links: &[PageRef]) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(links.len() * LINK_SIZE);
        for link in links {
            let (offset, length) = link.to_link()?;
            self.put_i32(&mut buf, offset);
            self.put_i32(&mut buf, length);
        }
        Ok(buf)
    }

    /// Decode one link read from offset `at`.
    pub fn decode_link(&self, at: u64, bytes: &[u8]) -> Result<PageRef> {
        let mut buf = bytes;
        if buf.remaining() < LINK_SIZE {
            return Err(Error::malformed(at, "truncated child link"));
        }
        let offset = self.get_i32(&mut buf);
        let length = self.get_i32(&mut buf);
        PageRef::from_link(offset, length)
            .filter(|page| page.offset >= HEADER_SIZE)
            .ok_or_else(|| Error::malformed(at, format!("invalid child link ({offset}, {length})")))
    }

    // ========================================================================
    // Primitive fields
    // ========================================================================

    fn put_i32(&self, buf: &mut BytesMut, value: i32) {
        match self.order {
            ByteOrder::Little => buf.put_i32_le(value),
            ByteOrder::Big => buf.put_i32(value),
        }
    }

    fn put_f64(&self, buf: &mut BytesMut, value: f64) {
        match self.order {
            ByteOrder::Little => buf.put_f64_le(value),
            ByteOrder::Big => buf.put_f64(value),
        }
    }

    fn put_region(&self, buf: &mut BytesMut, region: &Region) {
        self.put_f64(buf, region.min_x);
        self.put_f64(buf, region.min_y);
        self.put_f64(buf, region.max_x);
        self.put_f64(buf, region.max_y);
    }

    // Callers check `remaining()` first; `Buf` getters panic on underflow.
    fn get_i32(&self, buf: &mut &[u8]) -> i32 {
        match self.order {
            ByteOrder::Little => buf.get_i32_le(),
            ByteOrder::Big => buf.get_i32(),
        }
    }

    fn get_f64(&self, buf: &mut &[u8]) -> f64 {
        match self.order {
            ByteOrder::Little => buf.get_f64_le(),
            ByteOrder::Big => buf.get_f64(),
        }
    }

    fn get_region(&self, buf: &mut &[u8], at: u64) -> Result<Region> {
        if buf.remaining() < 32 {
            return Err(Error::malformed(at, "truncated region"));
        }
        let min_x = self.get_f64(buf);
        let min_y = self.get_f64(buf);
        let max_x = self.get_f64(buf);
        let max_y = self.get_f64(buf);
        Region::new(min_x, min_y, max_x, max_y).map_err(|e| Error::malformed(at, e.to_string()))
    }
}

fn count_to_i32(count: usize, page: PageRef) -> Result<i32> {
    i32::try_from(count)
        .map_err(|_| Error::Structural(format!("node at {} has {} items", page, count)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Region {
        Region::new(min_x, min_y, max_x, max_y).unwrap()
    }

    fn sample_node(page: PageRef) -> Node {
        let mut node = Node::new(page, region(0.0, 0.0, 4.0, 4.0));
        node.entries.push(Entry::new(region(0.5, 0.5, 1.0, 1.0), 7));
        node.entries.push(Entry::new(region(2.0, 3.0, 4.0, 4.0), -3));
        node
    }

    #[test]
    fn test_node_roundtrip_both_orders() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let codec = PageCodec::new(order);
            let page = PageRef::new(64, 256);
            let mut node = sample_node(page);
            node.child_count = 3;
            let block = PageRef::new(512, 24);

            let mut bytes = codec.encode_node(&node, Some(block)).unwrap();
            assert_eq!(bytes.len(), record_len(2));
            bytes.resize(page.length as usize, 0);

            let decoded = codec.decode_node(page, &bytes).unwrap();
            assert_eq!(decoded.region, node.region);
            assert_eq!(decoded.entries, node.entries);
            assert_eq!(decoded.child_count, 3);
            assert_eq!(decoded.child_block, Some(block));
            assert!(decoded.children.is_empty());
        }
    }

    #[test]
    fn test_byte_layout_little_endian() {
        let codec = PageCodec::new(ByteOrder::Little);
        let node = Node::new(PageRef::new(64, 64), region(1.0, 2.0, 3.0, 4.0));
        let bytes = codec.encode_node(&node, None).unwrap();

        assert_eq!(&bytes[0..4], &(-1i32).to_le_bytes());
        assert_eq!(&bytes[4..12], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[36..40], &0i32.to_le_bytes());
        assert_eq!(&bytes[40..44], &0i32.to_le_bytes());
    }

    #[test]
    fn test_byte_layout_big_endian() {
        let codec = PageCodec::new(ByteOrder::Big);
        let mut node = Node::new(PageRef::new(64, 128), region(1.0, 2.0, 3.0, 4.0));
        node.entries.push(Entry::new(region(1.0, 2.0, 3.0, 4.0), 0x0102_0304));
        let bytes = codec.encode_node(&node, None).unwrap();

        assert_eq!(&bytes[36..40], &1i32.to_be_bytes());
        assert_eq!(&bytes[40..44], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_encode_rejects_missing_block() {
        let codec = PageCodec::new(ByteOrder::Little);
        let mut node = sample_node(PageRef::new(64, 256));
        node.child_count = 2;
        assert!(matches!(
            codec.encode_node(&node, None),
            Err(Error::Structural(_))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_record() {
        let codec = PageCodec::new(ByteOrder::Little);
        let bytes = [0u8; 20];
        assert!(matches!(
            codec.decode_node(PageRef::new(64, 20), &bytes),
            Err(Error::MalformedRecord { offset: 64, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_negative_count() {
        let codec = PageCodec::new(ByteOrder::Little);
        let node = Node::new(PageRef::new(64, 64), region(0.0, 0.0, 1.0, 1.0));
        let mut bytes = codec.encode_node(&node, None).unwrap();
        bytes[36..40].copy_from_slice(&(-5i32).to_le_bytes());

        assert!(matches!(
            codec.decode_node(PageRef::new(64, 64), &bytes),
            Err(Error::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_count_past_slot() {
        let codec = PageCodec::new(ByteOrder::Little);
        let page = PageRef::new(64, record_len(2) as u32);
        let mut bytes = codec.encode_node(&sample_node(page), None).unwrap();
        assert!(codec.decode_node(page, &bytes).is_ok());

        bytes[36..40].copy_from_slice(&3i32.to_le_bytes());
        assert!(matches!(
            codec.decode_node(page, &bytes),
            Err(Error::MalformedRecord { offset: 64, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_inverted_region() {
        let codec = PageCodec::new(ByteOrder::Little);
        let node = Node::new(PageRef::new(64, 64), region(0.0, 0.0, 1.0, 1.0));
        let mut bytes = codec.encode_node(&node, None).unwrap();
        // min_x = 5.0 > max_x = 1.0
        bytes[4..12].copy_from_slice(&5.0f64.to_le_bytes());

        assert!(codec.decode_node(PageRef::new(64, 64), &bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_orphan_block_pointer() {
        let codec = PageCodec::new(ByteOrder::Little);
        let node = Node::new(PageRef::new(64, 64), region(0.0, 0.0, 1.0, 1.0));
        let mut bytes = codec.encode_node(&node, None).unwrap();
        bytes[0..4].copy_from_slice(&256i32.to_le_bytes());

        assert!(codec.decode_node(PageRef::new(64, 64), &bytes).is_err());
    }

    #[test]
    fn test_links() {
        let codec = PageCodec::new(ByteOrder::Big);
        let links = [PageRef::new(64, 188), PageRef::new(252, 188)];
        let bytes = codec.encode_links(&links).unwrap();
        assert_eq!(bytes.len(), 2 * LINK_SIZE);

        assert_eq!(codec.decode_link(0, &bytes[..8]).unwrap(), links[0]);
        assert_eq!(codec.decode_link(8, &bytes[8..]).unwrap(), links[1]);
        assert!(codec.decode_link(0, &bytes[..4]).is_err());
    }

    #[test]
    fn test_decode_link_rejects_header_offset() {
        let codec = PageCodec::new(ByteOrder::Little);
        let bytes = codec.encode_links(&[PageRef::new(0, 64)]).unwrap();
        assert!(codec.decode_link(0, &bytes).is_err());
    }
}
