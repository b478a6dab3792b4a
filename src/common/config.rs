//! Configuration constants for the on-disk format and index defaults.

/// Size of the file header in bytes.
///
/// The header occupies the first bytes of every store; node slots are
/// allocated after it.
pub const HEADER_SIZE: u64 = 64;

/// Magic number identifying an index file ("GPDB" in ASCII).
pub const FORMAT_MAGIC: u32 = 0x4744_5042;

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;

/// Size of one child link: `i32 offset` + `i32 length`.
pub const LINK_SIZE: usize = 8;

/// Fixed part of a node record.
///
/// # Layout
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     subnode_block_offset (-1 if the node has no children)
/// 4       32    min_x, min_y, max_x, max_y
/// 36      4     num_payload_ids
/// 40      4n    payload_ids
/// 40+4n   4     num_sub_nodes
/// 44+4n   32n   per-payload bounds (same order as payload_ids)
/// ```
pub const RECORD_FIXED_SIZE: usize = 44;

/// Offset of the payload ids within a node record.
pub const RECORD_IDS_OFFSET: usize = 40;

/// Bytes each entry adds to a node record (payload id + bounds).
pub const RECORD_ENTRY_SIZE: usize = 36;

/// Largest byte offset addressable by the `i32` fields of the format.
pub const MAX_STORE_OFFSET: u64 = i32::MAX as u64;

/// Default maximum entries (or children) per R-tree node.
pub const DEFAULT_MAX_NODE_ENTRIES: usize = 16;

/// Default minimum fill of a non-root R-tree node.
pub const DEFAULT_MIN_NODE_ENTRIES: usize = 6;

/// Default number of nodes kept in the node cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Entries a freshly allocated quadtree slot can hold before it is relocated.
pub const QUAD_SLOT_ENTRIES: usize = 4;

/// Scaled-width exponent at or below which an interval counts as zero width.
///
/// Quadtree entries this thin on either axis are never pushed into new
/// sub-quadrants, which bounds subdivision depth.
pub const MIN_BINARY_EXPONENT: i32 = -50;

/// Side of the largest quadtree cell: the largest finite power of two.
///
/// Entries reaching further from the origin than this are kept at the root.
pub const MAX_CELL_SIZE: f64 = 8.98846567431158e307;

/// Size in bytes of a node record holding `entries` entries.
#[inline]
pub const fn record_len(entries: usize) -> usize {
    RECORD_FIXED_SIZE + RECORD_ENTRY_SIZE * entries
}
