//! Index file header.
//!
//! The first [`HEADER_SIZE`] bytes of every store hold an [`IndexHeader`]:
//! format identification, the root page, counters, and where the free-page
//! list was saved at the last checkpoint.

use crate::common::config::{FORMAT_MAGIC, FORMAT_VERSION, HEADER_SIZE};
use crate::common::{Error, PageRef, Result};
use crate::storage::ByteOrder;

/// Metadata stored at offset 0 of the store.
///
/// # Layout (64 bytes, always little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       1     byte_order (of node records)
/// 1       1     strategy tag
/// 2       2     version
/// 4       4     magic
/// 8       4     checksum (CRC32)
/// 12      4     root offset (-1 if empty)
/// 16      4     root length
/// 20      4     free range count
/// 24      8     node_count
/// 32      8     data_count
/// 40      8     end of store
/// 48      4     free list offset (-1 if none)
/// 52      12    reserved (zero)
/// ```
///
/// # Checksum
/// Computed over the whole header with the checksum field zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub byte_order: ByteOrder,
    pub strategy: u8,
    pub root: Option<PageRef>,
    pub node_count: u64,
    pub data_count: u64,
    /// First byte past the last allocated slot.
    pub end: u64,
    /// Offset of the saved free list, if any.
    pub free_list: Option<u64>,
    pub free_count: u32,
}

impl IndexHeader {
    pub const SIZE: usize = HEADER_SIZE as usize;

    const OFFSET_BYTE_ORDER: usize = 0;
    const OFFSET_STRATEGY: usize = 1;
    const OFFSET_VERSION: usize = 2;
    const OFFSET_MAGIC: usize = 4;
    const OFFSET_CHECKSUM: usize = 8;
    const OFFSET_ROOT: usize = 12;
    const OFFSET_FREE_COUNT: usize = 20;
    const OFFSET_NODE_COUNT: usize = 24;
    const OFFSET_DATA_COUNT: usize = 32;
    const OFFSET_END: usize = 40;
    const OFFSET_FREE_LIST: usize = 48;

    /// Header of a freshly created, empty store.
    pub fn empty(byte_order: ByteOrder, strategy: u8) -> Self {
        Self {
            byte_order,
            strategy,
            root: None,
            node_count: 0,
            data_count: 0,
            end: HEADER_SIZE,
            free_list: None,
            free_count: 0,
        }
    }

    /// Serialize, filling in the checksum.
    pub fn to_bytes(&self) -> Result<[u8; Self::SIZE]> {
        let mut data = [0u8; Self::SIZE];

        data[Self::OFFSET_BYTE_ORDER] = self.byte_order as u8;
        data[Self::OFFSET_STRATEGY] = self.strategy;
        put(&mut data, Self::OFFSET_VERSION, &FORMAT_VERSION.to_le_bytes());
        put(&mut data, Self::OFFSET_MAGIC, &FORMAT_MAGIC.to_le_bytes());

        let (root_offset, root_length) = match self.root {
            Some(page) => page.to_link()?,
            None => (-1, 0),
        };
        put(&mut data, Self::OFFSET_ROOT, &root_offset.to_le_bytes());
        put(&mut data, Self::OFFSET_ROOT + 4, &root_length.to_le_bytes());
        put(&mut data, Self::OFFSET_FREE_COUNT, &self.free_count.to_le_bytes());
        put(&mut data, Self::OFFSET_NODE_COUNT, &self.node_count.to_le_bytes());
        put(&mut data, Self::OFFSET_DATA_COUNT, &self.data_count.to_le_bytes());
        put(&mut data, Self::OFFSET_END, &self.end.to_le_bytes());

        let free_list = match self.free_list {
            Some(offset) => i32::try_from(offset).map_err(|_| Error::OffsetOverflow(offset))?,
            None => -1,
        };
        put(&mut data, Self::OFFSET_FREE_LIST, &free_list.to_le_bytes());

        let checksum = Self::compute_checksum(&data);
        put(&mut data, Self::OFFSET_CHECKSUM, &checksum.to_le_bytes());
        Ok(data)
    }

    /// Parse and verify a header.
    ///
    /// # Errors
    /// Returns `Error::IncompatibleStore` on a bad magic, version, byte
    /// order or checksum.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::IncompatibleStore("store is shorter than its header".into()));
        }
        let data = &data[..Self::SIZE];

        if u32_at(data, Self::OFFSET_MAGIC) != FORMAT_MAGIC {
            return Err(Error::IncompatibleStore("bad magic number".into()));
        }
        let version = u16::from_le_bytes([data[Self::OFFSET_VERSION], data[Self::OFFSET_VERSION + 1]]);
        if version != FORMAT_VERSION {
            return Err(Error::IncompatibleStore(format!(
                "unsupported format version {version}"
            )));
        }
        if u32_at(data, Self::OFFSET_CHECKSUM) != Self::compute_checksum(data) {
            return Err(Error::IncompatibleStore("header checksum mismatch".into()));
        }
        let byte_order = ByteOrder::from_u8(data[Self::OFFSET_BYTE_ORDER]).ok_or_else(|| {
            Error::IncompatibleStore(format!(
                "unknown byte order tag {}",
                data[Self::OFFSET_BYTE_ORDER]
            ))
        })?;

        let root = PageRef::from_link(
            u32_at(data, Self::OFFSET_ROOT) as i32,
            u32_at(data, Self::OFFSET_ROOT + 4) as i32,
        );
        let free_list = match u32_at(data, Self::OFFSET_FREE_LIST) as i32 {
            offset if offset >= 0 => Some(offset as u64),
            _ => None,
        };

        Ok(Self {
            byte_order,
            strategy: data[Self::OFFSET_STRATEGY],
            root,
            node_count: u64_at(data, Self::OFFSET_NODE_COUNT),
            data_count: u64_at(data, Self::OFFSET_DATA_COUNT),
            end: u64_at(data, Self::OFFSET_END),
            free_list,
            free_count: u32_at(data, Self::OFFSET_FREE_COUNT),
        })
    }

    /// CRC32 of a serialized header with its checksum field treated as zero.
    pub fn compute_checksum(data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&data[Self::OFFSET_CHECKSUM + 4..Self::SIZE]);
        hasher.finalize()
    }
}

fn put(data: &mut [u8], at: usize, bytes: &[u8]) {
    data[at..at + bytes.len()].copy_from_slice(bytes);
}

fn u32_at(data: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn u64_at(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexHeader {
        IndexHeader {
            byte_order: ByteOrder::Big,
            strategy: 1,
            root: Some(PageRef::new(64, 188)),
            node_count: 12,
            data_count: 1000,
            end: 9000,
            free_list: Some(9000),
            free_count: 3,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample();
        let bytes = header.to_bytes().unwrap();
        assert_eq!(IndexHeader::from_bytes(&bytes).unwrap(), header);

        let empty = IndexHeader::empty(ByteOrder::Little, 0);
        let bytes = empty.to_bytes().unwrap();
        assert_eq!(IndexHeader::from_bytes(&bytes).unwrap(), empty);
    }

    #[test]
    fn test_header_byte_layout() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(bytes[0], 1); // ByteOrder::Big
        assert_eq!(bytes[1], 1);
        assert_eq!(&bytes[4..8], &FORMAT_MAGIC.to_le_bytes());
        assert_eq!(&bytes[12..16], &64i32.to_le_bytes());
        assert_eq!(&bytes[52..64], &[0u8; 12]);
    }

    #[test]
    fn test_header_detects_corruption() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[30] ^= 0xFF;
        assert!(matches!(
            IndexHeader::from_bytes(&bytes),
            Err(Error::IncompatibleStore(_))
        ));
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let bytes = [0u8; IndexHeader::SIZE];
        assert!(IndexHeader::from_bytes(&bytes).is_err());
        assert!(IndexHeader::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn test_checksum_ignores_checksum_field() {
        let mut bytes = sample().to_bytes().unwrap();
        let checksum1 = IndexHeader::compute_checksum(&bytes);
        bytes[8..12].copy_from_slice(&[0xFF; 4]);
        assert_eq!(checksum1, IndexHeader::compute_checksum(&bytes));
    }
}
