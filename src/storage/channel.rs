//! Random-access byte channels - the raw storage the index pages into.
//!
//! A [`Channel`] is the only thing the storage layer needs from the outside
//! world:
//! - [`FileChannel`] - a single file on disk
//! - [`MemoryChannel`] - a growable in-memory buffer

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::{Error, Result};

/// Positional read/write access to a flat byte store.
///
/// Writing past the current end extends the store; the gap, if any, reads as
/// zeros. Reads past the end fail with `Error::ShortRead`.
pub trait Channel: Send {
    /// Fill `buf` with the bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` starting at `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Current size of the store in bytes.
    fn size(&mut self) -> Result<u64>;

    /// Truncate or extend the store to exactly `size` bytes.
    fn set_size(&mut self, size: u64) -> Result<()>;

    /// Flush written bytes to stable storage.
    fn sync(&mut self) -> Result<()>;
}

/// A [`Channel`] over a single file.
///
/// # Durability
/// Writes go to the OS page cache. Nothing is forced to disk until
/// [`Channel::sync`] is called; the page store calls it after every write
/// when `force_sync` is enabled.
pub struct FileChannel {
    file: File,
}

impl FileChannel {
    /// Create a new file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self { file })
    }

    /// Open an existing file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self { file })
    }

    /// Open an existing file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }
}

impl Channel for FileChannel {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        match self.file.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                let available = self.file.metadata()?.len().saturating_sub(offset);
                Err(Error::ShortRead {
                    offset,
                    wanted: buf.len(),
                    available,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        self.file.set_len(size)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// A [`Channel`] backed by a `Vec<u8>`.
///
/// Useful for tests and for indexes that never need to outlive the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryChannel {
    data: Vec<u8>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing bytes, e.g. a previously saved index image.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Channel for MemoryChannel {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let len = self.data.len() as u64;
        let end = offset.saturating_add(buf.len() as u64);
        if end > len {
            return Err(Error::ShortRead {
                offset,
                wanted: buf.len(),
                available: len.saturating_sub(offset),
            });
        }
        buf.copy_from_slice(&self.data[offset as usize..end as usize]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        self.data.resize(size as usize, 0);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
