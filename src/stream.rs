//! Byte Stream Module
//!
//! The seekable, position-tracked storage the allocator engine runs on.
//!
//! ## Contract
//! - `len` / `position` / `seek` / `read` / `write` / `flush` from the std
//!   I/O traits plus the helpers below
//! - Writing past end-of-stream zero-fills the gap (both `File` and
//!   `Cursor<Vec<u8>>` behave this way)
//! - `sync` is the flush issued after every mutation

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::config::{Config, SyncStrategy};
use crate::error::{BlobError, Result};

/// Storage contract consumed by the engine
pub trait ByteStream: Read + Write + Seek {
    /// Current size of the stream in bytes
    fn len(&mut self) -> io::Result<u64>;

    fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    /// Read a single byte, `None` at end-of-stream
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read_up_to(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.write_all(&[byte])
    }

    /// Fill `buf` as far as the stream allows; returns the bytes read.
    /// Short counts only happen at end-of-stream.
    fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Durable flush, called once at the end of every mutation
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

// =============================================================================
// In-Memory Stream
// =============================================================================

/// In-memory stream, used by tests and embedders that manage bytes themselves
pub type MemoryStream = Cursor<Vec<u8>>;

impl ByteStream for Cursor<Vec<u8>> {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

// =============================================================================
// File Stream
// =============================================================================

/// File-backed stream holding an exclusive lock for its lifetime
#[derive(Debug)]
pub struct FileStream {
    file: File,
    path: PathBuf,
    sync_strategy: SyncStrategy,
}

impl FileStream {
    /// Open the blob file described by `config`
    ///
    /// A second open of a locked file fails fast with an I/O error
    /// (`WouldBlock`) instead of sharing the file.
    pub fn open(config: &Config) -> Result<Self> {
        if config.path.as_os_str().is_empty() {
            return Err(BlobError::Config("blob file path is empty".to_string()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(config.create_if_missing)
            .truncate(false)
            .open(&config.path)?;

        if config.exclusive_lock {
            file.try_lock_exclusive().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::WouldBlock,
                    format!("{} is locked by another handle: {}", config.path.display(), e),
                )
            })?;
        }

        debug!(path = %config.path.display(), "Opened blob file");

        Ok(Self {
            file,
            path: config.path.clone(),
            sync_strategy: config.sync_strategy,
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl ByteStream for FileStream {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.sync_strategy == SyncStrategy::EveryWrite {
            self.file.sync_data()?;
        }
        Ok(())
    }
}
