//! Table file handle - positional I/O and whole-file fingerprints
//!
//! The engine talks to the file only through [`TableFile`], so tests can
//! substitute handles that fail or change underneath an append.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::DbfResult;
use crate::storage::field::FieldDescriptor;
use crate::storage::header::{TableHeader, EOF_MARKER, TERMINATOR};

/// SHA-256 digest of a table file's full contents
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash everything a reader yields
    pub fn from_reader<Rd: Read>(mut reader: Rd) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        io::copy(&mut reader, &mut hasher)?;
        Ok(Fingerprint(hasher.finalize().into()))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Fingerprint(")?;
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        f.write_str("..)")
    }
}

/// Storage operations the table needs from its file
///
/// Reads take `&self` so that concurrent readers can share one handle;
/// everything that mutates takes `&mut self` and is only reached under the
/// table's exclusive lock.
pub trait TableFile: Send + Sync {
    /// Fill `buf` from `offset`, failing on a short read
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Write all of `buf` at `offset`
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Current file size in bytes
    fn size(&self) -> io::Result<u64>;

    /// Truncate or extend the file
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Flush data and metadata to durable storage
    fn sync(&mut self) -> io::Result<()>;

    /// Hash the file as other processes currently see it
    fn fingerprint(&self) -> io::Result<Fingerprint>;

    /// Close and reopen the underlying handle
    fn reopen(&mut self) -> io::Result<()>;
}

/// A table file on the local filesystem
pub struct DiskFile {
    path: PathBuf,
    file: File,
}

impl DiskFile {
    /// Open an existing table file for reading and writing
    pub fn open(path: &Path) -> DbfResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(DiskFile {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Create a new, empty table file; fails if the path exists
    pub fn create(path: &Path, header: &TableHeader, fields: &[FieldDescriptor]) -> DbfResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        file.write_all(&header.to_bytes())?;
        for field in fields {
            file.write_all(&field.to_bytes())?;
        }
        file.write_all(&[TERMINATOR, EOF_MARKER])?;
        file.sync_all()?;

        Ok(DiskFile {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TableFile for DiskFile {
    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        while !buf.is_empty() {
            match self.file.seek_read(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ))
                }
                Ok(n) => {
                    buf = &mut std::mem::take(&mut buf)[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn fingerprint(&self) -> io::Result<Fingerprint> {
        // A separate handle, so the hash reflects what is on disk
        Fingerprint::from_reader(File::open(&self.path)?)
    }

    fn reopen(&mut self) -> io::Result<()> {
        self.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        Ok(())
    }
}
