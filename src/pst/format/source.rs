//! Random-access byte sources.
//!
//! Every read takes an explicit offset, so no seek cursor is shared between
//! logical streams opened on the same file.

use std::io::{Read, Seek, SeekFrom};
use std::sync::Mutex;

use crate::pst::types::error::{PstError, Result};

/// A random-access source of archive bytes.
pub trait ByteRangeReader: Send + Sync {
    /// Total length of the source in bytes.
    fn len(&self) -> u64;

    /// Fills `buf` with the bytes starting at `offset`.
    ///
    /// A read that would run past the end of the source fails with
    /// [`PstError::Truncated`]; nothing is partially filled.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads `len` bytes at `offset` into a new buffer.
    fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }
}

fn check_bounds(total: u64, offset: u64, wanted: usize) -> Result<()> {
    let end = offset.checked_add(wanted as u64);
    match end {
        Some(end) if end <= total => Ok(()),
        _ => Err(PstError::Truncated {
            offset,
            wanted: wanted as u64,
            available: total.saturating_sub(offset),
        }),
    }
}

impl ByteRangeReader for Vec<u8> {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(ByteRangeReader::len(self), offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self[start..start + buf.len()]);
        Ok(())
    }
}

/// Wraps a seekable reader so that each seek-then-read pair runs under one lock.
#[derive(Debug)]
pub struct LockedReader<R> {
    inner: Mutex<R>,
    len: u64,
}

impl<R: Read + Seek> LockedReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner: Mutex::new(inner),
            len,
        })
    }
}

impl<R: Read + Seek + Send> ByteRangeReader for LockedReader<R> {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(self.len, offset, buf.len())?;
        let mut inner = self.inner.lock().map_err(|_| PstError::LockPoisoned)?;
        inner.seek(SeekFrom::Start(offset))?;
        inner.read_exact(buf)?;
        Ok(())
    }
}
