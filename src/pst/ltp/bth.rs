//! BTree-on-heap: a keyed record table stored in heap allocations.
//!
//! ```text
//! BTHHEADER: bType u8 (0xB5), cbKey u8, cbEnt u8, bIdxLevels u8, hidRoot u32
//! ```
//!
//! With `bIdxLevels == 0` the root allocation is a packed array of
//! `cbKey + cbEnt` byte records. Deeper trees are rejected.

use byteorder::{ByteOrder, LittleEndian};
use log::trace;

use crate::pst::types::error::{PstError, Result};
use crate::pst::utils::slice_at;

use super::heap::{HeapId, HeapNode};

pub const BTH_SIGNATURE: u8 = 0xB5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BthHeader {
    pub key_size: usize,
    pub value_size: usize,
    pub index_levels: u8,
    pub root: HeapId,
}

/// One record of a BTree-on-heap.
#[derive(Debug, Clone, Copy)]
pub struct BthRecord<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl BthRecord<'_> {
    /// The key read as a little-endian integer.
    pub fn key_u32(&self) -> u32 {
        match self.key.len() {
            1 => u32::from(self.key[0]),
            2 => u32::from(LittleEndian::read_u16(self.key)),
            _ => LittleEndian::read_u32(self.key),
        }
    }
}

/// Reads the BTH header stored at `header_id`.
pub fn read_header(heap: &HeapNode, header_id: HeapId) -> Result<BthHeader> {
    let bytes = slice_at(heap.heap_slice(header_id)?, 0, 8)?;
    if bytes[0] != BTH_SIGNATURE {
        return Err(PstError::BadSignature {
            context: "BTree-on-heap header",
            expected: u32::from(BTH_SIGNATURE),
            found: u32::from(bytes[0]),
        });
    }
    let header = BthHeader {
        key_size: bytes[1] as usize,
        value_size: bytes[2] as usize,
        index_levels: bytes[3],
        root: HeapId(LittleEndian::read_u32(&bytes[4..8])),
    };
    if !matches!(header.key_size, 2 | 4 | 8 | 16) {
        return Err(PstError::InvalidFormat(format!(
            "BTree-on-heap key size {} is invalid",
            header.key_size
        )));
    }
    if header.value_size == 0 || header.value_size > 32 {
        return Err(PstError::InvalidFormat(format!(
            "BTree-on-heap record size {} is invalid",
            header.value_size
        )));
    }
    trace!(
        "BTH at {:#x}: key={}, value={}, levels={}, root={:#x}",
        header_id.0,
        header.key_size,
        header.value_size,
        header.index_levels,
        header.root.0
    );
    Ok(header)
}

/// Reads every record of the BTH described by `header`.
///
/// # Errors
/// [`PstError::Unsupported`] for trees with intermediate index levels.
pub fn read_records<'a>(heap: &'a HeapNode, header: &BthHeader) -> Result<Vec<BthRecord<'a>>> {
    if header.index_levels > 0 {
        return Err(PstError::Unsupported(format!(
            "BTree-on-heap with {} index levels",
            header.index_levels
        )));
    }
    if header.root.0 == 0 {
        return Ok(Vec::new());
    }
    let data = heap.heap_slice(header.root)?;
    let stride = header.key_size + header.value_size;
    if data.len() % stride != 0 {
        return Err(PstError::InvalidFormat(format!(
            "BTree-on-heap leaf of {} bytes is not a multiple of {}",
            data.len(),
            stride
        )));
    }
    Ok(data
        .chunks_exact(stride)
        .map(|record| BthRecord {
            key: &record[..header.key_size],
            value: &record[header.key_size..],
        })
        .collect())
}
