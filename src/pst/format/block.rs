//! Physical blocks and logical block streams.
//!
//! A node's contents live either in a single data block or, when larger than
//! one block, in a data tree of internal blocks:
//!
//! ```text
//! XBLOCK  (cLevel 1): btype=0x01, cLevel, cEnt u16, lcbTotal u32, cEnt data block ids
//! XXBLOCK (cLevel 2): same header, cEnt XBLOCK ids
//! ```
//!
//! [`BlockStream`] flattens either form into one ordered list of leaf blocks
//! and decodes each leaf at most once.

use std::sync::{Arc, Mutex, OnceLock};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use crate::pst::codec::{compression, crypto};
use crate::pst::types::error::{PstError, Result};
use crate::pst::types::models::{BlockId, CryptMethod, OffsetEntry, PstVariant};
use crate::pst::utils::id_at;

use super::node::NodeIndex;
use super::source::ByteRangeReader;

const DATA_TREE_SIGNATURE: u8 = 0x01;
const DATA_TREE_HEADER_SIZE: usize = 8;

/// Reads and decodes single physical blocks.
#[derive(Clone)]
pub struct BlockReader {
    source: Arc<dyn ByteRangeReader>,
    crypt_method: CryptMethod,
}

impl BlockReader {
    pub fn new(source: Arc<dyn ByteRangeReader>, crypt_method: CryptMethod) -> Self {
        Self {
            source,
            crypt_method,
        }
    }

    pub fn crypt_method(&self) -> CryptMethod {
        self.crypt_method
    }

    /// Reads the block described by `entry`, inflating and decrypting as needed.
    ///
    /// Compressed blocks are inflated first; only external blocks are
    /// decrypted. The result is exactly `entry.inflated_size` bytes.
    pub fn read_block(&self, entry: &OffsetEntry) -> Result<Vec<u8>> {
        trace!(
            "Reading block {} at {:#x} ({} bytes)",
            entry.id,
            entry.file_offset,
            entry.size
        );
        let stored = self.source.read_range(entry.file_offset, entry.size as usize)?;
        let mut data = if entry.is_compressed() {
            compression::inflate_block(&stored, entry.inflated_size as usize)?
        } else {
            stored
        };
        if !entry.id.is_internal() {
            crypto::decrypt_block_in_place(&mut data, self.crypt_method, entry.id)?;
        }
        Ok(data)
    }
}

/// One leaf block of a stream, decoded on first access.
struct Segment {
    entry: Option<OffsetEntry>,
    size: usize,
    decoded: OnceLock<Vec<u8>>,
    /// Held while the block is read so it is decoded at most once.
    loading: Mutex<()>,
}

/// An ordered run of physical blocks read as one logical byte range.
///
/// Offsets passed to [`BlockStream::read`] are logical; they are mapped to a
/// leaf block and an offset within it. Decoded block bytes are cached with a
/// compute-once guard, so a stream can be shared across threads.
pub struct BlockStream {
    segments: Vec<Segment>,
    /// Logical start offset of each segment.
    starts: Vec<u64>,
    len: u64,
    reader: Option<BlockReader>,
}

impl std::fmt::Debug for BlockStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStream")
            .field("blocks", &self.segments.len())
            .field("len", &self.len)
            .finish()
    }
}

impl BlockStream {
    /// A stream with no blocks.
    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
            starts: Vec::new(),
            len: 0,
            reader: None,
        }
    }

    /// Builds a stream over already-decoded blocks.
    pub fn from_memory(blocks: Vec<Vec<u8>>) -> Self {
        let segments = blocks
            .into_iter()
            .map(|bytes| Segment {
                entry: None,
                size: bytes.len(),
                decoded: OnceLock::from(bytes),
                loading: Mutex::new(()),
            })
            .collect();
        Self::from_segments(segments, None)
    }

    fn from_segments(segments: Vec<Segment>, reader: Option<BlockReader>) -> Self {
        let mut starts = Vec::with_capacity(segments.len());
        let mut len = 0u64;
        for segment in &segments {
            starts.push(len);
            len += segment.size as u64;
        }
        Self {
            segments,
            starts,
            len,
            reader,
        }
    }

    /// Opens the stream rooted at `block_id`.
    ///
    /// A null block id yields an empty stream. An internal block id is
    /// expanded as a data tree; the sum of its leaf sizes must match the
    /// tree's declared total.
    pub fn open(
        index: &dyn NodeIndex,
        reader: &BlockReader,
        variant: PstVariant,
        block_id: BlockId,
    ) -> Result<Self> {
        if block_id.is_null() {
            return Ok(Self::empty());
        }
        let root = index.offset(block_id)?;
        if !root.id.is_internal() {
            let segment = Segment {
                entry: Some(root),
                size: root.inflated_size as usize,
                decoded: OnceLock::new(),
                loading: Mutex::new(()),
            };
            return Ok(Self::from_segments(vec![segment], Some(reader.clone())));
        }

        let mut leaves = Vec::new();
        let declared = expand_data_tree(index, reader, variant, &root, 2, &mut leaves)?;
        let actual: u64 = leaves.iter().map(|leaf| u64::from(leaf.inflated_size)).sum();
        if actual != declared {
            return Err(PstError::SizeMismatch {
                context: "data tree total",
                expected: declared,
                found: actual,
            });
        }
        debug!(
            "Opened data tree {} with {} blocks, {} bytes",
            block_id,
            leaves.len(),
            actual
        );
        let segments = leaves
            .into_iter()
            .map(|entry| Segment {
                size: entry.inflated_size as usize,
                entry: Some(entry),
                decoded: OnceLock::new(),
                loading: Mutex::new(()),
            })
            .collect();
        Ok(Self::from_segments(segments, Some(reader.clone())))
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn block_count(&self) -> usize {
        self.segments.len()
    }

    /// Returns the decoded bytes of leaf block `index`.
    pub fn block(&self, index: usize) -> Result<&[u8]> {
        let segment = self.segments.get(index).ok_or_else(|| {
            PstError::InvalidFormat(format!(
                "Block index {} out of range ({} blocks)",
                index,
                self.segments.len()
            ))
        })?;
        if let Some(bytes) = segment.decoded.get() {
            return Ok(bytes.as_slice());
        }
        let (Some(entry), Some(reader)) = (segment.entry.as_ref(), self.reader.as_ref()) else {
            return Err(PstError::InvalidFormat(format!(
                "Block index {} has no backing data",
                index
            )));
        };
        let _loading = segment.loading.lock().map_err(|_| PstError::LockPoisoned)?;
        if let Some(bytes) = segment.decoded.get() {
            return Ok(bytes.as_slice());
        }
        let bytes = reader.read_block(entry)?;
        if bytes.len() != segment.size {
            return Err(PstError::SizeMismatch {
                context: "decoded block",
                expected: segment.size as u64,
                found: bytes.len() as u64,
            });
        }
        Ok(segment.decoded.get_or_init(|| bytes).as_slice())
    }

    /// Maps a logical offset to `(block index, offset within block)`.
    pub fn locate(&self, offset: u64) -> Option<(usize, usize)> {
        if offset >= self.len {
            return None;
        }
        let index = match self.starts.binary_search(&offset) {
            Ok(exact) => {
                // Skip zero-length blocks sharing the same start.
                let mut index = exact;
                while self.segments[index].size == 0 {
                    index += 1;
                }
                index
            }
            Err(insert) => insert - 1,
        };
        Some((index, (offset - self.starts[index]) as usize))
    }

    /// Reads `len` bytes at logical `offset`, spanning blocks as needed.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset.checked_add(len as u64).filter(|end| *end <= self.len);
        if end.is_none() {
            return Err(PstError::Truncated {
                offset,
                wanted: len as u64,
                available: self.len.saturating_sub(offset),
            });
        }
        let mut out = Vec::with_capacity(len);
        let mut position = offset;
        while out.len() < len {
            let Some((index, within)) = self.locate(position) else {
                break;
            };
            let block = self.block(index)?;
            let take = (block.len() - within).min(len - out.len());
            out.extend_from_slice(&block[within..within + take]);
            position += take as u64;
        }
        Ok(out)
    }

    /// Reads the whole stream into one buffer.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len as usize);
        for index in 0..self.segments.len() {
            out.extend_from_slice(self.block(index)?);
        }
        Ok(out)
    }
}

/// Collects the leaf entries below a data tree block, returning its declared total.
fn expand_data_tree(
    index: &dyn NodeIndex,
    reader: &BlockReader,
    variant: PstVariant,
    entry: &OffsetEntry,
    max_level: u8,
    leaves: &mut Vec<OffsetEntry>,
) -> Result<u64> {
    let data = reader.read_block(entry)?;
    if data.len() < DATA_TREE_HEADER_SIZE {
        return Err(PstError::Truncated {
            offset: 0,
            wanted: DATA_TREE_HEADER_SIZE as u64,
            available: data.len() as u64,
        });
    }
    if data[0] != DATA_TREE_SIGNATURE {
        return Err(PstError::BadSignature {
            context: "data tree block",
            expected: u32::from(DATA_TREE_SIGNATURE),
            found: u32::from(data[0]),
        });
    }
    let level = data[1];
    if level == 0 || level > max_level {
        return Err(PstError::InvalidFormat(format!(
            "Data tree block {} has level {}, expected 1..={}",
            entry.id, level, max_level
        )));
    }
    let count = LittleEndian::read_u16(&data[2..4]) as usize;
    let total = u64::from(LittleEndian::read_u32(&data[4..8]));
    let width = variant.id_width();
    trace!(
        "Data tree block {}: level={}, entries={}, total={}",
        entry.id,
        level,
        count,
        total
    );

    for position in 0..count {
        let child = BlockId(id_at(&data, DATA_TREE_HEADER_SIZE + position * width, width)?);
        let child_entry = index.offset(child)?;
        if level == 1 {
            leaves.push(child_entry);
        } else {
            expand_data_tree(index, reader, variant, &child_entry, 1, leaves)?;
        }
    }
    Ok(total)
}
