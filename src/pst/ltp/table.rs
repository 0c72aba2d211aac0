//! Table context: a multi-row table stored on a heap.
//!
//! # TCINFO
//! ```text
//! bType u8 (0x7C), cCols u8,
//! rgib[4] u16       end of the 4-byte, 2-byte and 1-byte areas, end of row
//! hidRowIndex u32   BTH mapping row id -> row index
//! hnidRows u32      row matrix (heap id or sub-node id)
//! hidIndex u32      deprecated
//! cCols × TCOLDESC  tag u32, ibData u16, cbData u8, iBit u8
//! ```
//!
//! Rows never straddle a block of the row matrix: each block holds
//! `block_size / row_size` rows and the remainder is padding. Each row ends
//! with an existence bitmap; columns whose bit is clear are absent.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::pst::format::block::BlockStream;
use crate::pst::format::node::Node;
use crate::pst::types::error::{PstError, Result};
use crate::pst::types::models::NodeId;
use crate::pst::types::properties::PropertyType;
use crate::pst::utils::slice_at;

use super::bth;
use super::heap::{HeapId, HeapNode, CLIENT_TABLE_CONTEXT};
use super::value::{CellData, PropertyCell, RowRecord};

const TCINFO_SIGNATURE: u8 = 0x7C;
const TCINFO_HEADER_SIZE: usize = 22;
const COLUMN_DESCRIPTOR_SIZE: usize = 8;

/// Index into `rgib` of the end of the 1-byte area, where the bitmap starts.
const TCI_1B: usize = 2;
/// Index into `rgib` of the end of the row.
const TCI_BM: usize = 3;

/// Byte offset of row `index` in a row matrix of `block_size` byte blocks.
///
/// Rows are packed `block_size / row_size` to a block, so the offset is
/// `(index / rows_per_block) * block_size + (index % rows_per_block) * row_size`.
pub fn row_offset(index: usize, row_size: usize, block_size: usize) -> usize {
    let rows_per_block = block_size.checked_div(row_size).unwrap_or(0).max(1);
    (index / rows_per_block) * block_size + (index % rows_per_block) * row_size
}

/// One column of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub id: u16,
    pub prop_type: PropertyType,
    pub offset: u16,
    pub size: u8,
    pub bitmap_bit: u8,
}

impl ColumnDescriptor {
    fn parse(bytes: &[u8]) -> Self {
        let tag = LittleEndian::read_u32(&bytes[0..4]);
        Self {
            id: (tag >> 16) as u16,
            prop_type: PropertyType::from((tag & 0xFFFF) as u16),
            offset: LittleEndian::read_u16(&bytes[4..6]),
            size: bytes[6],
            bitmap_bit: bytes[7],
        }
    }
}

/// Where the row matrix lives.
enum RowStorage {
    Empty,
    Heap(HeapId),
    Stream(BlockStream),
}

/// An opened table context.
pub struct TableContext {
    heap: Arc<HeapNode>,
    columns: Vec<ColumnDescriptor>,
    row_size: usize,
    bitmap_offset: usize,
    /// `(row id, row index)` pairs ordered by row index.
    row_index: Vec<(u32, u32)>,
    storage: RowStorage,
    block_size: usize,
    default_codepage: u32,
}

impl std::fmt::Debug for TableContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableContext")
            .field("node", &self.heap.node().id())
            .field("columns", &self.columns.len())
            .field("row_size", &self.row_size)
            .field("rows", &self.row_index.len())
            .finish()
    }
}

impl TableContext {
    /// Opens the table context stored in `node`.
    pub fn open(node: Node) -> Result<Self> {
        let variant = node.context().variant();
        let default_codepage = node.context().default_codepage();
        let heap = HeapNode::open(node)?;
        if heap.client_signature() != CLIENT_TABLE_CONTEXT {
            return Err(PstError::InvalidFormat(format!(
                "Node {} holds client {:#04x}, not a table context",
                heap.node().id(),
                heap.client_signature()
            )));
        }

        let info = heap.heap_slice(heap.user_root())?;
        let header = slice_at(info, 0, TCINFO_HEADER_SIZE)?;
        if header[0] != TCINFO_SIGNATURE {
            return Err(PstError::BadSignature {
                context: "table context info",
                expected: u32::from(TCINFO_SIGNATURE),
                found: u32::from(header[0]),
            });
        }
        let column_count = header[1] as usize;
        let rgib: Vec<usize> = header[2..10]
            .chunks_exact(2)
            .map(|chunk| LittleEndian::read_u16(chunk) as usize)
            .collect();
        let row_index_id = HeapId(LittleEndian::read_u32(&header[10..14]));
        let rows_id = LittleEndian::read_u32(&header[14..18]);

        let descriptors = slice_at(
            info,
            TCINFO_HEADER_SIZE,
            column_count * COLUMN_DESCRIPTOR_SIZE,
        )?;
        let columns: Vec<ColumnDescriptor> = descriptors
            .chunks_exact(COLUMN_DESCRIPTOR_SIZE)
            .map(ColumnDescriptor::parse)
            .collect();

        let row_size = rgib[TCI_BM];
        let bitmap_offset = rgib[TCI_1B];
        if row_size == 0 && rows_id != 0 {
            return Err(PstError::InvalidFormat(format!(
                "Table on node {} has zero-length rows",
                heap.node().id()
            )));
        }
        if bitmap_offset > row_size {
            return Err(PstError::InvalidFormat(format!(
                "Existence bitmap at {} starts past the {}-byte row",
                bitmap_offset, row_size
            )));
        }
        for column in &columns {
            if column.offset as usize + column.size as usize > row_size {
                return Err(PstError::InvalidFormat(format!(
                    "Column {:#06x} extends past the {}-byte row",
                    column.id, row_size
                )));
            }
        }

        let mut row_index = if row_index_id.0 == 0 {
            Vec::new()
        } else {
            let index_header = bth::read_header(&heap, row_index_id)?;
            if index_header.key_size != 4 {
                return Err(PstError::InvalidFormat(format!(
                    "Row index key is {} bytes, expected 4",
                    index_header.key_size
                )));
            }
            bth::read_records(&heap, &index_header)?
                .iter()
                .map(|record| {
                    let row_id = record.key_u32();
                    let position = match record.value.len() {
                        1 => u32::from(record.value[0]),
                        2 | 3 => u32::from(LittleEndian::read_u16(record.value)),
                        _ => LittleEndian::read_u32(record.value),
                    };
                    (row_id, position)
                })
                .collect::<Vec<_>>()
        };
        row_index.sort_by_key(|&(_, position)| position);
        if row_size == 0 && !row_index.is_empty() {
            return Err(PstError::InvalidFormat(format!(
                "Table on node {} indexes {} rows of zero length",
                heap.node().id(),
                row_index.len()
            )));
        }

        let storage = if rows_id == 0 {
            RowStorage::Empty
        } else if heap.node().sub_nodes().contains(NodeId(rows_id)) {
            RowStorage::Stream(heap.node().open_sub_node(NodeId(rows_id))?.into_data())
        } else if HeapId(rows_id).id_type() == 0 {
            RowStorage::Heap(HeapId(rows_id))
        } else {
            return Err(PstError::Unsupported(format!(
                "row matrix hnid {:#x} is neither a heap id nor a known sub-node",
                rows_id
            )));
        };

        let table = Self {
            heap: Arc::new(heap),
            columns,
            row_size,
            bitmap_offset,
            row_index,
            storage,
            block_size: variant.row_block_size(),
            default_codepage,
        };
        let capacity = table.stored_row_capacity()?;
        if capacity < table.row_index.len() {
            warn!(
                "Table on node {} indexes {} rows but stores only {}",
                table.heap.node().id(),
                table.row_index.len(),
                capacity
            );
        }
        debug!("Opened {:?}", table);
        Ok(table)
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Number of rows, taken from the row index.
    pub fn row_count(&self) -> usize {
        self.row_index.len()
    }

    /// Row ids in row order. For folder tables these are node ids.
    pub fn row_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.row_index.iter().map(|&(row_id, _)| row_id)
    }

    fn stored_row_capacity(&self) -> Result<usize> {
        if self.row_size == 0 {
            return Ok(0);
        }
        Ok(match &self.storage {
            RowStorage::Empty => 0,
            RowStorage::Heap(id) => self.heap.heap_slice(*id)?.len() / self.row_size,
            RowStorage::Stream(stream) => {
                let rows_per_block = (self.block_size / self.row_size).max(1);
                let full_blocks = stream.block_count().saturating_sub(1);
                let last = match stream.block_count() {
                    0 => 0,
                    count => stream.block(count - 1)?.len() / self.row_size,
                };
                full_blocks * rows_per_block + last
            }
        })
    }

    fn row_bytes(&self, position: usize) -> Result<&[u8]> {
        if matches!(self.storage, RowStorage::Empty) || self.row_size == 0 {
            return Err(PstError::RowNotFound(position as u32));
        }
        let offset = row_offset(position, self.row_size, self.block_size);
        match &self.storage {
            RowStorage::Empty => Err(PstError::RowNotFound(position as u32)),
            RowStorage::Heap(id) => slice_at(self.heap.heap_slice(*id)?, offset, self.row_size),
            RowStorage::Stream(stream) => {
                let block = stream.block(offset / self.block_size)?;
                slice_at(block, offset % self.block_size, self.row_size)
            }
        }
    }

    /// Reads the row at `position` (0-based, in row order).
    pub fn row(&self, position: usize) -> Result<RowRecord> {
        if position >= self.row_index.len() {
            return Err(PstError::RowNotFound(position as u32));
        }
        let bytes = self.row_bytes(self.row_index[position].1 as usize)?;
        let bitmap = slice_at(bytes, self.bitmap_offset, self.row_size - self.bitmap_offset)?;

        let mut cells = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let bit = column.bitmap_bit as usize;
            let present = bitmap
                .get(bit / 8)
                .map(|byte| byte & (0x80 >> (bit % 8)) != 0)
                .unwrap_or(false);
            if !present {
                continue;
            }
            let raw = slice_at(bytes, column.offset as usize, column.size as usize)?;
            let data = match column.size {
                1 => CellData::Scalar(u32::from(raw[0])),
                2 => CellData::Scalar(u32::from(LittleEndian::read_u16(raw))),
                8 => {
                    let mut value = [0u8; 8];
                    value.copy_from_slice(raw);
                    CellData::Inline8(value)
                }
                4 if column.prop_type.is_inline_in_table_cell() => {
                    CellData::Scalar(LittleEndian::read_u32(raw))
                }
                4 => CellData::Reference(LittleEndian::read_u32(raw)),
                other => {
                    return Err(PstError::InvalidFormat(format!(
                        "Column {:#06x} has unsupported width {}",
                        column.id, other
                    )))
                }
            };
            cells.push(PropertyCell {
                id: column.id,
                prop_type: column.prop_type,
                data,
            });
        }
        Ok(RowRecord::new(
            cells,
            Some(Arc::clone(&self.heap)),
            self.default_codepage,
        ))
    }

    /// Reads the row with the given row id.
    pub fn row_by_id(&self, row_id: u32) -> Result<RowRecord> {
        let position = self
            .row_index
            .iter()
            .position(|&(id, _)| id == row_id)
            .ok_or(PstError::RowNotFound(row_id))?;
        self.row(position)
    }

    /// Iterates over all rows in order.
    pub fn rows(&self) -> impl Iterator<Item = Result<RowRecord>> + '_ {
        (0..self.row_count()).map(move |position| self.row(position))
    }
}
