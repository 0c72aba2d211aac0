//! Builders for synthetic archives.
//!
//! [`BlockStore`] lays blocks out in a byte buffer and records their block
//! B-tree entries. It can either answer lookups directly from memory
//! ([`BlockStore::into_context`]) or be written out as a complete archive
//! with a header and both B-trees ([`BlockStore::into_archive`]).
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use chrono::NaiveDate;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use pst_reader::pst::codec::crypto;
use pst_reader::pst::format::block::BlockReader;
use pst_reader::pst::format::node::{NodeContext, NodeIndex};
use pst_reader::pst::format::source::ByteRangeReader;
use pst_reader::pst::format::subnode::SubNodeTree;
use pst_reader::pst::types::error::{PstError, Result};
use pst_reader::pst::types::models::{
    BlockId, CryptMethod, DescriptorEntry, NodeId, OffsetEntry, PstVariant, SubNodeEntry,
};

/// Bytes reserved for the header before the first block.
const DATA_START: usize = 0x400;

pub fn utf16(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

pub fn utf16z(text: &str) -> Vec<u8> {
    let mut bytes = utf16(text);
    bytes.extend_from_slice(&[0, 0]);
    bytes
}

/// Minutes since 1601-01-01 of a wall-clock time.
pub fn minutes(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> u32 {
    let time = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .expect("valid date");
    ((time.and_utc().timestamp() + 11_644_473_600) / 60) as u32
}

/// FILETIME ticks of a UTC wall-clock time.
pub fn filetime(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> i64 {
    i64::from(minutes(year, month, day, hour, minute)) * 60 * 10_000_000
}

fn put_id(out: &mut Vec<u8>, value: u64, width: usize) {
    match width {
        8 => out.extend_from_slice(&value.to_le_bytes()),
        _ => out.extend_from_slice(&(value as u32).to_le_bytes()),
    }
}

/// Lays out blocks and nodes of a synthetic archive.
pub struct BlockStore {
    pub variant: PstVariant,
    pub crypt: CryptMethod,
    data: Vec<u8>,
    offsets: Vec<OffsetEntry>,
    descriptors: Vec<DescriptorEntry>,
    next_block: u64,
    leaf_capacity: Option<usize>,
}

impl BlockStore {
    pub fn new(variant: PstVariant) -> Self {
        Self {
            variant,
            crypt: CryptMethod::None,
            data: vec![0u8; DATA_START],
            offsets: Vec::new(),
            descriptors: Vec::new(),
            next_block: 1,
            leaf_capacity: None,
        }
    }

    pub fn with_crypt(mut self, crypt: CryptMethod) -> Self {
        self.crypt = crypt;
        self
    }

    /// Caps the entries per B-tree leaf page so small archives get
    /// intermediate pages.
    pub fn with_leaf_capacity(mut self, entries: usize) -> Self {
        self.leaf_capacity = Some(entries);
        self
    }

    fn width(&self) -> usize {
        self.variant.id_width()
    }

    fn next_id(&mut self, internal: bool) -> BlockId {
        let id = (self.next_block << 2) | if internal { 0x2 } else { 0 };
        self.next_block += 1;
        BlockId(id)
    }

    fn push(&mut self, id: BlockId, stored: Vec<u8>, inflated_size: usize) -> BlockId {
        let file_offset = self.data.len() as u64;
        self.data.extend_from_slice(&stored);
        while self.data.len() % 64 != 0 {
            self.data.push(0);
        }
        self.offsets.push(OffsetEntry {
            id,
            file_offset,
            size: stored.len() as u32,
            inflated_size: inflated_size as u32,
            ref_count: 1,
        });
        id
    }

    /// Adds an external data block, encrypted with the store's crypt method.
    pub fn add_block(&mut self, bytes: &[u8]) -> BlockId {
        let id = self.next_id(false);
        let mut stored = bytes.to_vec();
        if self.crypt == CryptMethod::Permute {
            crypto::encode(&mut stored);
        }
        self.push(id, stored, bytes.len())
    }

    /// Adds an external block stored zlib-compressed.
    pub fn add_compressed_block(&mut self, bytes: &[u8]) -> BlockId {
        let id = self.next_id(false);
        let mut plain = bytes.to_vec();
        if self.crypt == CryptMethod::Permute {
            crypto::encode(&mut plain);
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&plain).expect("compress");
        let stored = encoder.finish().expect("compress");
        self.push(id, stored, bytes.len())
    }

    pub fn add_internal_block(&mut self, bytes: &[u8]) -> BlockId {
        let id = self.next_id(true);
        self.push(id, bytes.to_vec(), bytes.len())
    }

    /// Adds an XBLOCK over `children` declaring `total` bytes.
    pub fn add_xblock(&mut self, children: &[BlockId], total: u32) -> BlockId {
        let mut bytes = vec![0x01, 0x01];
        bytes.extend_from_slice(&(children.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&total.to_le_bytes());
        let width = self.width();
        for child in children {
            put_id(&mut bytes, child.0, width);
        }
        self.add_internal_block(&bytes)
    }

    /// Stores `blocks` as data blocks under one XBLOCK.
    pub fn add_data_tree(&mut self, blocks: &[Vec<u8>]) -> BlockId {
        let children: Vec<BlockId> = blocks.iter().map(|block| self.add_block(block)).collect();
        let total = blocks.iter().map(Vec::len).sum::<usize>() as u32;
        self.add_xblock(&children, total)
    }

    fn sub_node_header(&self, level: u8, count: usize) -> Vec<u8> {
        let mut bytes = vec![0x02, level];
        bytes.extend_from_slice(&(count as u16).to_le_bytes());
        if self.variant.is_unicode() {
            bytes.extend_from_slice(&[0; 4]);
        }
        bytes
    }

    /// Adds an SLBLOCK.
    pub fn add_sub_node_leaf(&mut self, entries: &[SubNodeEntry]) -> BlockId {
        let width = self.width();
        let mut bytes = self.sub_node_header(0, entries.len());
        for entry in entries {
            put_id(&mut bytes, u64::from(entry.id.0), width);
            put_id(&mut bytes, entry.data_block_id.0, width);
            put_id(&mut bytes, entry.sub_node_block_id.0, width);
        }
        self.add_internal_block(&bytes)
    }

    /// Adds an SIBLOCK whose children are `(first nid, SLBLOCK)` pairs.
    pub fn add_sub_node_index(&mut self, children: &[(NodeId, BlockId)]) -> BlockId {
        let width = self.width();
        let mut bytes = self.sub_node_header(1, children.len());
        for (id, block) in children {
            put_id(&mut bytes, u64::from(id.0), width);
            put_id(&mut bytes, block.0, width);
        }
        self.add_internal_block(&bytes)
    }

    pub fn add_node(&mut self, id: NodeId, data: BlockId, sub_nodes: BlockId, parent: NodeId) {
        self.descriptors.push(DescriptorEntry {
            id,
            data_block_id: data,
            sub_node_block_id: sub_nodes,
            parent_id: parent,
        });
    }

    /// Answers lookups straight from the recorded entries.
    pub fn into_context(self) -> NodeContext {
        let source: Arc<dyn ByteRangeReader> = Arc::new(self.data);
        let index = MemoryIndex {
            descriptors: self.descriptors.iter().map(|entry| (entry.id, *entry)).collect(),
            offsets: self
                .offsets
                .iter()
                .map(|entry| (entry.id.lookup_key(), *entry))
                .collect(),
            blocks: BlockReader::new(Arc::clone(&source), self.crypt),
            variant: self.variant,
        };
        NodeContext::new(source, Arc::new(index), self.variant, self.crypt)
    }

    /// Writes the header and both B-trees, returning the archive bytes.
    pub fn into_archive(mut self) -> Vec<u8> {
        let width = self.width();
        let variant = self.variant;

        let mut node_leaves: Vec<(u64, Vec<u8>)> = self
            .descriptors
            .iter()
            .map(|entry| {
                let mut bytes = Vec::new();
                put_id(&mut bytes, u64::from(entry.id.0), width);
                put_id(&mut bytes, entry.data_block_id.0, width);
                put_id(&mut bytes, entry.sub_node_block_id.0, width);
                bytes.extend_from_slice(&entry.parent_id.0.to_le_bytes());
                if variant.is_unicode() {
                    bytes.extend_from_slice(&[0; 4]);
                }
                (u64::from(entry.id.0), bytes)
            })
            .collect();
        let mut block_leaves: Vec<(u64, Vec<u8>)> = self
            .offsets
            .iter()
            .map(|entry| {
                let mut bytes = Vec::new();
                put_id(&mut bytes, entry.id.0, width);
                put_id(&mut bytes, entry.file_offset, width);
                bytes.extend_from_slice(&(entry.size as u16).to_le_bytes());
                match variant {
                    PstVariant::Unicode4k => {
                        bytes.extend_from_slice(&(entry.inflated_size as u16).to_le_bytes());
                        bytes.extend_from_slice(&entry.ref_count.to_le_bytes());
                    }
                    PstVariant::Unicode => {
                        bytes.extend_from_slice(&(entry.ref_count as u16).to_le_bytes());
                        bytes.extend_from_slice(&[0; 4]);
                    }
                    PstVariant::Ansi => {
                        bytes.extend_from_slice(&(entry.ref_count as u16).to_le_bytes());
                    }
                }
                (entry.id.0, bytes)
            })
            .collect();
        node_leaves.sort_by_key(|(key, _)| *key);
        block_leaves.sort_by_key(|(key, _)| *key);

        let (node_size, block_size) = match variant {
            PstVariant::Ansi => (16, 12),
            PstVariant::Unicode | PstVariant::Unicode4k => (32, 24),
        };
        let node_root = self.write_tree(&node_leaves, node_size, 0x81);
        let block_root = self.write_tree(&block_leaves, block_size, 0x80);
        let eof = self.data.len() as u64;

        let header = &mut self.data[..DATA_START];
        header[0..4].copy_from_slice(b"!BDN");
        header[8..10].copy_from_slice(b"SM");
        let version: u16 = match variant {
            PstVariant::Ansi => 14,
            PstVariant::Unicode => 23,
            PstVariant::Unicode4k => 36,
        };
        LittleEndian::write_u16(&mut header[10..12], version);
        let crypt = match self.crypt {
            CryptMethod::None => 0,
            CryptMethod::Permute => 1,
            CryptMethod::Cyclic => 2,
        };
        if variant.is_unicode() {
            LittleEndian::write_u64(&mut header[0xB8..0xC0], eof);
            LittleEndian::write_u64(&mut header[0xE0..0xE8], node_root);
            LittleEndian::write_u64(&mut header[0xF0..0xF8], block_root);
            header[0x201] = crypt;
        } else {
            LittleEndian::write_u32(&mut header[0xA8..0xAC], eof as u32);
            LittleEndian::write_u32(&mut header[0xBC..0xC0], node_root as u32);
            LittleEndian::write_u32(&mut header[0xC4..0xC8], block_root as u32);
            header[0x1CD] = crypt;
        }
        self.data
    }

    fn write_tree(&mut self, leaves: &[(u64, Vec<u8>)], entry_size: usize, page_type: u8) -> u64 {
        let area = entries_area(self.variant);
        let mut capacity = area / entry_size;
        if let Some(limit) = self.leaf_capacity {
            capacity = capacity.min(limit);
        }
        let chunks: Vec<&[(u64, Vec<u8>)]> = if leaves.is_empty() {
            vec![leaves]
        } else {
            leaves.chunks(capacity).collect()
        };
        if chunks.len() == 1 {
            let entries: Vec<Vec<u8>> = chunks[0].iter().map(|(_, bytes)| bytes.clone()).collect();
            return self.write_page(&entries, entry_size, 0, page_type);
        }

        let width = self.width();
        let mut children = Vec::new();
        for chunk in chunks {
            let entries: Vec<Vec<u8>> = chunk.iter().map(|(_, bytes)| bytes.clone()).collect();
            let offset = self.write_page(&entries, entry_size, 0, page_type);
            let mut child = Vec::new();
            put_id(&mut child, chunk[0].0, width);
            put_id(&mut child, 0, width);
            put_id(&mut child, offset, width);
            children.push(child);
        }
        self.write_page(&children, 3 * width, 1, page_type)
    }

    fn write_page(&mut self, entries: &[Vec<u8>], entry_size: usize, level: u8, page_type: u8) -> u64 {
        let page_size = self.variant.page_size();
        let mut page = vec![0u8; page_size];
        for (index, entry) in entries.iter().enumerate() {
            page[index * entry_size..(index + 1) * entry_size].copy_from_slice(entry);
        }
        let max = (entries_area(self.variant) / entry_size) as u16;
        match self.variant {
            PstVariant::Ansi => {
                page[496] = entries.len() as u8;
                page[497] = max as u8;
                page[498] = entry_size as u8;
                page[499] = level;
                page[500] = page_type;
                page[501] = page_type;
            }
            PstVariant::Unicode => {
                page[488] = entries.len() as u8;
                page[489] = max as u8;
                page[490] = entry_size as u8;
                page[491] = level;
                page[496] = page_type;
                page[497] = page_type;
            }
            PstVariant::Unicode4k => {
                LittleEndian::write_u16(&mut page[4056..4058], entries.len() as u16);
                LittleEndian::write_u16(&mut page[4058..4060], max);
                page[4060] = entry_size as u8;
                page[4061] = level;
                page[4080] = page_type;
                page[4081] = page_type;
            }
        }
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(&page);
        offset
    }
}

fn entries_area(variant: PstVariant) -> usize {
    match variant {
        PstVariant::Ansi => 496,
        PstVariant::Unicode => 488,
        PstVariant::Unicode4k => 4056,
    }
}

/// Lookup services over in-memory maps.
pub struct MemoryIndex {
    descriptors: HashMap<NodeId, DescriptorEntry>,
    offsets: HashMap<u64, OffsetEntry>,
    blocks: BlockReader,
    variant: PstVariant,
}

impl NodeIndex for MemoryIndex {
    fn descriptor(&self, id: NodeId) -> Result<DescriptorEntry> {
        self.descriptors
            .get(&id)
            .copied()
            .ok_or(PstError::NodeNotFound(id.0))
    }

    fn offset(&self, id: BlockId) -> Result<OffsetEntry> {
        self.offsets
            .get(&id.lookup_key())
            .copied()
            .ok_or(PstError::BlockNotFound(id.0))
    }

    fn sub_nodes(&self, id: BlockId) -> Result<Arc<SubNodeTree>> {
        Ok(Arc::new(SubNodeTree::open(self, &self.blocks, self.variant, id)?))
    }

    fn children(&self, parent: NodeId) -> Result<Vec<DescriptorEntry>> {
        let mut children: Vec<DescriptorEntry> = self
            .descriptors
            .values()
            .filter(|entry| entry.parent_id == parent && entry.id != parent)
            .copied()
            .collect();
        children.sort_by_key(|entry| entry.id);
        Ok(children)
    }
}

/// Builds a single-block heap.
pub struct HeapBuilder {
    client: u8,
    allocations: Vec<Vec<u8>>,
    root: u32,
}

impl HeapBuilder {
    pub fn new(client: u8) -> Self {
        Self {
            client,
            allocations: Vec::new(),
            root: 0,
        }
    }

    /// Adds an allocation and returns its heap id.
    pub fn alloc(&mut self, bytes: &[u8]) -> u32 {
        self.allocations.push(bytes.to_vec());
        (self.allocations.len() as u32) << 5
    }

    pub fn set_root(&mut self, root: u32) {
        self.root = root;
    }

    /// Adds a BTree-on-heap with a single leaf and returns its header's id.
    pub fn bth(&mut self, key_size: u8, value_size: u8, records: &[Vec<u8>]) -> u32 {
        self.bth_with_levels(key_size, value_size, 0, records)
    }

    pub fn bth_with_levels(
        &mut self,
        key_size: u8,
        value_size: u8,
        levels: u8,
        records: &[Vec<u8>],
    ) -> u32 {
        let root = if records.is_empty() {
            0
        } else {
            self.alloc(&records.concat())
        };
        let mut header = vec![0xB5, key_size, value_size, levels];
        header.extend_from_slice(&root.to_le_bytes());
        self.alloc(&header)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; 12];
        out[2] = 0xEC;
        out[3] = self.client;
        LittleEndian::write_u32(&mut out[4..8], self.root);
        let mut offsets = vec![out.len() as u16];
        for allocation in &self.allocations {
            out.extend_from_slice(allocation);
            offsets.push(out.len() as u16);
        }
        if out.len() % 2 == 1 {
            out.push(0);
        }
        let map_offset = out.len() as u16;
        out.extend_from_slice(&(self.allocations.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        for offset in offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        LittleEndian::write_u16(&mut out[0..2], map_offset);
        out
    }
}

/// Builds a property context.
pub struct PcBuilder {
    heap: HeapBuilder,
    properties: BTreeMap<u16, (u16, u32)>,
}

impl Default for PcBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PcBuilder {
    pub fn new() -> Self {
        Self {
            heap: HeapBuilder::new(0xBC),
            properties: BTreeMap::new(),
        }
    }

    pub fn inline(mut self, id: u16, prop_type: u16, value: u32) -> Self {
        self.properties.insert(id, (prop_type, value));
        self
    }

    pub fn int32(self, id: u16, value: i32) -> Self {
        self.inline(id, 0x0003, value as u32)
    }

    pub fn int16(self, id: u16, value: i16) -> Self {
        self.inline(id, 0x0002, u32::from(value as u16))
    }

    pub fn boolean(self, id: u16, value: bool) -> Self {
        self.inline(id, 0x000B, u32::from(value))
    }

    /// A value stored in the heap.
    pub fn heap_value(mut self, id: u16, prop_type: u16, bytes: &[u8]) -> Self {
        let hid = self.heap.alloc(bytes);
        self.properties.insert(id, (prop_type, hid));
        self
    }

    pub fn unicode(self, id: u16, text: &str) -> Self {
        self.heap_value(id, 0x001F, &utf16(text))
    }

    pub fn string8(self, id: u16, bytes: &[u8]) -> Self {
        self.heap_value(id, 0x001E, bytes)
    }

    pub fn binary(self, id: u16, bytes: &[u8]) -> Self {
        self.heap_value(id, 0x0102, bytes)
    }

    pub fn time(self, id: u16, filetime: i64) -> Self {
        self.heap_value(id, 0x0040, &filetime.to_le_bytes())
    }

    pub fn double(self, id: u16, value: f64) -> Self {
        self.heap_value(id, 0x0005, &value.to_le_bytes())
    }

    /// A value held by sub-node `id`.
    pub fn sub_node(mut self, id: u16, prop_type: u16, node: NodeId) -> Self {
        self.properties.insert(id, (prop_type, node.0));
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        let records: Vec<Vec<u8>> = self
            .properties
            .iter()
            .map(|(id, (prop_type, value))| {
                let mut record = Vec::with_capacity(8);
                record.extend_from_slice(&id.to_le_bytes());
                record.extend_from_slice(&prop_type.to_le_bytes());
                record.extend_from_slice(&value.to_le_bytes());
                record
            })
            .collect();
        let root = self.heap.bth(2, 6, &records);
        self.heap.set_root(root);
        self.heap.build()
    }
}

/// A table cell value.
pub enum Cell {
    /// Stored in place, truncated to the column width.
    Inline(u64),
    /// Stored in the table's heap; the row holds the heap id.
    Heap(Vec<u8>),
    /// A raw hnid, e.g. a sub-node id.
    Hnid(u32),
}

struct TcColumn {
    id: u16,
    prop_type: u16,
    offset: u16,
    size: u8,
    bit: u8,
}

fn column_width(prop_type: u16) -> u8 {
    match prop_type {
        0x0005 | 0x0006 | 0x0007 | 0x0014 | 0x0040 => 8,
        0x0002 => 2,
        0x000B => 1,
        _ => 4,
    }
}

/// Builds a table context.
pub struct TcBuilder {
    heap: HeapBuilder,
    columns: Vec<TcColumn>,
    ends: [u16; 4],
    rows: Vec<(u32, Vec<(u16, Cell)>)>,
    row_index_width: u8,
}

impl TcBuilder {
    pub fn new(columns: &[(u16, u16)]) -> Self {
        Self::with_padding(columns, 0)
    }

    /// Lays out columns the usual way (8 and 4 byte values, then 2, then 1,
    /// then the existence bitmap) with `padding` extra bytes after the
    /// 4-byte area.
    pub fn with_padding(columns: &[(u16, u16)], padding: u16) -> Self {
        let mut laid_out: Vec<TcColumn> = columns
            .iter()
            .enumerate()
            .map(|(bit, &(id, prop_type))| TcColumn {
                id,
                prop_type,
                offset: 0,
                size: column_width(prop_type),
                bit: bit as u8,
            })
            .collect();
        let mut cursor = 0u16;
        let mut ends = [0u16; 4];
        for (area, widths) in [&[8u8, 4][..], &[2][..], &[1][..]].iter().enumerate() {
            for column in laid_out.iter_mut().filter(|column| widths.contains(&column.size)) {
                column.offset = cursor;
                cursor += u16::from(column.size);
            }
            if area == 0 {
                cursor += padding;
            }
            ends[area] = cursor;
        }
        ends[3] = cursor + ((columns.len() as u16) + 7) / 8;
        Self {
            heap: HeapBuilder::new(0x7C),
            columns: laid_out,
            ends,
            rows: Vec::new(),
            row_index_width: 4,
        }
    }

    /// Uses the 2-byte row index values of ANSI files.
    pub fn ansi(mut self) -> Self {
        self.row_index_width = 2;
        self
    }

    pub fn row_size(&self) -> usize {
        self.ends[3] as usize
    }

    pub fn row(mut self, row_id: u32, cells: Vec<(u16, Cell)>) -> Self {
        self.rows.push((row_id, cells));
        self
    }

    fn encode_rows(&mut self) -> Vec<Vec<u8>> {
        let rows = std::mem::take(&mut self.rows);
        let mut encoded = Vec::with_capacity(rows.len());
        for (row_id, cells) in &rows {
            let mut bytes = vec![0u8; self.row_size()];
            for (id, cell) in cells {
                let column = self
                    .columns
                    .iter()
                    .find(|column| column.id == *id)
                    .expect("cell for a declared column");
                let (offset, size, bit) = (column.offset as usize, column.size as usize, column.bit as usize);
                let value: u64 = match cell {
                    Cell::Inline(value) => *value,
                    Cell::Heap(data) => u64::from(self.heap.alloc(data)),
                    Cell::Hnid(hnid) => u64::from(*hnid),
                };
                bytes[offset..offset + size].copy_from_slice(&value.to_le_bytes()[..size]);
                let bitmap = self.ends[2] as usize;
                bytes[bitmap + bit / 8] |= 0x80 >> (bit % 8);
            }
            let _ = row_id;
            encoded.push(bytes);
        }
        self.rows = rows;
        encoded
    }

    /// Builds the table with its row matrix in the heap.
    pub fn build(mut self) -> Vec<u8> {
        let rows = self.encode_rows();
        let rows_hid = if rows.is_empty() {
            0
        } else {
            self.heap.alloc(&rows.concat())
        };
        self.finish(rows_hid)
    }

    /// Builds the table with its row matrix in sub-node `rows_node`, packed
    /// into blocks of `block_size` bytes. Returns the heap and the blocks.
    pub fn build_with_row_stream(mut self, rows_node: NodeId, block_size: usize) -> (Vec<u8>, Vec<Vec<u8>>) {
        let rows = self.encode_rows();
        let per_block = block_size / self.row_size();
        let chunks: Vec<&[Vec<u8>]> = rows.chunks(per_block).collect();
        let count = chunks.len();
        let blocks = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut block = chunk.concat();
                if index + 1 < count {
                    block.resize(block_size, 0xCD);
                }
                block
            })
            .collect();
        (self.finish(rows_node.0), blocks)
    }

    fn finish(mut self, rows_hnid: u32) -> Vec<u8> {
        let width = self.row_index_width as usize;
        let records: Vec<Vec<u8>> = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, (row_id, _))| {
                let mut record = row_id.to_le_bytes().to_vec();
                record.extend_from_slice(&(position as u32).to_le_bytes()[..width]);
                record
            })
            .collect();
        let row_index = self.heap.bth(4, self.row_index_width, &records);

        let mut info = vec![0x7C, self.columns.len() as u8];
        for end in self.ends {
            info.extend_from_slice(&end.to_le_bytes());
        }
        info.extend_from_slice(&row_index.to_le_bytes());
        info.extend_from_slice(&rows_hnid.to_le_bytes());
        info.extend_from_slice(&0u32.to_le_bytes());
        for column in &self.columns {
            let tag = (u32::from(column.id) << 16) | u32::from(column.prop_type);
            info.extend_from_slice(&tag.to_le_bytes());
            info.extend_from_slice(&column.offset.to_le_bytes());
            info.push(column.size);
            info.push(column.bit);
        }
        let root = self.heap.alloc(&info);
        self.heap.set_root(root);
        self.heap.build()
    }
}

/// The three streams of a named property map.
pub struct NamedMapStreams {
    pub guids: Vec<u8>,
    pub entries: Vec<u8>,
    pub strings: Vec<u8>,
}

impl NamedMapStreams {
    pub fn new(guids: &[uuid::Uuid]) -> Self {
        Self {
            guids: guids.iter().flat_map(|guid| guid.to_bytes_le()).collect(),
            entries: Vec::new(),
            strings: Vec::new(),
        }
    }

    fn entry(&mut self, property: u32, guid: u16, index: u16) {
        self.entries.extend_from_slice(&property.to_le_bytes());
        self.entries.extend_from_slice(&guid.to_le_bytes());
        self.entries.extend_from_slice(&index.to_le_bytes());
    }

    /// A numeric name in the set at GUID stream position `set` (0-based);
    /// mapped to 0x8000 + `index`.
    pub fn numeric(mut self, lid: u32, set: u16, index: u16) -> Self {
        self.entry(lid, (set + 3) << 1, index);
        self
    }

    /// A string name in PS_PUBLIC_STRINGS.
    pub fn public_string(mut self, name: &str, index: u16) -> Self {
        let offset = self.strings.len() as u32;
        let encoded = utf16(name);
        self.strings.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        self.strings.extend_from_slice(&encoded);
        while self.strings.len() % 4 != 0 {
            self.strings.push(0);
        }
        self.entry(offset, (2 << 1) | 1, index);
        self
    }

    /// The map as a property context heap.
    pub fn to_property_context(&self) -> Vec<u8> {
        PcBuilder::new()
            .binary(0x0002, &self.guids)
            .binary(0x0003, &self.entries)
            .binary(0x0004, &self.strings)
            .build()
    }
}

/// A weekly (Mondays) recurrence from 2024-01-01 09:00 for ten occurrences,
/// with the 2024-01-08 instance moved to 10:00 and renamed.
pub fn weekly_recurrence_blob() -> Vec<u8> {
    let mut blob = Vec::new();
    let u16le = |blob: &mut Vec<u8>, value: u16| blob.extend_from_slice(&value.to_le_bytes());
    let u32le = |blob: &mut Vec<u8>, value: u32| blob.extend_from_slice(&value.to_le_bytes());

    u16le(&mut blob, 0x3004);
    u16le(&mut blob, 0x3004);
    u16le(&mut blob, 0x200B);
    u16le(&mut blob, 0x0001);
    u16le(&mut blob, 0);
    u32le(&mut blob, 0);
    u32le(&mut blob, 1);
    u32le(&mut blob, 0);
    u32le(&mut blob, 0x0000_0002);
    u32le(&mut blob, 0x2022);
    u32le(&mut blob, 10);
    u32le(&mut blob, 0);
    u32le(&mut blob, 1);
    u32le(&mut blob, minutes(2024, 1, 8, 0, 0));
    u32le(&mut blob, 1);
    u32le(&mut blob, minutes(2024, 1, 8, 0, 0));
    u32le(&mut blob, minutes(2024, 1, 1, 0, 0));
    u32le(&mut blob, minutes(2024, 3, 4, 0, 0));
    u32le(&mut blob, 0x3006);
    u32le(&mut blob, 0x3009);
    u32le(&mut blob, 540);
    u32le(&mut blob, 600);

    u16le(&mut blob, 1);
    u32le(&mut blob, minutes(2024, 1, 8, 10, 0));
    u32le(&mut blob, minutes(2024, 1, 8, 11, 0));
    u32le(&mut blob, minutes(2024, 1, 8, 9, 0));
    u16le(&mut blob, 0x0011);
    u16le(&mut blob, 6);
    u16le(&mut blob, 5);
    blob.extend_from_slice(b"Moved");
    u16le(&mut blob, 7);
    u16le(&mut blob, 6);
    blob.extend_from_slice(b"Room 2");

    u32le(&mut blob, 0);

    u32le(&mut blob, 4);
    u32le(&mut blob, 1);
    u32le(&mut blob, 0);
    u32le(&mut blob, minutes(2024, 1, 8, 10, 0));
    u32le(&mut blob, minutes(2024, 1, 8, 11, 0));
    u32le(&mut blob, minutes(2024, 1, 8, 9, 0));
    u16le(&mut blob, 5);
    blob.extend_from_slice(&utf16("Moved"));
    u16le(&mut blob, 6);
    blob.extend_from_slice(&utf16("Room 2"));
    u32le(&mut blob, 0);

    u32le(&mut blob, 0);
    blob
}
