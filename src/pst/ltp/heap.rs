//! Heap-on-node: an allocator layout inside a node's blocks.
//!
//! # Layout
//! ```text
//! first block:  ibHnpm u16, bSig u8 (0xEC), bClientSig u8, hidUserRoot u32, ...
//! other blocks: ibHnpm u16, ...
//! page map (at ibHnpm): cAlloc u16, cFree u16, rgibAlloc[cAlloc + 1] u16
//! ```
//!
//! Allocation `i` (1-based) of a block spans `rgibAlloc[i-1]..rgibAlloc[i]`.
//! A heap id packs a type (bits 0-4, zero for heap ids), the allocation index
//! (bits 5-15) and the block index (bits 16-31).

use std::borrow::Cow;
use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian};
use log::trace;

use crate::pst::format::node::Node;
use crate::pst::types::error::{PstError, Result};
use crate::pst::types::models::NodeId;
use crate::pst::utils::slice_at;

pub const HEAP_SIGNATURE: u8 = 0xEC;
/// Client signature of a table context heap.
pub const CLIENT_TABLE_CONTEXT: u8 = 0x7C;
/// Client signature of a property context heap.
pub const CLIENT_PROPERTY_CONTEXT: u8 = 0xBC;

const HEAP_HEADER_SIZE: usize = 8;

/// A heap id: the address of one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(pub u32);

impl HeapId {
    pub fn id_type(&self) -> u8 {
        (self.0 & 0x1F) as u8
    }

    /// 1-based allocation index within the block.
    pub fn allocation_index(&self) -> usize {
        ((self.0 >> 5) & 0x7FF) as usize
    }

    pub fn block_index(&self) -> usize {
        (self.0 >> 16) as usize
    }
}

/// Allocation boundaries of one heap block.
#[derive(Debug)]
struct PageMap {
    offsets: Vec<u16>,
}

/// A node's data interpreted as a heap.
pub struct HeapNode {
    node: Node,
    client_signature: u8,
    user_root: HeapId,
    page_maps: Vec<OnceLock<PageMap>>,
}

impl std::fmt::Debug for HeapNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapNode")
            .field("node", &self.node.id())
            .field("client_signature", &self.client_signature)
            .field("user_root", &self.user_root)
            .finish()
    }
}

impl HeapNode {
    /// Validates the heap header in the node's first block.
    ///
    /// # Errors
    /// - [`PstError::BadSignature`] if `bSig` is not 0xEC
    /// - [`PstError::InvalidFormat`] if the client signature is neither a table
    ///   nor a property context
    pub fn open(node: Node) -> Result<Self> {
        if node.data().block_count() == 0 {
            return Err(PstError::InvalidFormat(format!(
                "Node {} has no data for a heap",
                node.id()
            )));
        }
        let first = node.data().block(0)?;
        let header = slice_at(first, 0, HEAP_HEADER_SIZE)?;
        if header[2] != HEAP_SIGNATURE {
            return Err(PstError::BadSignature {
                context: "heap node",
                expected: u32::from(HEAP_SIGNATURE),
                found: u32::from(header[2]),
            });
        }
        let client_signature = header[3];
        if client_signature != CLIENT_TABLE_CONTEXT && client_signature != CLIENT_PROPERTY_CONTEXT {
            return Err(PstError::InvalidFormat(format!(
                "Node {} has unknown heap client signature {:#04x}",
                node.id(),
                client_signature
            )));
        }
        let user_root = HeapId(LittleEndian::read_u32(&header[4..8]));
        trace!(
            "Heap on node {}: client={:#04x}, root={:#x}, blocks={}",
            node.id(),
            client_signature,
            user_root.0,
            node.data().block_count()
        );
        let page_maps = (0..node.data().block_count()).map(|_| OnceLock::new()).collect();
        Ok(Self {
            node,
            client_signature,
            user_root,
            page_maps,
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn client_signature(&self) -> u8 {
        self.client_signature
    }

    pub fn user_root(&self) -> HeapId {
        self.user_root
    }

    fn page_map(&self, block_index: usize) -> Result<&PageMap> {
        let slot = self
            .page_maps
            .get(block_index)
            .ok_or(PstError::HeapIdNotFound((block_index as u32) << 16))?;
        if let Some(map) = slot.get() {
            return Ok(map);
        }
        let block = self.node.data().block(block_index)?;
        let map_offset = LittleEndian::read_u16(slice_at(block, 0, 2)?) as usize;
        let counts = slice_at(block, map_offset, 4)?;
        let allocations = LittleEndian::read_u16(&counts[0..2]) as usize;
        let table = slice_at(block, map_offset + 4, (allocations + 1) * 2)?;
        let offsets = table.chunks_exact(2).map(LittleEndian::read_u16).collect();
        Ok(slot.get_or_init(|| PageMap { offsets }))
    }

    /// Returns the bytes of one heap allocation.
    pub fn heap_slice(&self, id: HeapId) -> Result<&[u8]> {
        let map = self.page_map(id.block_index())?;
        let index = id.allocation_index();
        if index == 0 || index >= map.offsets.len() {
            return Err(PstError::HeapIdNotFound(id.0));
        }
        let start = map.offsets[index - 1] as usize;
        let end = map.offsets[index] as usize;
        if end < start {
            return Err(PstError::InvalidFormat(format!(
                "Heap allocation {:#x} ends before it starts",
                id.0
            )));
        }
        let block = self.node.data().block(id.block_index())?;
        slice_at(block, start, end - start)
    }

    /// Resolves an hnid: either a heap id or the id of a sub-node.
    ///
    /// - 0 resolves to an empty value
    /// - an id present in the sub-node tree resolves to that node's data
    /// - any other id with non-zero type bits is rejected as unsupported
    /// - otherwise the id addresses a heap allocation
    pub fn resolve(&self, hnid: u32) -> Result<Cow<'_, [u8]>> {
        if hnid == 0 {
            return Ok(Cow::Borrowed(&[]));
        }
        if self.node.sub_nodes().contains(NodeId(hnid)) {
            let sub_node = self.node.open_sub_node(NodeId(hnid))?;
            return Ok(Cow::Owned(sub_node.data().read_all()?));
        }
        let id = HeapId(hnid);
        if id.id_type() != 0 {
            return Err(PstError::Unsupported(format!(
                "hnid {:#x} is neither a heap id nor a known sub-node",
                hnid
            )));
        }
        self.heap_slice(id).map(Cow::Borrowed)
    }
}
