//! Core data structures for the archive's node database layer.
//!
//! This module defines the fundamental types used throughout the library:
//! - File variant and encryption settings
//! - Node and block identifiers
//! - Leaf records of the node and block B-trees

use std::fmt;

use super::error::{PstError, Result};

/// On-disk layout variant, selected by the header's `wVer` field.
///
/// Every fixed-width decode branches on it: id and offset widths, B-tree page
/// geometry, leaf record widths and the table row block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PstVariant {
    /// 32-bit ids and offsets, 512-byte pages.
    Ansi,
    /// 64-bit ids and offsets, 512-byte pages.
    Unicode,
    /// 64-bit ids and offsets, 4096-byte pages, optionally compressed blocks.
    Unicode4k,
}

impl PstVariant {
    /// Returns the byte width of block ids, file offsets and B-tree keys.
    ///
    /// - ANSI: 4 bytes (u32)
    /// - Unicode/4K: 8 bytes (u64)
    pub fn id_width(&self) -> usize {
        match self {
            PstVariant::Ansi => 4,
            PstVariant::Unicode | PstVariant::Unicode4k => 8,
        }
    }

    /// Returns the size of one B-tree page.
    pub fn page_size(&self) -> usize {
        match self {
            PstVariant::Ansi | PstVariant::Unicode => 512,
            PstVariant::Unicode4k => 4096,
        }
    }

    /// Returns the maximum usable bytes per data block, which is also the
    /// chunk size table rows are packed into.
    ///
    /// - ANSI: 8192 minus a 12-byte block trailer
    /// - Unicode/4K: 8192 minus a 16-byte block trailer
    pub fn row_block_size(&self) -> usize {
        match self {
            PstVariant::Ansi => 8180,
            PstVariant::Unicode | PstVariant::Unicode4k => 8176,
        }
    }

    pub fn is_unicode(&self) -> bool {
        !matches!(self, PstVariant::Ansi)
    }
}

impl TryFrom<u16> for PstVariant {
    type Error = PstError;
    fn try_from(version: u16) -> Result<Self> {
        match version {
            14 | 15 => Ok(Self::Ansi),
            21 | 23 => Ok(Self::Unicode),
            36 => Ok(Self::Unicode4k),
            _ => Err(PstError::UnsupportedVariant(version)),
        }
    }
}

impl fmt::Display for PstVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PstVariant::Ansi => write!(f, "ANSI"),
            PstVariant::Unicode => write!(f, "Unicode"),
            PstVariant::Unicode4k => write!(f, "Unicode (4K pages)"),
        }
    }
}

/// Block encryption scheme declared in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    None,
    /// Byte substitution ("compressible encryption").
    Permute,
    /// Keyed rotation ("high encryption").
    Cyclic,
}

impl TryFrom<u8> for CryptMethod {
    type Error = PstError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Permute),
            2 => Ok(Self::Cyclic),
            _ => Err(PstError::InvalidFormat(format!("Unknown crypt method: {}", value))),
        }
    }
}

/// Kind of a node, stored in the low 5 bits of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    HeapNode,
    Internal,
    NormalFolder,
    SearchFolder,
    NormalMessage,
    Attachment,
    SearchUpdateQueue,
    SearchCriteria,
    AssociatedMessage,
    ContentsTableIndex,
    ReceiveFolderTable,
    OutgoingQueueTable,
    HierarchyTable,
    ContentsTable,
    AssociatedContentsTable,
    SearchContentsTable,
    AttachmentTable,
    RecipientTable,
    SearchTableIndex,
    Ltp,
    Other(u8),
}

impl From<u8> for NodeType {
    fn from(value: u8) -> Self {
        match value & 0x1F {
            0x00 => Self::HeapNode,
            0x01 => Self::Internal,
            0x02 => Self::NormalFolder,
            0x03 => Self::SearchFolder,
            0x04 => Self::NormalMessage,
            0x05 => Self::Attachment,
            0x06 => Self::SearchUpdateQueue,
            0x07 => Self::SearchCriteria,
            0x08 => Self::AssociatedMessage,
            0x0A => Self::ContentsTableIndex,
            0x0B => Self::ReceiveFolderTable,
            0x0C => Self::OutgoingQueueTable,
            0x0D => Self::HierarchyTable,
            0x0E => Self::ContentsTable,
            0x0F => Self::AssociatedContentsTable,
            0x10 => Self::SearchContentsTable,
            0x11 => Self::AttachmentTable,
            0x12 => Self::RecipientTable,
            0x13 => Self::SearchTableIndex,
            0x1F => Self::Ltp,
            other => Self::Other(other),
        }
    }
}

/// A 32-bit node id. The low 5 bits carry the [`NodeType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The message store property context.
    pub const MESSAGE_STORE: NodeId = NodeId(0x21);
    /// The named-property map.
    pub const NAME_TO_ID_MAP: NodeId = NodeId(0x61);
    /// The root folder of the hierarchy.
    pub const ROOT_FOLDER: NodeId = NodeId(0x122);
    /// Sub-node of a message holding its attachment table.
    pub const ATTACHMENT_TABLE: NodeId = NodeId(0x671);
    /// Sub-node of a message holding its recipient table.
    pub const RECIPIENT_TABLE: NodeId = NodeId(0x692);

    pub fn item_type(&self) -> u8 {
        (self.0 & 0x1F) as u8
    }

    pub fn node_type(&self) -> NodeType {
        NodeType::from(self.item_type())
    }

    /// The id with its type bits stripped.
    pub fn index(&self) -> u32 {
        self.0 >> 5
    }

    /// Builds the id of a sibling node sharing this id's index, e.g. the
    /// hierarchy table of a folder.
    pub fn with_type(&self, item_type: u8) -> NodeId {
        NodeId((self.0 & !0x1F) | u32::from(item_type & 0x1F))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A block id. Bit 1 marks internal (metadata) blocks; bit 0 is reserved and
/// ignored for lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockId(pub u64);

impl BlockId {
    pub fn is_internal(&self) -> bool {
        self.0 & 0x02 != 0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// The key used to search the block B-tree.
    pub fn lookup_key(&self) -> u64 {
        self.0 & !0x01
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Leaf record of the node B-tree: one logical record of the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorEntry {
    pub id: NodeId,
    /// Block (or data tree) holding the node's contents.
    pub data_block_id: BlockId,
    /// Block holding the node's sub-node tree, or null.
    pub sub_node_block_id: BlockId,
    pub parent_id: NodeId,
}

impl DescriptorEntry {
    pub fn item_type(&self) -> u8 {
        self.id.item_type()
    }

    pub fn kind(&self) -> NodeType {
        self.id.node_type()
    }
}

/// Leaf record of the block B-tree: one physical block's location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetEntry {
    pub id: BlockId,
    /// Absolute byte offset of the block in the file.
    pub file_offset: u64,
    /// Stored size of the block data (excluding padding and trailer).
    pub size: u32,
    /// Size after inflation. Equal to `size` unless the block is compressed.
    pub inflated_size: u32,
    pub ref_count: u32,
}

impl OffsetEntry {
    pub fn is_compressed(&self) -> bool {
        self.inflated_size != self.size
    }
}

/// Entry of a per-node sub-node tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubNodeEntry {
    pub id: NodeId,
    pub data_block_id: BlockId,
    pub sub_node_block_id: BlockId,
}
