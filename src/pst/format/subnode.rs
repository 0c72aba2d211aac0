//! Per-node sub-node trees.
//!
//! A node may own a small secondary tree of child nodes holding values too
//! large for its heap (and, for messages, its attachment and recipient
//! tables). The tree is at most two levels deep:
//!
//! ```text
//! SLBLOCK (cLevel 0): btype=0x02, cLevel, cEnt u16, [pad u32], cEnt × (nid, data bid, sub bid)
//! SIBLOCK (cLevel 1): btype=0x02, cLevel, cEnt u16, [pad u32], cEnt × (nid, SLBLOCK bid)
//! ```
//!
//! The padding word is present in the Unicode layouts only.

use std::collections::BTreeMap;

use log::trace;

use crate::pst::types::error::{PstError, Result};
use crate::pst::types::models::{BlockId, NodeId, PstVariant, SubNodeEntry};
use crate::pst::utils::id_at;

use super::block::BlockReader;
use super::node::NodeIndex;

const SUB_NODE_SIGNATURE: u8 = 0x02;

/// The sub-node entries of one node, keyed by node id.
#[derive(Debug, Clone, Default)]
pub struct SubNodeTree {
    entries: BTreeMap<NodeId, SubNodeEntry>,
}

impl SubNodeTree {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = SubNodeEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|entry| (entry.id, entry)).collect(),
        }
    }

    /// Reads the sub-node tree rooted at `block_id`.
    ///
    /// An SIBLOCK must point only at SLBLOCKs; anything deeper is rejected.
    pub fn open(
        index: &dyn NodeIndex,
        reader: &BlockReader,
        variant: PstVariant,
        block_id: BlockId,
    ) -> Result<Self> {
        if block_id.is_null() {
            return Ok(Self::empty());
        }
        let mut entries = BTreeMap::new();
        let root = read_sub_node_block(index, reader, variant, block_id)?;
        match root {
            SubNodeBlock::Leaf(leaf) => {
                entries.extend(leaf.into_iter().map(|entry| (entry.id, entry)));
            }
            SubNodeBlock::Intermediate(children) => {
                for (_, child) in children {
                    match read_sub_node_block(index, reader, variant, child)? {
                        SubNodeBlock::Leaf(leaf) => {
                            entries.extend(leaf.into_iter().map(|entry| (entry.id, entry)));
                        }
                        SubNodeBlock::Intermediate(_) => {
                            return Err(PstError::InvalidFormat(format!(
                                "SIBLOCK {} points at another SIBLOCK {}",
                                block_id, child
                            )));
                        }
                    }
                }
            }
        }
        trace!("Sub-node tree {} holds {} entries", block_id, entries.len());
        Ok(Self { entries })
    }

    pub fn get(&self, id: NodeId) -> Option<&SubNodeEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubNodeEntry> {
        self.entries.values()
    }
}

enum SubNodeBlock {
    Leaf(Vec<SubNodeEntry>),
    Intermediate(Vec<(NodeId, BlockId)>),
}

fn read_sub_node_block(
    index: &dyn NodeIndex,
    reader: &BlockReader,
    variant: PstVariant,
    block_id: BlockId,
) -> Result<SubNodeBlock> {
    let entry = index.offset(block_id)?;
    let data = reader.read_block(&entry)?;
    let width = variant.id_width();
    let header_size = if variant.is_unicode() { 8 } else { 4 };
    if data.len() < header_size {
        return Err(PstError::Truncated {
            offset: 0,
            wanted: header_size as u64,
            available: data.len() as u64,
        });
    }
    if data[0] != SUB_NODE_SIGNATURE {
        return Err(PstError::BadSignature {
            context: "sub-node block",
            expected: u32::from(SUB_NODE_SIGNATURE),
            found: u32::from(data[0]),
        });
    }
    let level = data[1];
    let count = id_at(&data, 2, 2)? as usize;

    match level {
        0 => {
            let stride = 3 * width;
            (0..count)
                .map(|position| {
                    let at = header_size + position * stride;
                    Ok(SubNodeEntry {
                        id: NodeId(id_at(&data, at, width)? as u32),
                        data_block_id: BlockId(id_at(&data, at + width, width)?),
                        sub_node_block_id: BlockId(id_at(&data, at + 2 * width, width)?),
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(SubNodeBlock::Leaf)
        }
        1 => {
            let stride = 2 * width;
            (0..count)
                .map(|position| {
                    let at = header_size + position * stride;
                    Ok((
                        NodeId(id_at(&data, at, width)? as u32),
                        BlockId(id_at(&data, at + width, width)?),
                    ))
                })
                .collect::<Result<Vec<_>>>()
                .map(SubNodeBlock::Intermediate)
        }
        other => Err(PstError::InvalidFormat(format!(
            "Sub-node block {} has level {}",
            block_id, other
        ))),
    }
}
