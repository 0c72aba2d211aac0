//! Nodes: a data stream plus an optional sub-node tree.

use std::sync::Arc;

use log::debug;

use crate::pst::types::error::{PstError, Result};
use crate::pst::types::models::{
    BlockId, CryptMethod, DescriptorEntry, NodeId, OffsetEntry, PstVariant,
};
use crate::pst::utils::DEFAULT_CODEPAGE;

use super::block::{BlockReader, BlockStream};
use super::source::ByteRangeReader;
use super::subnode::SubNodeTree;

/// The lookup services everything above the block layer is built on.
///
/// An opened archive answers these from its B-trees; tests can answer them
/// from in-memory maps.
pub trait NodeIndex: Send + Sync {
    /// Resolves a node id to its node B-tree record.
    fn descriptor(&self, id: NodeId) -> Result<DescriptorEntry>;

    /// Resolves a block id to its physical location.
    fn offset(&self, id: BlockId) -> Result<OffsetEntry>;

    /// Resolves a sub-node tree block id to the tree's entries.
    fn sub_nodes(&self, id: BlockId) -> Result<Arc<SubNodeTree>>;

    /// Lists the nodes whose parent is `parent`, excluding `parent` itself.
    fn children(&self, _parent: NodeId) -> Result<Vec<DescriptorEntry>> {
        Ok(Vec::new())
    }
}

/// Shared handle to everything needed to open nodes of one archive.
#[derive(Clone)]
pub struct NodeContext {
    index: Arc<dyn NodeIndex>,
    blocks: BlockReader,
    variant: PstVariant,
    default_codepage: u32,
}

impl NodeContext {
    pub fn new(
        source: Arc<dyn ByteRangeReader>,
        index: Arc<dyn NodeIndex>,
        variant: PstVariant,
        crypt_method: CryptMethod,
    ) -> Self {
        Self {
            index,
            blocks: BlockReader::new(source, crypt_method),
            variant,
            default_codepage: DEFAULT_CODEPAGE,
        }
    }

    /// Sets the code page assumed for 8-bit strings of records declaring none.
    pub fn with_default_codepage(mut self, codepage: u32) -> Self {
        self.default_codepage = codepage;
        self
    }

    pub fn variant(&self) -> PstVariant {
        self.variant
    }

    pub fn default_codepage(&self) -> u32 {
        self.default_codepage
    }

    pub fn crypt_method(&self) -> CryptMethod {
        self.blocks.crypt_method()
    }

    pub fn index(&self) -> &dyn NodeIndex {
        self.index.as_ref()
    }

    /// Opens the block stream rooted at `block_id`.
    pub fn open_stream(&self, block_id: BlockId) -> Result<BlockStream> {
        BlockStream::open(self.index.as_ref(), &self.blocks, self.variant, block_id)
    }

    fn open_sub_node_tree(&self, block_id: BlockId) -> Result<Arc<SubNodeTree>> {
        if block_id.is_null() {
            Ok(Arc::new(SubNodeTree::empty()))
        } else {
            self.index.sub_nodes(block_id)
        }
    }

    /// Opens a top-level node by id.
    pub fn open_node(&self, id: NodeId) -> Result<Node> {
        let descriptor = self.index.descriptor(id)?;
        debug!(
            "Opening node {} (data {}, sub-nodes {})",
            id, descriptor.data_block_id, descriptor.sub_node_block_id
        );
        Ok(Node {
            id,
            parent_id: descriptor.parent_id,
            data: self.open_stream(descriptor.data_block_id)?,
            sub_nodes: self.open_sub_node_tree(descriptor.sub_node_block_id)?,
            context: self.clone(),
        })
    }
}

/// One opened node.
pub struct Node {
    id: NodeId,
    parent_id: NodeId,
    data: BlockStream,
    sub_nodes: Arc<SubNodeTree>,
    context: NodeContext,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("data", &self.data)
            .field("sub_nodes", &self.sub_nodes.len())
            .finish()
    }
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent_id(&self) -> NodeId {
        self.parent_id
    }

    pub fn data(&self) -> &BlockStream {
        &self.data
    }

    /// Consumes the node, keeping only its data stream.
    pub fn into_data(self) -> BlockStream {
        self.data
    }

    pub fn sub_nodes(&self) -> &SubNodeTree {
        &self.sub_nodes
    }

    pub fn context(&self) -> &NodeContext {
        &self.context
    }

    /// Opens an entry of this node's sub-node tree.
    pub fn open_sub_node(&self, id: NodeId) -> Result<Node> {
        let entry = self
            .sub_nodes
            .get(id)
            .ok_or(PstError::NodeNotFound(id.0))?;
        debug!("Opening sub-node {} of node {}", id, self.id);
        Ok(Node {
            id,
            parent_id: self.id,
            data: self.context.open_stream(entry.data_block_id)?,
            sub_nodes: self.context.open_sub_node_tree(entry.sub_node_block_id)?,
            context: self.context.clone(),
        })
    }
}
