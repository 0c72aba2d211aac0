//! Search of the two top-level B-trees.
//!
//! Both trees share one page format. A page is a packed array of entries
//! followed by a small footer:
//!
//! ```text
//! [entries area]  cEnt entries of cbEnt bytes each
//! cEnt, cEntMax, cbEnt, cLevel
//! page trailer:   ptype (0x80 block tree, 0x81 node tree), ...
//! ```
//!
//! Intermediate pages (`cLevel > 0`) hold `key, bid, ib` triples and are
//! searched by descending into the last entry whose key is not greater than
//! the target. Leaf pages hold [`DescriptorEntry`] or [`OffsetEntry`] records
//! whose widths depend on the file variant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use crate::pst::types::error::{PstError, Result};
use crate::pst::types::models::{BlockId, DescriptorEntry, NodeId, OffsetEntry, PstVariant};
use crate::pst::utils::id_at;

use super::block::BlockReader;
use super::header::PstHeader;
use super::node::NodeIndex;
use super::source::ByteRangeReader;
use super::subnode::SubNodeTree;

/// Deepest tree accepted before the file is treated as corrupt.
const MAX_DEPTH: usize = 8;

/// Which tree a page belongs to, as recorded in its trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    BlockTree = 0x80,
    NodeTree = 0x81,
}

/// Footer field offsets of one page layout.
struct PageGeometry {
    entry_count: usize,
    entry_count_is_u16: bool,
    entry_size: usize,
    level: usize,
    page_type: usize,
    entries_area: usize,
}

fn geometry(variant: PstVariant) -> PageGeometry {
    match variant {
        PstVariant::Ansi => PageGeometry {
            entry_count: 496,
            entry_count_is_u16: false,
            entry_size: 498,
            level: 499,
            page_type: 500,
            entries_area: 496,
        },
        PstVariant::Unicode => PageGeometry {
            entry_count: 488,
            entry_count_is_u16: false,
            entry_size: 490,
            level: 491,
            page_type: 496,
            entries_area: 488,
        },
        PstVariant::Unicode4k => PageGeometry {
            entry_count: 4056,
            entry_count_is_u16: true,
            entry_size: 4060,
            level: 4061,
            page_type: 4080,
            entries_area: 4056,
        },
    }
}

/// Width of a node tree leaf record.
fn descriptor_entry_size(variant: PstVariant) -> usize {
    match variant {
        PstVariant::Ansi => 16,
        PstVariant::Unicode | PstVariant::Unicode4k => 32,
    }
}

/// Width of a block tree leaf record.
fn offset_entry_size(variant: PstVariant) -> usize {
    match variant {
        PstVariant::Ansi => 12,
        PstVariant::Unicode | PstVariant::Unicode4k => 24,
    }
}

/// One decoded B-tree page.
#[derive(Debug)]
struct BTreePage {
    entries: Vec<u8>,
    entry_count: usize,
    entry_size: usize,
    level: u8,
}

impl BTreePage {
    fn entry(&self, index: usize) -> &[u8] {
        let start = index * self.entry_size;
        &self.entries[start..start + self.entry_size]
    }
}

/// Stateless reader over the B-tree pages of one archive.
pub struct BTreeReader<'a> {
    source: &'a dyn ByteRangeReader,
    variant: PstVariant,
    verify_page_types: bool,
}

impl<'a> BTreeReader<'a> {
    pub fn new(source: &'a dyn ByteRangeReader, variant: PstVariant, verify_page_types: bool) -> Self {
        Self {
            source,
            variant,
            verify_page_types,
        }
    }

    fn read_page(&self, offset: u64, kind: PageKind) -> Result<BTreePage> {
        let geometry = geometry(self.variant);
        let page = self.source.read_range(offset, self.variant.page_size())?;

        let page_type = page[geometry.page_type];
        if self.verify_page_types && page_type != kind as u8 {
            return Err(PstError::InvalidFormat(format!(
                "Page at {:#x} has type {:#04x}, expected {:#04x}",
                offset, page_type, kind as u8
            )));
        }

        let entry_count = if geometry.entry_count_is_u16 {
            LittleEndian::read_u16(&page[geometry.entry_count..geometry.entry_count + 2]) as usize
        } else {
            page[geometry.entry_count] as usize
        };
        let entry_size = page[geometry.entry_size] as usize;
        let level = page[geometry.level];

        let minimum = if level > 0 {
            3 * self.variant.id_width()
        } else {
            match kind {
                PageKind::NodeTree => descriptor_entry_size(self.variant),
                PageKind::BlockTree => offset_entry_size(self.variant),
            }
        };
        if entry_size < minimum {
            return Err(PstError::InvalidFormat(format!(
                "Page at {:#x} declares {}-byte entries, need at least {}",
                offset, entry_size, minimum
            )));
        }
        if entry_count * entry_size > geometry.entries_area {
            return Err(PstError::InvalidFormat(format!(
                "Page at {:#x} declares {} entries of {} bytes, overflowing the page",
                offset, entry_count, entry_size
            )));
        }

        trace!(
            "Read {:?} page at {:#x}: level={}, entries={}",
            kind,
            offset,
            level,
            entry_count
        );
        let mut entries = page;
        entries.truncate(entry_count * entry_size);
        Ok(BTreePage {
            entries,
            entry_count,
            entry_size,
            level,
        })
    }

    /// Descends from `root` to the leaf page that would hold `key`.
    fn find_leaf(&self, root: u64, kind: PageKind, key: u64) -> Result<Option<BTreePage>> {
        let width = self.variant.id_width();
        let mut offset = root;
        for _ in 0..MAX_DEPTH {
            let page = self.read_page(offset, kind)?;
            if page.level == 0 {
                return Ok(Some(page));
            }
            let mut next = None;
            for index in 0..page.entry_count {
                let entry = page.entry(index);
                if id_at(entry, 0, width)? > key {
                    break;
                }
                next = Some(id_at(entry, 2 * width, width)?);
            }
            match next {
                Some(child) => offset = child,
                None => return Ok(None),
            }
        }
        Err(PstError::InvalidFormat(format!(
            "{:?} deeper than {} levels",
            kind, MAX_DEPTH
        )))
    }

    /// Looks up a node in the node B-tree.
    pub fn find_descriptor(&self, root: u64, id: NodeId) -> Result<Option<DescriptorEntry>> {
        let Some(page) = self.find_leaf(root, PageKind::NodeTree, u64::from(id.0))? else {
            return Ok(None);
        };
        for index in 0..page.entry_count {
            let entry = self.descriptor_at(page.entry(index))?;
            if entry.id == id {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Looks up a block in the block B-tree. Bit 0 of the id is ignored.
    pub fn find_offset(&self, root: u64, id: BlockId) -> Result<Option<OffsetEntry>> {
        let key = id.lookup_key();
        let Some(page) = self.find_leaf(root, PageKind::BlockTree, key)? else {
            return Ok(None);
        };
        for index in 0..page.entry_count {
            let entry = self.offset_at(page.entry(index))?;
            if entry.id.lookup_key() == key {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Visits every leaf record of the node B-tree in key order.
    pub fn walk_descriptors(
        &self,
        root: u64,
        visit: &mut dyn FnMut(DescriptorEntry),
    ) -> Result<()> {
        self.walk_page(root, 0, visit)
    }

    fn walk_page(
        &self,
        offset: u64,
        depth: usize,
        visit: &mut dyn FnMut(DescriptorEntry),
    ) -> Result<()> {
        if depth >= MAX_DEPTH {
            return Err(PstError::InvalidFormat(format!(
                "NodeTree deeper than {} levels",
                MAX_DEPTH
            )));
        }
        let page = self.read_page(offset, PageKind::NodeTree)?;
        let width = self.variant.id_width();
        for index in 0..page.entry_count {
            let entry = page.entry(index);
            if page.level == 0 {
                visit(self.descriptor_at(entry)?);
            } else {
                self.walk_page(id_at(entry, 2 * width, width)?, depth + 1, visit)?;
            }
        }
        Ok(())
    }

    fn descriptor_at(&self, entry: &[u8]) -> Result<DescriptorEntry> {
        let width = self.variant.id_width();
        let parent_offset = 3 * width;
        Ok(DescriptorEntry {
            id: NodeId(id_at(entry, 0, width)? as u32),
            data_block_id: BlockId(id_at(entry, width, width)?),
            sub_node_block_id: BlockId(id_at(entry, 2 * width, width)?),
            parent_id: NodeId(id_at(entry, parent_offset, 4)? as u32),
        })
    }

    fn offset_at(&self, entry: &[u8]) -> Result<OffsetEntry> {
        let width = self.variant.id_width();
        let id = BlockId(id_at(entry, 0, width)?);
        let file_offset = id_at(entry, width, width)?;
        let tail = 2 * width;
        let size = LittleEndian::read_u16(&entry[tail..tail + 2]) as u32;
        let (inflated_size, ref_count) = match self.variant {
            PstVariant::Unicode4k => (
                LittleEndian::read_u16(&entry[tail + 2..tail + 4]) as u32,
                LittleEndian::read_u32(&entry[tail + 4..tail + 8]),
            ),
            PstVariant::Ansi | PstVariant::Unicode => {
                (size, LittleEndian::read_u16(&entry[tail + 2..tail + 4]) as u32)
            }
        };
        Ok(OffsetEntry {
            id,
            file_offset,
            size,
            inflated_size,
            ref_count,
        })
    }
}

/// The lookup services of an opened archive, backed by its B-trees.
///
/// Lookups are memoised; the caches only grow and are safe to share.
pub struct BTreeIndex {
    source: Arc<dyn ByteRangeReader>,
    blocks: BlockReader,
    variant: PstVariant,
    node_root: u64,
    block_root: u64,
    verify_page_types: bool,
    descriptors: Mutex<HashMap<NodeId, DescriptorEntry>>,
    offsets: Mutex<HashMap<u64, OffsetEntry>>,
    sub_node_trees: Mutex<HashMap<BlockId, Arc<SubNodeTree>>>,
    children: OnceLock<HashMap<NodeId, Vec<DescriptorEntry>>>,
}

impl BTreeIndex {
    pub fn new(source: Arc<dyn ByteRangeReader>, header: &PstHeader, verify_page_types: bool) -> Self {
        Self {
            blocks: BlockReader::new(Arc::clone(&source), header.crypt_method),
            source,
            variant: header.variant,
            node_root: header.node_btree_root,
            block_root: header.block_btree_root,
            verify_page_types,
            descriptors: Mutex::new(HashMap::new()),
            offsets: Mutex::new(HashMap::new()),
            sub_node_trees: Mutex::new(HashMap::new()),
            children: OnceLock::new(),
        }
    }

    fn reader(&self) -> BTreeReader<'_> {
        BTreeReader::new(self.source.as_ref(), self.variant, self.verify_page_types)
    }

    /// Visits every node of the archive.
    pub fn walk_descriptors(&self, visit: &mut dyn FnMut(DescriptorEntry)) -> Result<()> {
        self.reader().walk_descriptors(self.node_root, visit)
    }

    fn children_by_parent(&self) -> Result<&HashMap<NodeId, Vec<DescriptorEntry>>> {
        if let Some(children) = self.children.get() {
            return Ok(children);
        }
        debug!("Building parent -> children map from a full node tree walk");
        let mut children: HashMap<NodeId, Vec<DescriptorEntry>> = HashMap::new();
        self.walk_descriptors(&mut |entry| {
            children.entry(entry.parent_id).or_default().push(entry);
        })?;
        Ok(self.children.get_or_init(|| children))
    }
}

impl NodeIndex for BTreeIndex {
    fn descriptor(&self, id: NodeId) -> Result<DescriptorEntry> {
        if let Some(entry) = self
            .descriptors
            .lock()
            .map_err(|_| PstError::LockPoisoned)?
            .get(&id)
        {
            return Ok(*entry);
        }
        let entry = self
            .reader()
            .find_descriptor(self.node_root, id)?
            .ok_or(PstError::NodeNotFound(id.0))?;
        self.descriptors
            .lock()
            .map_err(|_| PstError::LockPoisoned)?
            .insert(id, entry);
        Ok(entry)
    }

    fn offset(&self, id: BlockId) -> Result<OffsetEntry> {
        let key = id.lookup_key();
        if let Some(entry) = self
            .offsets
            .lock()
            .map_err(|_| PstError::LockPoisoned)?
            .get(&key)
        {
            return Ok(*entry);
        }
        let entry = self
            .reader()
            .find_offset(self.block_root, id)?
            .ok_or(PstError::BlockNotFound(id.0))?;
        self.offsets
            .lock()
            .map_err(|_| PstError::LockPoisoned)?
            .insert(key, entry);
        Ok(entry)
    }

    fn sub_nodes(&self, id: BlockId) -> Result<Arc<SubNodeTree>> {
        if let Some(tree) = self
            .sub_node_trees
            .lock()
            .map_err(|_| PstError::LockPoisoned)?
            .get(&id)
        {
            return Ok(Arc::clone(tree));
        }
        let tree = Arc::new(SubNodeTree::open(self, &self.blocks, self.variant, id)?);
        self.sub_node_trees
            .lock()
            .map_err(|_| PstError::LockPoisoned)?
            .insert(id, Arc::clone(&tree));
        Ok(tree)
    }

    fn children(&self, parent: NodeId) -> Result<Vec<DescriptorEntry>> {
        Ok(self
            .children_by_parent()?
            .get(&parent)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.id != parent)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}
