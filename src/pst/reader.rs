use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use super::format::btree::BTreeIndex;
use super::format::header::{self, PstHeader};
use super::format::node::{NodeContext, NodeIndex};
use super::format::source::{ByteRangeReader, LockedReader};
use super::iter::{FolderWalk, ItemIter};
use super::ltp::value::RowRecord;
use super::messaging::folder::Folder;
use super::messaging::items::Item;
use super::messaging::message::{Message, ObjectContext};
use super::messaging::named::NamedPropertyMap;
use super::types::error::Result;
use super::types::models::{DescriptorEntry, NodeId};
use super::utils::DEFAULT_CODEPAGE;

/// Settings applied when opening an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Reject B-tree pages whose type byte does not match the tree being read.
    pub verify_page_types: bool,
    /// Code page for 8-bit strings of records that declare none.
    pub default_codepage: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            verify_page_types: true,
            default_codepage: DEFAULT_CODEPAGE,
        }
    }
}

/// An opened Personal Folders or Offline Folders archive.
///
/// Cheap lookups are memoised inside; the handle is `Send + Sync` and can be
/// shared across threads behind an `Arc`.
pub struct PstFile {
    header: PstHeader,
    index: Arc<BTreeIndex>,
    objects: ObjectContext,
}

impl std::fmt::Debug for PstFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PstFile")
            .field("header", &self.header)
            .field("named_properties", &self.objects.named().len())
            .finish()
    }
}

impl PstFile {
    /// Opens the archive at `path` with default options.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not an archive, or uses
    /// an unsupported layout variant.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening archive: {}", path.display());
        let file = File::open(path)?;
        let source = LockedReader::new(BufReader::new(file))?;
        Self::from_reader(Arc::new(source), options)
    }

    /// Opens an archive held by any byte source.
    pub fn from_reader(source: Arc<dyn ByteRangeReader>, options: OpenOptions) -> Result<Self> {
        let header = header::parse(source.as_ref())?;
        let index = Arc::new(BTreeIndex::new(
            Arc::clone(&source),
            &header,
            options.verify_page_types,
        ));
        let nodes = NodeContext::new(
            source,
            Arc::clone(&index) as Arc<dyn NodeIndex>,
            header.variant,
            header.crypt_method,
        )
        .with_default_codepage(options.default_codepage);

        let named = match NamedPropertyMap::load(&nodes) {
            Ok(map) => map,
            Err(e) if e.is_recoverable() => {
                warn!("Named property map unreadable, continuing without it: {}", e);
                NamedPropertyMap::default()
            }
            Err(e) => return Err(e),
        };
        info!(
            "Opened {} archive ({} named properties)",
            header.variant,
            named.len()
        );

        Ok(Self {
            header,
            index,
            objects: ObjectContext::new(nodes, Arc::new(named)),
        })
    }

    pub fn header(&self) -> &PstHeader {
        &self.header
    }

    /// Node access for lower-level reads.
    pub fn context(&self) -> &NodeContext {
        self.objects.nodes()
    }

    pub fn objects(&self) -> &ObjectContext {
        &self.objects
    }

    pub fn named_properties(&self) -> &NamedPropertyMap {
        self.objects.named()
    }

    /// Properties of the message store (node 0x21).
    pub fn message_store(&self) -> Result<RowRecord> {
        let node = self.context().open_node(NodeId::MESSAGE_STORE)?;
        self.objects.open_record(node)
    }

    pub fn root_folder(&self) -> Result<Folder> {
        self.folder(NodeId::ROOT_FOLDER)
    }

    pub fn folder(&self, id: NodeId) -> Result<Folder> {
        Folder::open(&self.objects, id)
    }

    pub fn message(&self, id: NodeId) -> Result<Message> {
        Message::open(&self.objects, id)
    }

    /// Opens a message and wraps it in the view its class selects.
    pub fn item(&self, id: NodeId) -> Result<Item> {
        self.message(id).map(Item::from_message)
    }

    /// Visits every node record of the archive.
    pub fn walk_descriptors(&self, visit: &mut dyn FnMut(DescriptorEntry)) -> Result<()> {
        self.index.walk_descriptors(visit)
    }

    /// Depth-first walk of the folder hierarchy from the root folder.
    pub fn folders(&self) -> FolderWalk<'_> {
        FolderWalk::new(self, NodeId::ROOT_FOLDER)
    }

    /// Depth-first walk starting at `root`.
    pub fn folders_from(&self, root: NodeId) -> FolderWalk<'_> {
        FolderWalk::new(self, root)
    }

    /// The items of one folder.
    pub fn items(&self, folder: &Folder) -> Result<ItemIter<'_>> {
        Ok(ItemIter::new(self, folder.item_ids()?))
    }
}
