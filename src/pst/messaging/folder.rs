use log::{debug, warn};

use crate::pst::ltp::table::TableContext;
use crate::pst::ltp::value::RowRecord;
use crate::pst::types::error::Result;
use crate::pst::types::models::{NodeId, NodeType};
use crate::pst::types::properties::tags;

use super::message::ObjectContext;

const HIERARCHY_TABLE: u8 = 0x0D;
const CONTENTS_TABLE: u8 = 0x0E;

/// A folder of the archive hierarchy.
pub struct Folder {
    id: NodeId,
    properties: RowRecord,
    objects: ObjectContext,
}

impl std::fmt::Debug for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Folder")
            .field("id", &self.id)
            .field("properties", &self.properties)
            .finish()
    }
}

impl Folder {
    pub fn open(objects: &ObjectContext, id: NodeId) -> Result<Self> {
        let node = objects.nodes().open_node(id)?;
        let properties = objects.open_record(node)?;
        Ok(Self {
            id,
            properties,
            objects: objects.clone(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn properties(&self) -> &RowRecord {
        &self.properties
    }

    pub fn display_name(&self) -> Result<Option<String>> {
        self.properties.string(tags::DISPLAY_NAME)
    }

    pub fn container_class(&self) -> Result<Option<String>> {
        self.properties.string(tags::CONTAINER_CLASS)
    }

    pub fn content_count(&self) -> Option<i32> {
        self.properties.int(tags::CONTENT_COUNT)
    }

    pub fn unread_count(&self) -> Option<i32> {
        self.properties.int(tags::CONTENT_UNREAD_COUNT)
    }

    pub fn has_subfolders(&self) -> bool {
        self.properties.boolean(tags::SUBFOLDERS).unwrap_or(false)
    }

    /// Ids of the direct child folders.
    ///
    /// Read from the hierarchy table; when that table is missing or empty,
    /// the node index's parent links are used instead.
    pub fn sub_folder_ids(&self) -> Result<Vec<NodeId>> {
        self.table_or_children(HIERARCHY_TABLE, |kind| {
            matches!(kind, NodeType::NormalFolder | NodeType::SearchFolder)
        })
    }

    /// Ids of the messages in this folder, resolved the same way as
    /// [`Folder::sub_folder_ids`] but from the contents table.
    pub fn item_ids(&self) -> Result<Vec<NodeId>> {
        self.table_or_children(CONTENTS_TABLE, |kind| kind == NodeType::NormalMessage)
    }

    pub fn sub_folders(&self) -> Result<Vec<Folder>> {
        self.sub_folder_ids()?
            .into_iter()
            .map(|id| Folder::open(&self.objects, id))
            .collect()
    }

    fn table_or_children(
        &self,
        table_type: u8,
        keep: impl Fn(NodeType) -> bool,
    ) -> Result<Vec<NodeId>> {
        let table_id = self.id.with_type(table_type);
        match self.objects.open_table(table_id) {
            Ok(Some(table)) if table.row_count() > 0 => return Ok(row_node_ids(&table)),
            Ok(_) => debug!("Table {} of folder {} is empty or missing", table_id, self.id),
            Err(e) if e.is_recoverable() => {
                warn!("Unreadable table {} of folder {}: {}", table_id, self.id, e)
            }
            Err(e) => return Err(e),
        }
        let children = self.objects.nodes().index().children(self.id)?;
        Ok(children
            .into_iter()
            .map(|entry| entry.id)
            .filter(|id| *id != self.id && keep(id.node_type()))
            .collect())
    }
}

fn row_node_ids(table: &TableContext) -> Vec<NodeId> {
    table.row_ids().map(NodeId).collect()
}
