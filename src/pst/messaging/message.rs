//! Messages, their recipients and their attachments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use uuid::Uuid;

use crate::pst::codec::compression::decompress_rtf;
use crate::pst::format::node::{Node, NodeContext};
use crate::pst::ltp::property::PropertyContext;
use crate::pst::ltp::table::TableContext;
use crate::pst::ltp::value::RowRecord;
use crate::pst::types::error::{PstError, Result};
use crate::pst::types::kinds::ItemKind;
use crate::pst::types::models::NodeId;
use crate::pst::types::properties::tags;

use super::conversation::ConversationIndex;
use super::named::NamedPropertyMap;

/// What every object needs to open further objects: node access plus the
/// archive's named property map.
#[derive(Clone)]
pub struct ObjectContext {
    nodes: NodeContext,
    named: Arc<NamedPropertyMap>,
}

impl ObjectContext {
    pub fn new(nodes: NodeContext, named: Arc<NamedPropertyMap>) -> Self {
        Self { nodes, named }
    }

    pub fn nodes(&self) -> &NodeContext {
        &self.nodes
    }

    pub fn named(&self) -> &NamedPropertyMap {
        &self.named
    }

    /// Reads the property context of `node` as a record.
    pub fn open_record(&self, node: Node) -> Result<RowRecord> {
        Ok(PropertyContext::open(node)?.record(self.nodes.default_codepage()))
    }

    /// Opens a table context node, or `None` if the node does not exist.
    pub fn open_table(&self, id: NodeId) -> Result<Option<TableContext>> {
        match self.nodes.open_node(id) {
            Ok(node) => TableContext::open(node).map(Some),
            Err(PstError::NodeNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Opens the table held in sub-node `id` of `node`, if present.
fn open_sub_table(node: &Node, id: NodeId) -> Result<Option<TableContext>> {
    if !node.sub_nodes().contains(id) {
        return Ok(None);
    }
    TableContext::open(node.open_sub_node(id)?).map(Some)
}

/// A message node of any class.
pub struct Message {
    id: NodeId,
    kind: ItemKind,
    properties: RowRecord,
    objects: ObjectContext,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .finish()
    }
}

impl Message {
    /// Opens a top-level message node.
    pub fn open(objects: &ObjectContext, id: NodeId) -> Result<Self> {
        let node = objects.nodes().open_node(id)?;
        Self::from_node(objects, node)
    }

    /// Builds a message from an opened node (top-level or embedded).
    pub fn from_node(objects: &ObjectContext, node: Node) -> Result<Self> {
        let id = node.id();
        let properties = objects.open_record(node)?;
        let class = properties.string(tags::MESSAGE_CLASS)?.unwrap_or_default();
        let kind = ItemKind::from_message_class(&class);
        debug!("Message {} has class '{}' -> {:?}", id, class, kind);
        Ok(Self {
            id,
            kind,
            properties,
            objects: objects.clone(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn properties(&self) -> &RowRecord {
        &self.properties
    }

    pub fn message_class(&self) -> Result<Option<String>> {
        self.properties.string(tags::MESSAGE_CLASS)
    }

    /// The subject with any normalised-subject prefix marker removed.
    ///
    /// A subject starting with U+0001 carries a one-character prefix length
    /// after the marker; both are dropped.
    pub fn subject(&self) -> Result<Option<String>> {
        Ok(self.properties.string(tags::SUBJECT)?.map(|subject| {
            if subject.starts_with('\u{1}') {
                subject.chars().skip(2).collect()
            } else {
                subject
            }
        }))
    }

    pub fn sender_name(&self) -> Result<Option<String>> {
        self.properties.string(tags::SENDER_NAME)
    }

    pub fn sender_email_address(&self) -> Result<Option<String>> {
        self.properties.string(tags::SENDER_EMAIL_ADDRESS)
    }

    pub fn sent_representing_name(&self) -> Result<Option<String>> {
        self.properties.string(tags::SENT_REPRESENTING_NAME)
    }

    pub fn display_to(&self) -> Result<Option<String>> {
        self.properties.string(tags::DISPLAY_TO)
    }

    pub fn conversation_topic(&self) -> Result<Option<String>> {
        self.properties.string(tags::CONVERSATION_TOPIC)
    }

    pub fn internet_message_id(&self) -> Result<Option<String>> {
        self.properties.string(tags::INTERNET_MESSAGE_ID)
    }

    pub fn transport_headers(&self) -> Result<Option<String>> {
        self.properties.string(tags::TRANSPORT_MESSAGE_HEADERS)
    }

    pub fn body(&self) -> Result<Option<String>> {
        self.properties.string(tags::BODY)
    }

    pub fn body_html(&self) -> Result<Option<String>> {
        self.properties.string(tags::BODY_HTML)
    }

    /// The RTF body, decompressed.
    pub fn body_rtf(&self) -> Result<Option<String>> {
        let Some(compressed) = self.properties.binary(tags::RTF_COMPRESSED)? else {
            return Ok(None);
        };
        let rtf = decompress_rtf(&compressed)?;
        Ok(Some(crate::pst::utils::decode_8bit(
            &rtf,
            self.properties.encoding(),
        )))
    }

    pub fn importance(&self) -> Option<i32> {
        self.properties.int(tags::IMPORTANCE)
    }

    pub fn flags(&self) -> Option<i32> {
        self.properties.int(tags::MESSAGE_FLAGS)
    }

    pub fn size(&self) -> Option<i32> {
        self.properties.int(tags::MESSAGE_SIZE)
    }

    pub fn client_submit_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.properties.date(tags::CLIENT_SUBMIT_TIME)
    }

    pub fn delivery_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.properties.date(tags::MESSAGE_DELIVERY_TIME)
    }

    pub fn creation_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.properties.date(tags::CREATION_TIME)
    }

    pub fn last_modification_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.properties.date(tags::LAST_MODIFICATION_TIME)
    }

    pub fn conversation_index(&self) -> Result<Option<ConversationIndex>> {
        match self.properties.binary(tags::CONVERSATION_INDEX)? {
            Some(bytes) => ConversationIndex::parse(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn node(&self) -> Result<&Node> {
        self.properties.node().ok_or_else(|| {
            PstError::InvalidFormat(format!("Message {} has no backing node", self.id))
        })
    }

    /// Reads the recipient table.
    pub fn recipients(&self) -> Result<Vec<Recipient>> {
        let Some(table) = open_sub_table(self.node()?, NodeId::RECIPIENT_TABLE)? else {
            return Ok(Vec::new());
        };
        table
            .rows()
            .map(|row| row.map(|properties| Recipient { properties }))
            .collect()
    }

    /// Node ids of this message's attachments.
    pub fn attachment_ids(&self) -> Result<Vec<NodeId>> {
        let Some(table) = open_sub_table(self.node()?, NodeId::ATTACHMENT_TABLE)? else {
            return Ok(Vec::new());
        };
        Ok(table.row_ids().map(NodeId).collect())
    }

    /// Opens every attachment; one unreadable attachment is logged and skipped.
    pub fn attachments(&self) -> Result<Vec<Attachment>> {
        let node = self.node()?;
        let mut attachments = Vec::new();
        for id in self.attachment_ids()? {
            match node
                .open_sub_node(id)
                .and_then(|sub_node| self.objects.open_record(sub_node))
            {
                Ok(properties) => attachments.push(Attachment {
                    id,
                    properties,
                    objects: self.objects.clone(),
                }),
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping attachment {} of message {}: {}", id, self.id, e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(attachments)
    }

    /// Resolves a named property to its on-disk id.
    pub fn named_id(&self, set: Uuid, lid: u32) -> Option<u16> {
        self.objects.named().lookup(set, lid)
    }

    pub fn named_string(&self, set: Uuid, lid: u32) -> Result<Option<String>> {
        match self.named_id(set, lid) {
            Some(id) => self.properties.string(id),
            None => Ok(None),
        }
    }

    pub fn named_int(&self, set: Uuid, lid: u32) -> Option<i32> {
        self.named_id(set, lid).and_then(|id| self.properties.int(id))
    }

    pub fn named_bool(&self, set: Uuid, lid: u32) -> Option<bool> {
        self.named_id(set, lid).and_then(|id| self.properties.boolean(id))
    }

    pub fn named_double(&self, set: Uuid, lid: u32) -> Result<Option<f64>> {
        match self.named_id(set, lid) {
            Some(id) => self.properties.double(id),
            None => Ok(None),
        }
    }

    pub fn named_date(&self, set: Uuid, lid: u32) -> Result<Option<DateTime<Utc>>> {
        match self.named_id(set, lid) {
            Some(id) => self.properties.date(id),
            None => Ok(None),
        }
    }

    pub fn named_binary(&self, set: Uuid, lid: u32) -> Result<Option<Vec<u8>>> {
        match self.named_id(set, lid) {
            Some(id) => self.properties.binary(id),
            None => Ok(None),
        }
    }

    pub fn named_multi_binary(&self, set: Uuid, lid: u32) -> Result<Option<Vec<Vec<u8>>>> {
        match self.named_id(set, lid) {
            Some(id) => self.properties.multi_binary(id),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientType {
    Originator,
    To,
    Cc,
    Bcc,
    Other(i32),
}

impl From<i32> for RecipientType {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Originator,
            1 => Self::To,
            2 => Self::Cc,
            3 => Self::Bcc,
            other => Self::Other(other),
        }
    }
}

/// One row of a message's recipient table.
#[derive(Debug)]
pub struct Recipient {
    properties: RowRecord,
}

impl Recipient {
    pub fn properties(&self) -> &RowRecord {
        &self.properties
    }

    pub fn display_name(&self) -> Result<Option<String>> {
        self.properties.string(tags::DISPLAY_NAME)
    }

    pub fn email_address(&self) -> Result<Option<String>> {
        self.properties.string(tags::EMAIL_ADDRESS)
    }

    pub fn address_type(&self) -> Result<Option<String>> {
        self.properties.string(tags::ADDRESS_TYPE)
    }

    pub fn smtp_address(&self) -> Result<Option<String>> {
        self.properties.string(tags::SMTP_ADDRESS)
    }

    pub fn recipient_type(&self) -> Option<RecipientType> {
        self.properties.int(tags::RECIPIENT_TYPE).map(RecipientType::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMethod {
    None,
    ByValue,
    ByReference,
    ByReferenceOnly,
    EmbeddedMessage,
    Ole,
    Other(i32),
}

impl From<i32> for AttachMethod {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::None,
            1 => Self::ByValue,
            2 | 3 => Self::ByReference,
            4 => Self::ByReferenceOnly,
            5 => Self::EmbeddedMessage,
            6 => Self::Ole,
            other => Self::Other(other),
        }
    }
}

/// One attachment of a message.
pub struct Attachment {
    id: NodeId,
    properties: RowRecord,
    objects: ObjectContext,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("id", &self.id)
            .field("properties", &self.properties)
            .finish()
    }
}

impl Attachment {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn properties(&self) -> &RowRecord {
        &self.properties
    }

    /// The long file name, falling back to the 8.3 name.
    pub fn filename(&self) -> Result<Option<String>> {
        match self.properties.string(tags::ATTACH_LONG_FILENAME)? {
            Some(name) if !name.is_empty() => Ok(Some(name)),
            _ => self.properties.string(tags::ATTACH_FILENAME),
        }
    }

    pub fn display_name(&self) -> Result<Option<String>> {
        self.properties.string(tags::DISPLAY_NAME)
    }

    pub fn mime_tag(&self) -> Result<Option<String>> {
        self.properties.string(tags::ATTACH_MIME_TAG)
    }

    pub fn content_id(&self) -> Result<Option<String>> {
        self.properties.string(tags::ATTACH_CONTENT_ID)
    }

    pub fn size(&self) -> Option<i32> {
        self.properties.int(tags::ATTACH_SIZE)
    }

    pub fn method(&self) -> AttachMethod {
        self.properties
            .int(tags::ATTACH_METHOD)
            .map(AttachMethod::from)
            .unwrap_or(AttachMethod::None)
    }

    /// The attached file's bytes. Embedded messages have none.
    pub fn data(&self) -> Result<Option<Vec<u8>>> {
        if self.method() == AttachMethod::EmbeddedMessage {
            return Ok(None);
        }
        self.properties.binary(tags::ATTACH_DATA)
    }

    /// Opens the embedded message of an attachment with method 5.
    pub fn embedded_message(&self) -> Result<Option<Message>> {
        if self.method() != AttachMethod::EmbeddedMessage {
            return Ok(None);
        }
        let Some(id) = self.properties.object(tags::ATTACH_DATA)? else {
            return Ok(None);
        };
        let node = self.properties.node().ok_or_else(|| {
            PstError::InvalidFormat(format!("Attachment {} has no backing node", self.id))
        })?;
        let embedded = node.open_sub_node(id)?;
        Message::from_node(&self.objects, embedded).map(Some)
    }
}
