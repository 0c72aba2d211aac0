//! Property cells and typed access to one record's properties.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};
use encoding_rs::{Encoding, WINDOWS_1252};
use log::warn;
use uuid::Uuid;

use crate::pst::format::node::Node;
use crate::pst::messaging::time::filetime_to_datetime;
use crate::pst::messaging::timezone::TimeZoneRule;
use crate::pst::types::error::{PstError, Result};
use crate::pst::types::models::NodeId;
use crate::pst::types::properties::{tags, PropertyType};
use crate::pst::utils::{decode_8bit, decode_utf16le, encoding_for_codepage, slice_at};

use super::heap::HeapNode;

/// Where a property's value lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellData {
    /// A 1, 2 or 4 byte value stored in place.
    Scalar(u32),
    /// An 8 byte value stored in place.
    Inline8([u8; 8]),
    /// Bytes already materialised.
    Bytes(Vec<u8>),
    /// An hnid, resolved through the owning heap on access.
    Reference(u32),
}

/// A single property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyCell {
    pub id: u16,
    pub prop_type: PropertyType,
    pub data: CellData,
}

/// The properties of one logical object.
///
/// Referenced values are resolved lazily through the heap they came from.
/// The record's code page is looked up once, on first string access.
pub struct RowRecord {
    cells: BTreeMap<u16, PropertyCell>,
    heap: Option<Arc<HeapNode>>,
    default_codepage: u32,
    encoding: OnceLock<&'static Encoding>,
}

impl std::fmt::Debug for RowRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowRecord")
            .field("cells", &self.cells.len())
            .field("heap", &self.heap)
            .finish()
    }
}

impl RowRecord {
    pub fn new(
        cells: impl IntoIterator<Item = PropertyCell>,
        heap: Option<Arc<HeapNode>>,
        default_codepage: u32,
    ) -> Self {
        Self {
            cells: cells.into_iter().map(|cell| (cell.id, cell)).collect(),
            heap,
            default_codepage,
            encoding: OnceLock::new(),
        }
    }

    pub fn get(&self, id: u16) -> Option<&PropertyCell> {
        self.cells.get(&id)
    }

    pub fn contains(&self, id: u16) -> bool {
        self.cells.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> impl Iterator<Item = &PropertyCell> {
        self.cells.values()
    }

    /// The node whose heap backs this record's referenced values.
    pub fn node(&self) -> Option<&Node> {
        self.heap.as_deref().map(HeapNode::node)
    }

    /// Returns the raw bytes of a property, resolving references.
    pub fn bytes(&self, id: u16) -> Result<Option<Cow<'_, [u8]>>> {
        let Some(cell) = self.cells.get(&id) else {
            return Ok(None);
        };
        let bytes = match &cell.data {
            CellData::Scalar(value) => Cow::Owned(value.to_le_bytes().to_vec()),
            CellData::Inline8(value) => Cow::Borrowed(&value[..]),
            CellData::Bytes(value) => Cow::Borrowed(value.as_slice()),
            CellData::Reference(hnid) => {
                let heap = self.heap.as_ref().ok_or_else(|| {
                    PstError::InvalidFormat(format!(
                        "Property {:#06x} references a heap the record does not have",
                        id
                    ))
                })?;
                heap.resolve(*hnid)?
            }
        };
        Ok(Some(bytes))
    }

    /// Integer16, Integer32 and Boolean values, sign-extended.
    pub fn int(&self, id: u16) -> Option<i32> {
        let cell = self.cells.get(&id)?;
        match (cell.prop_type, &cell.data) {
            (PropertyType::Integer16, CellData::Scalar(value)) => Some(i32::from(*value as u16 as i16)),
            (PropertyType::Integer32, CellData::Scalar(value))
            | (PropertyType::ErrorCode, CellData::Scalar(value)) => Some(*value as i32),
            (PropertyType::Boolean, CellData::Scalar(value)) => Some((*value & 0xFF) as i32),
            _ => None,
        }
    }

    pub fn boolean(&self, id: u16) -> Option<bool> {
        let cell = self.cells.get(&id)?;
        match (cell.prop_type, &cell.data) {
            (PropertyType::Boolean, CellData::Scalar(value)) => Some(*value & 0xFF != 0),
            (PropertyType::Integer16 | PropertyType::Integer32, CellData::Scalar(value)) => {
                Some(*value != 0)
            }
            _ => None,
        }
    }

    /// Floating32 and Floating64 values.
    pub fn double(&self, id: u16) -> Result<Option<f64>> {
        let Some(cell) = self.cells.get(&id) else {
            return Ok(None);
        };
        match (cell.prop_type, &cell.data) {
            (PropertyType::Floating32, CellData::Scalar(value)) => {
                Ok(Some(f64::from(f32::from_bits(*value))))
            }
            (PropertyType::Floating64 | PropertyType::FloatingTime, _) => self
                .fixed8(id)
                .map(|bytes| bytes.map(f64::from_le_bytes)),
            _ => Ok(None),
        }
    }

    /// Integer64 and Currency values.
    pub fn long(&self, id: u16) -> Result<Option<i64>> {
        let Some(cell) = self.cells.get(&id) else {
            return Ok(None);
        };
        match cell.prop_type {
            PropertyType::Integer64 | PropertyType::Currency => {
                self.fixed8(id).map(|bytes| bytes.map(i64::from_le_bytes))
            }
            PropertyType::Integer32 | PropertyType::Integer16 => Ok(self.int(id).map(i64::from)),
            _ => Ok(None),
        }
    }

    /// A Time property converted from FILETIME to UTC.
    pub fn date(&self, id: u16) -> Result<Option<DateTime<Utc>>> {
        match self.cells.get(&id) {
            Some(cell) if cell.prop_type == PropertyType::Time => Ok(self
                .fixed8(id)?
                .and_then(|bytes| filetime_to_datetime(i64::from_le_bytes(bytes)))),
            _ => Ok(None),
        }
    }

    fn fixed8(&self, id: u16) -> Result<Option<[u8; 8]>> {
        let Some(bytes) = self.bytes(id)? else {
            return Ok(None);
        };
        let value = slice_at(&bytes, 0, 8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(value);
        Ok(Some(out))
    }

    /// Binary (or any variable-length) value bytes.
    pub fn binary(&self, id: u16) -> Result<Option<Vec<u8>>> {
        Ok(self.bytes(id)?.map(Cow::into_owned))
    }

    pub fn guid(&self, id: u16) -> Result<Option<Uuid>> {
        let Some(bytes) = self.bytes(id)? else {
            return Ok(None);
        };
        let value = slice_at(&bytes, 0, 16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(value);
        Ok(Some(Uuid::from_bytes_le(raw)))
    }

    /// The encoding of this record's 8-bit strings.
    ///
    /// Taken from the internet code page, then the message code page, then
    /// the configured default. An unknown code page is logged and replaced
    /// by the default.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding.get_or_init(|| {
            let codepage = self
                .int(tags::INTERNET_CODEPAGE)
                .or_else(|| self.int(tags::MESSAGE_CODEPAGE))
                .map(|codepage| codepage as u32)
                .unwrap_or(self.default_codepage);
            match encoding_for_codepage(codepage) {
                Ok(encoding) => encoding,
                Err(e) => {
                    warn!("{}; falling back to code page {}", e, self.default_codepage);
                    encoding_for_codepage(self.default_codepage).unwrap_or(WINDOWS_1252)
                }
            }
        })
    }

    fn decode_text(&self, prop_type: PropertyType, bytes: &[u8], id: u16) -> String {
        match prop_type {
            PropertyType::Unicode | PropertyType::MultipleUnicode => match decode_utf16le(bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Property {:#06x}: {}; returning an empty string", id, e);
                    String::new()
                }
            },
            _ => decode_8bit(bytes, self.encoding()),
        }
    }

    /// A Unicode or String8 property as text.
    ///
    /// Binary properties are decoded in the record's code page, which covers
    /// bodies some clients store as bytes.
    pub fn string(&self, id: u16) -> Result<Option<String>> {
        let Some(cell) = self.cells.get(&id) else {
            return Ok(None);
        };
        match cell.prop_type {
            PropertyType::Unicode | PropertyType::String8 | PropertyType::Binary => {
                let prop_type = cell.prop_type;
                Ok(self
                    .bytes(id)?
                    .map(|bytes| self.decode_text(prop_type, &bytes, id)))
            }
            _ => Ok(None),
        }
    }

    /// Items of a multi-valued variable-length property.
    ///
    /// ```text
    /// count u32, offsets[count] u32, item data...
    /// ```
    pub fn multi_binary(&self, id: u16) -> Result<Option<Vec<Vec<u8>>>> {
        let Some(bytes) = self.bytes(id)? else {
            return Ok(None);
        };
        split_multi_value(&bytes).map(Some)
    }

    pub fn multi_string(&self, id: u16) -> Result<Option<Vec<String>>> {
        let Some(cell) = self.cells.get(&id) else {
            return Ok(None);
        };
        let prop_type = cell.prop_type;
        if !matches!(prop_type, PropertyType::MultipleUnicode | PropertyType::MultipleString8) {
            return Ok(None);
        }
        Ok(self.multi_binary(id)?.map(|items| {
            items
                .iter()
                .map(|item| self.decode_text(prop_type, item, id))
                .collect()
        }))
    }

    /// An Object property: the sub-node holding the object.
    pub fn object(&self, id: u16) -> Result<Option<NodeId>> {
        let Some(cell) = self.cells.get(&id) else {
            return Ok(None);
        };
        if let CellData::Reference(hnid) = cell.data {
            let in_sub_nodes = self
                .node()
                .map(|node| node.sub_nodes().contains(NodeId(hnid)))
                .unwrap_or(false);
            if in_sub_nodes {
                return Ok(Some(NodeId(hnid)));
            }
        }
        let Some(bytes) = self.bytes(id)? else {
            return Ok(None);
        };
        let value = slice_at(&bytes, 0, 4)?;
        Ok(Some(NodeId(LittleEndian::read_u32(value))))
    }

    /// A time zone blob: either a 48-byte time zone struct or a time zone
    /// definition with named rules.
    pub fn timezone(&self, id: u16) -> Result<Option<TimeZoneRule>> {
        let Some(bytes) = self.bytes(id)? else {
            return Ok(None);
        };
        if bytes.is_empty() {
            return Ok(None);
        }
        if bytes.len() == 48 {
            TimeZoneRule::from_struct(&bytes).map(Some)
        } else {
            TimeZoneRule::from_definition(&bytes).map(Some)
        }
    }
}

fn split_multi_value(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let count = LittleEndian::read_u32(slice_at(bytes, 0, 4)?) as usize;
    let table = slice_at(bytes, 4, count.checked_mul(4).unwrap_or(usize::MAX))?;
    let offsets: Vec<usize> = table
        .chunks_exact(4)
        .map(|chunk| LittleEndian::read_u32(chunk) as usize)
        .collect();
    offsets
        .iter()
        .enumerate()
        .map(|(position, &start)| {
            let end = offsets.get(position + 1).copied().unwrap_or(bytes.len());
            if end < start {
                return Err(PstError::InvalidFormat(format!(
                    "Multi-value item {} ends before it starts",
                    position
                )));
            }
            slice_at(bytes, start, end - start).map(<[u8]>::to_vec)
        })
        .collect()
}
