//! Property context: a single record stored as a BTree-on-heap.
//!
//! Each BTH record maps a 2-byte property id to 6 bytes:
//! `wPropType u16, dwValueHnid u32`. Values of at most four bytes sit in
//! `dwValueHnid` itself; everything else is an hnid resolved on access.

use std::collections::BTreeMap;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::pst::format::node::Node;
use crate::pst::types::error::{PstError, Result};
use crate::pst::types::properties::PropertyType;

use super::bth;
use super::heap::{HeapNode, CLIENT_PROPERTY_CONTEXT};
use super::value::{CellData, PropertyCell, RowRecord};

const KEY_SIZE: usize = 2;
const VALUE_SIZE: usize = 6;

/// An opened property context.
#[derive(Debug)]
pub struct PropertyContext {
    heap: Arc<HeapNode>,
    entries: BTreeMap<u16, (PropertyType, u32)>,
}

impl PropertyContext {
    /// Opens the property context stored in `node`.
    ///
    /// # Errors
    /// - [`PstError::InvalidFormat`] if the heap is not a property context or
    ///   the BTH record sizes are wrong
    /// - [`PstError::Unsupported`] for a multi-level BTH
    pub fn open(node: Node) -> Result<Self> {
        let heap = HeapNode::open(node)?;
        if heap.client_signature() != CLIENT_PROPERTY_CONTEXT {
            return Err(PstError::InvalidFormat(format!(
                "Node {} holds client {:#04x}, not a property context",
                heap.node().id(),
                heap.client_signature()
            )));
        }
        let header = bth::read_header(&heap, heap.user_root())?;
        if header.key_size != KEY_SIZE || header.value_size != VALUE_SIZE {
            return Err(PstError::InvalidFormat(format!(
                "Property context BTH has {}/{} byte records, expected {}/{}",
                header.key_size, header.value_size, KEY_SIZE, VALUE_SIZE
            )));
        }
        let entries = bth::read_records(&heap, &header)?
            .into_iter()
            .map(|record| {
                let id = LittleEndian::read_u16(record.key);
                let prop_type = PropertyType::from(LittleEndian::read_u16(&record.value[0..2]));
                let value = LittleEndian::read_u32(&record.value[2..6]);
                (id, (prop_type, value))
            })
            .collect::<BTreeMap<_, _>>();
        debug!(
            "Property context on node {}: {} properties",
            heap.node().id(),
            entries.len()
        );
        Ok(Self {
            heap: Arc::new(heap),
            entries,
        })
    }

    pub fn heap(&self) -> &HeapNode {
        &self.heap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn property_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.keys().copied()
    }

    /// The cell for one property, without resolving its value.
    pub fn cell(&self, id: u16) -> Option<PropertyCell> {
        self.entries.get(&id).map(|&(prop_type, value)| PropertyCell {
            id,
            prop_type,
            data: if prop_type.is_inline_in_property_context() {
                CellData::Scalar(value)
            } else {
                CellData::Reference(value)
            },
        })
    }

    /// Builds the record of all properties; referenced values stay lazy.
    pub fn record(&self, default_codepage: u32) -> RowRecord {
        let cells = self.entries.keys().filter_map(|&id| self.cell(id));
        RowRecord::new(cells, Some(Arc::clone(&self.heap)), default_codepage)
    }
}
