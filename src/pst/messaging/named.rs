//! The named property map (node 0x61).
//!
//! Named properties are identified by a property set GUID plus either a
//! numeric id or a string name, and stored on disk under ids from 0x8000.
//! The map node is a property context holding three streams:
//!
//! - 0x0002: GUID stream, 16 bytes per property set
//! - 0x0003: entry stream, 8 bytes per name
//!   (`dwPropertyID u32, wGuid u16, wPropIdx u16`)
//! - 0x0004: string stream, `length u32` + UTF-16 name per string entry
//!
//! Bit 0 of `wGuid` marks a string name (then `dwPropertyID` is an offset into
//! the string stream); the remaining bits select the set: 1 = PS_MAPI,
//! 2 = PS_PUBLIC_STRINGS, n >= 3 = GUID stream entry n - 3.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};
use uuid::Uuid;

use crate::pst::format::node::NodeContext;
use crate::pst::ltp::property::PropertyContext;
use crate::pst::types::error::{PstError, Result};
use crate::pst::types::models::NodeId;
use crate::pst::utils::{decode_utf16le, slice_at};

/// Well-known property set GUIDs.
pub mod sets {
    use uuid::Uuid;

    pub const PS_MAPI: Uuid = Uuid::from_u128(0x00020328_0000_0000_C000_000000000046);
    pub const PS_PUBLIC_STRINGS: Uuid = Uuid::from_u128(0x00020329_0000_0000_C000_000000000046);
    pub const APPOINTMENT: Uuid = Uuid::from_u128(0x00062002_0000_0000_C000_000000000046);
    pub const TASK: Uuid = Uuid::from_u128(0x00062003_0000_0000_C000_000000000046);
    pub const ADDRESS: Uuid = Uuid::from_u128(0x00062004_0000_0000_C000_000000000046);
    pub const COMMON: Uuid = Uuid::from_u128(0x00062008_0000_0000_C000_000000000046);
}

/// Numeric ids of named properties within their sets.
pub mod lids {
    pub const APPOINTMENT_START: u32 = 0x820D;
    pub const APPOINTMENT_END: u32 = 0x820E;
    pub const LOCATION: u32 = 0x8208;
    pub const BUSY_STATUS: u32 = 0x8205;
    pub const ALL_DAY: u32 = 0x8215;
    pub const RECURRENCE_BLOB: u32 = 0x8216;
    pub const RECURRING: u32 = 0x8223;
    pub const EXCEPTION_REPLACE_TIME: u32 = 0x8228;
    pub const TIME_ZONE_STRUCT: u32 = 0x8233;
    pub const TIME_ZONE_DESCRIPTION: u32 = 0x8234;
    pub const TIME_ZONE_DEFINITION_RECUR: u32 = 0x8260;

    pub const FILE_UNDER: u32 = 0x8005;
    pub const DIST_LIST_ONE_OFF_MEMBERS: u32 = 0x8054;
    pub const DIST_LIST_MEMBERS: u32 = 0x8055;
    pub const EMAIL1_DISPLAY_NAME: u32 = 0x8080;
    pub const EMAIL1_ADDRESS: u32 = 0x8083;
    pub const EMAIL2_ADDRESS: u32 = 0x8093;
    pub const EMAIL3_ADDRESS: u32 = 0x80A3;

    pub const TASK_STATUS: u32 = 0x8101;
    pub const TASK_PERCENT_COMPLETE: u32 = 0x8102;
    pub const TASK_START: u32 = 0x8104;
    pub const TASK_DUE: u32 = 0x8105;
    pub const TASK_COMPLETE: u32 = 0x811C;
}

const GUID_STREAM: u16 = 0x0002;
const ENTRY_STREAM: u16 = 0x0003;
const STRING_STREAM: u16 = 0x0004;
const FIRST_NAMED_ID: u32 = 0x8000;

/// A property name within a set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyName {
    Id(u32),
    String(String),
}

/// A named property: set plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedProperty {
    pub set: Uuid,
    pub name: PropertyName,
}

/// Translation between named properties and their on-disk ids.
#[derive(Debug, Default)]
pub struct NamedPropertyMap {
    by_name: HashMap<NamedProperty, u16>,
    by_id: HashMap<u16, NamedProperty>,
}

impl NamedPropertyMap {
    /// Reads the map from its node. A missing map node yields an empty map.
    pub fn load(context: &NodeContext) -> Result<Self> {
        let node = match context.open_node(NodeId::NAME_TO_ID_MAP) {
            Ok(node) => node,
            Err(PstError::NodeNotFound(_)) => {
                warn!("Archive has no named property map");
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };
        let record = PropertyContext::open(node)?.record(context.default_codepage());
        let guids = record.binary(GUID_STREAM)?.unwrap_or_default();
        let entries = record.binary(ENTRY_STREAM)?.unwrap_or_default();
        let strings = record.binary(STRING_STREAM)?.unwrap_or_default();
        Self::from_streams(&guids, &entries, &strings)
    }

    /// Builds the map from the raw contents of its three streams.
    pub fn from_streams(guids: &[u8], entries: &[u8], strings: &[u8]) -> Result<Self> {
        let set_guids: Vec<Uuid> = guids
            .chunks_exact(16)
            .map(|chunk| {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(chunk);
                Uuid::from_bytes_le(raw)
            })
            .collect();

        let mut map = Self::default();
        for entry in entries.chunks_exact(8) {
            let property_id = LittleEndian::read_u32(&entry[0..4]);
            let guid_field = LittleEndian::read_u16(&entry[4..6]);
            let index = LittleEndian::read_u16(&entry[6..8]);

            let set = match guid_field >> 1 {
                0 => continue,
                1 => sets::PS_MAPI,
                2 => sets::PS_PUBLIC_STRINGS,
                n => match set_guids.get(n as usize - 3) {
                    Some(guid) => *guid,
                    None => {
                        warn!("Named property entry refers to missing GUID {}", n);
                        continue;
                    }
                },
            };
            let name = if guid_field & 1 == 1 {
                PropertyName::String(read_name(strings, property_id as usize)?)
            } else {
                PropertyName::Id(property_id)
            };
            let Ok(id) = u16::try_from(FIRST_NAMED_ID + u32::from(index)) else {
                warn!("Named property index {:#x} is out of range", index);
                continue;
            };
            let named = NamedProperty { set, name };
            map.by_name.insert(named.clone(), id);
            map.by_id.insert(id, named);
        }
        debug!("Named property map holds {} entries", map.by_id.len());
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// The on-disk id of a numerically named property.
    pub fn lookup(&self, set: Uuid, id: u32) -> Option<u16> {
        self.by_name
            .get(&NamedProperty {
                set,
                name: PropertyName::Id(id),
            })
            .copied()
    }

    /// The on-disk id of a string-named property.
    pub fn lookup_name(&self, set: Uuid, name: &str) -> Option<u16> {
        self.by_name
            .get(&NamedProperty {
                set,
                name: PropertyName::String(name.to_string()),
            })
            .copied()
    }

    /// The name behind an on-disk id.
    pub fn name_of(&self, id: u16) -> Option<&NamedProperty> {
        self.by_id.get(&id)
    }
}

fn read_name(strings: &[u8], offset: usize) -> Result<String> {
    let length = LittleEndian::read_u32(slice_at(strings, offset, 4)?) as usize;
    decode_utf16le(slice_at(strings, offset + 4, length)?)
}
