//! Distribution list member entry ids.
//!
//! Every entry id starts with `rgbFlags u32, ProviderUID [16]`. Two providers
//! are decoded:
//!
//! - one-off entries: `wVersion u16, wFlags u16`, then NUL-terminated display
//!   name, address type and address (UTF-16 when `wFlags & 0x8000`)
//! - wrapped entries: a type byte, then an embedded entry id which is either a
//!   one-off entry or a message entry id naming a contact node

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use encoding_rs::WINDOWS_1252;

use crate::pst::types::error::{PstError, Result};
use crate::pst::types::models::NodeId;
use crate::pst::utils::{decode_8bit, read_cstr, read_wstr, slice_at};

pub const ONE_OFF_PROVIDER: [u8; 16] = [
    0x81, 0x2B, 0x1F, 0xA4, 0xBE, 0xA3, 0x10, 0x19, 0x9D, 0x6E, 0x00, 0xDD, 0x01, 0x0F, 0x54, 0x02,
];
pub const WRAPPED_PROVIDER: [u8; 16] = [
    0xC0, 0x91, 0xAD, 0xD3, 0x51, 0x9D, 0xCF, 0x11, 0xA4, 0xA9, 0x00, 0xAA, 0x00, 0x47, 0xFA, 0xA4,
];

const ENTRY_ID_HEADER_SIZE: usize = 20;
const ONE_OFF_UNICODE: u16 = 0x8000;
const WRAPPED_ONE_OFF: u8 = 0x80;

/// A provider UID, printed as hex.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ProviderUid(pub [u8; 16]);

impl fmt::Debug for ProviderUid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ProviderUid({})", hex::encode(self.0))
    }
}

impl fmt::Display for ProviderUid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// One member of a distribution list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistListEntry {
    OneOff {
        display_name: String,
        address_type: String,
        email_address: String,
    },
    /// A reference to a contact or list stored in the archive.
    Wrapped {
        /// Low 4 bits of the wrapped type byte (3 = contact, 4 = list, ...).
        entry_type: u8,
        provider: ProviderUid,
        node_id: NodeId,
    },
    Unknown {
        provider: ProviderUid,
    },
}

impl DistListEntry {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = slice_at(data, 0, ENTRY_ID_HEADER_SIZE)?;
        let mut provider = [0u8; 16];
        provider.copy_from_slice(&header[4..20]);
        let body = &data[ENTRY_ID_HEADER_SIZE..];

        match provider {
            ONE_OFF_PROVIDER => parse_one_off(body),
            WRAPPED_PROVIDER => {
                let type_byte = *body.first().ok_or_else(|| {
                    PstError::InvalidFormat("Wrapped entry id has no type byte".to_string())
                })?;
                let inner = &body[1..];
                if type_byte & WRAPPED_ONE_OFF != 0 {
                    return Self::parse(inner);
                }
                let inner_header = slice_at(inner, 0, ENTRY_ID_HEADER_SIZE + 4)?;
                let mut inner_provider = [0u8; 16];
                inner_provider.copy_from_slice(&inner_header[4..20]);
                Ok(DistListEntry::Wrapped {
                    entry_type: type_byte & 0x0F,
                    provider: ProviderUid(inner_provider),
                    node_id: NodeId(LittleEndian::read_u32(&inner_header[20..24])),
                })
            }
            other => Ok(DistListEntry::Unknown {
                provider: ProviderUid(other),
            }),
        }
    }
}

fn parse_one_off(body: &[u8]) -> Result<DistListEntry> {
    let header = slice_at(body, 0, 4)?;
    let flags = LittleEndian::read_u16(&header[2..4]);
    let mut strings = &body[4..];
    let (display_name, address_type, email_address) = if flags & ONE_OFF_UNICODE != 0 {
        (
            read_wstr(&mut strings)?,
            read_wstr(&mut strings)?,
            read_wstr(&mut strings)?,
        )
    } else {
        (
            decode_8bit(read_cstr(&mut strings)?, WINDOWS_1252),
            decode_8bit(read_cstr(&mut strings)?, WINDOWS_1252),
            decode_8bit(read_cstr(&mut strings)?, WINDOWS_1252),
        )
    };
    Ok(DistListEntry::OneOff {
        display_name,
        address_type,
        email_address,
    })
}
