//! Archive header parsing.
//!
//! The header sits at offset 0 and is at most 564 bytes. Only the fields
//! needed to locate the two top-level B-trees and to decode blocks are read:
//!
//! ```text
//! [4 bytes]  dwMagic        "!BDN"
//! [4 bytes]  dwCRCPartial
//! [2 bytes]  wMagicClient   "SM" (PST) or "SO" (OST)
//! [2 bytes]  wVer           selects the layout variant
//! ...
//! ROOT       ibFileEof, BREF of the node and block B-trees
//! ...
//! bCryptMethod
//! ```

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, trace};

use crate::pst::types::error::{PstError, Result};
use crate::pst::types::models::{CryptMethod, PstVariant};

use super::source::ByteRangeReader;

/// "!BDN" read as a little-endian u32.
pub const HEADER_MAGIC: u32 = 0x4E44_4221;
const CLIENT_MAGIC_PST: u16 = 0x4D53;
const CLIENT_MAGIC_OST: u16 = 0x4F53;

/// Bytes read up front; covers the crypt byte of the Unicode layout.
const HEADER_READ_SIZE: usize = 0x202;
const ANSI_HEADER_SIZE: usize = 0x1CE;

/// Field offsets that differ between the two header layouts.
struct HeaderLayout {
    file_eof: usize,
    node_btree_root: usize,
    block_btree_root: usize,
    crypt_method: usize,
}

const ANSI_LAYOUT: HeaderLayout = HeaderLayout {
    file_eof: 0xA8,
    node_btree_root: 0xBC,
    block_btree_root: 0xC4,
    crypt_method: 0x1CD,
};

const UNICODE_LAYOUT: HeaderLayout = HeaderLayout {
    file_eof: 0xB8,
    node_btree_root: 0xE0,
    block_btree_root: 0xF0,
    crypt_method: 0x201,
};

/// The decoded archive header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PstHeader {
    pub version: u16,
    pub variant: PstVariant,
    /// `true` for an Offline Folders file.
    pub is_ost: bool,
    pub crypt_method: CryptMethod,
    /// Declared end of file; informational only.
    pub file_eof: u64,
    /// File offset of the node B-tree root page.
    pub node_btree_root: u64,
    /// File offset of the block B-tree root page.
    pub block_btree_root: u64,
}

/// Parses the archive header at the start of `source`.
///
/// # Errors
/// - [`PstError::InvalidFormat`] if the magic is wrong or the header is cut short
/// - [`PstError::UnsupportedVariant`] for an unknown `wVer`
pub fn parse(source: &dyn ByteRangeReader) -> Result<PstHeader> {
    info!("Parsing archive header");

    let available = source.len().min(HEADER_READ_SIZE as u64) as usize;
    if available < ANSI_HEADER_SIZE {
        return Err(PstError::InvalidFormat(format!(
            "File too small for an archive header: {} bytes",
            source.len()
        )));
    }
    let bytes = source.read_range(0, available)?;

    let magic = LittleEndian::read_u32(&bytes[0..4]);
    if magic != HEADER_MAGIC {
        return Err(PstError::InvalidFormat(format!(
            "Not an archive file: magic {:#010x}",
            magic
        )));
    }

    let client_magic = LittleEndian::read_u16(&bytes[8..10]);
    let is_ost = match client_magic {
        CLIENT_MAGIC_PST => false,
        CLIENT_MAGIC_OST => true,
        other => {
            debug!("Unrecognised client magic {:#06x}, assuming PST", other);
            false
        }
    };

    let version = LittleEndian::read_u16(&bytes[10..12]);
    let variant = PstVariant::try_from(version)?;
    trace!("wVer={} -> {} layout", version, variant);

    let layout = if variant.is_unicode() {
        if bytes.len() < HEADER_READ_SIZE {
            return Err(PstError::Truncated {
                offset: 0,
                wanted: HEADER_READ_SIZE as u64,
                available: bytes.len() as u64,
            });
        }
        &UNICODE_LAYOUT
    } else {
        &ANSI_LAYOUT
    };

    let read_offset = |at: usize| -> u64 {
        if variant.is_unicode() {
            LittleEndian::read_u64(&bytes[at..at + 8])
        } else {
            u64::from(LittleEndian::read_u32(&bytes[at..at + 4]))
        }
    };

    let crypt_method = CryptMethod::try_from(bytes[layout.crypt_method])?;
    let header = PstHeader {
        version,
        variant,
        is_ost,
        crypt_method,
        file_eof: read_offset(layout.file_eof),
        node_btree_root: read_offset(layout.node_btree_root),
        block_btree_root: read_offset(layout.block_btree_root),
    };

    info!(
        "Header parsed: {} {} file, crypt={:?}, NBT root={:#x}, BBT root={:#x}",
        header.variant,
        if header.is_ost { "OST" } else { "PST" },
        header.crypt_method,
        header.node_btree_root,
        header.block_btree_root
    );
    Ok(header)
}
