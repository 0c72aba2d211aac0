//! Low-level byte reading and text decoding utilities.

use byteorder::{ByteOrder, LittleEndian};
use encoding_rs::Encoding;

use crate::pst::types::error::{PstError, Result};

/// Code page assumed when a record declares none.
pub const DEFAULT_CODEPAGE: u32 = 1252;

/// Read a little-endian id of `width` bytes at `offset` within `data`.
pub fn id_at(data: &[u8], offset: usize, width: usize) -> Result<u64> {
    let end = offset + width;
    if end > data.len() {
        return Err(PstError::Truncated {
            offset: offset as u64,
            wanted: width as u64,
            available: data.len().saturating_sub(offset) as u64,
        });
    }
    match width {
        8 => Ok(LittleEndian::read_u64(&data[offset..end])),
        4 => Ok(LittleEndian::read_u32(&data[offset..end]) as u64),
        2 => Ok(LittleEndian::read_u16(&data[offset..end]) as u64),
        1 => Ok(data[offset] as u64),
        _ => Err(PstError::InvalidFormat(format!("Invalid id width: {}", width))),
    }
}

/// Borrow `len` bytes at `offset`, failing with [`PstError::Truncated`].
pub fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .map(|end| &data[offset..end])
        .ok_or(PstError::Truncated {
            offset: offset as u64,
            wanted: len as u64,
            available: data.len().saturating_sub(offset) as u64,
        })
}

/// Maps a Windows code page number to an encoding.
///
/// # Errors
/// Returns [`PstError::Encoding`] for code pages without a known mapping.
pub fn encoding_for_codepage(codepage: u32) -> Result<&'static Encoding> {
    let label: &str = match codepage {
        1200 => "utf-16le",
        1201 => "utf-16be",
        65001 => "utf-8",
        20127 => "us-ascii",
        874 => "windows-874",
        932 => "shift_jis",
        936 => "gbk",
        949 => "euc-kr",
        950 => "big5",
        1250..=1258 => return encoding_for_windows(codepage),
        20866 => "koi8-r",
        21866 => "koi8-u",
        28591..=28599 | 28603 | 28605 => return encoding_for_iso8859(codepage),
        50220 | 50221 | 50222 => "iso-2022-jp",
        51932 => "euc-jp",
        51936 => "gb2312",
        51949 => "euc-kr",
        54936 => "gb18030",
        10000 => "macintosh",
        10007 => "x-mac-cyrillic",
        _ => return Err(PstError::Encoding(format!("unsupported code page {}", codepage))),
    };
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| PstError::Encoding(format!("no encoding for code page {}", codepage)))
}

fn encoding_for_windows(codepage: u32) -> Result<&'static Encoding> {
    let label = format!("windows-{}", codepage);
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| PstError::Encoding(format!("no encoding for code page {}", codepage)))
}

fn encoding_for_iso8859(codepage: u32) -> Result<&'static Encoding> {
    let label = format!("iso-8859-{}", codepage - 28590);
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| PstError::Encoding(format!("no encoding for code page {}", codepage)))
}

/// Decodes UTF-16LE text, dropping a trailing NUL terminator.
///
/// # Errors
/// An odd byte count is malformed and yields [`PstError::Encoding`].
pub fn decode_utf16le(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(PstError::Encoding(format!(
            "UTF-16 payload has odd length {}",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    Ok(String::from_utf16_lossy(&units[..end]))
}

/// Decodes 8-bit text in `encoding`, dropping a trailing NUL terminator.
pub fn decode_8bit(bytes: &[u8], encoding: &'static Encoding) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let (text, _, _) = encoding.decode(&bytes[..end]);
    text.into_owned()
}

/// Reads a NUL-terminated 8-bit string from the front of `reader` and advances it.
pub fn read_cstr<'a>(reader: &mut &'a [u8]) -> Result<&'a [u8]> {
    let end = reader
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| PstError::InvalidFormat("Missing null terminator in string".to_string()))?;
    let text = &reader[..end];
    *reader = &reader[end + 1..];
    Ok(text)
}

/// Reads a NUL-terminated UTF-16LE string from the front of `reader` and advances it.
pub fn read_wstr(reader: &mut &[u8]) -> Result<String> {
    let end = reader
        .chunks_exact(2)
        .position(|chunk| chunk == [0, 0])
        .map(|chunk_index| chunk_index * 2)
        .ok_or_else(|| PstError::InvalidFormat("Missing null terminator in string".to_string()))?;
    let text = decode_utf16le(&reader[..end])?;
    *reader = &reader[end + 2..];
    Ok(text)
}
