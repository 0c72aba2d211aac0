//! Decompression algorithms.
//!
//! Two formats appear in archives:
//! - Zlib (deflate) for compressed blocks of 4K-page archives
//! - LZFu, the LZ77 variant used for compressed RTF bodies

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use log::trace;

use crate::pst::types::error::{PstError, Result};

/// Signature of an LZFu-compressed RTF payload ("LZFu").
pub const LZFU_COMPRESSED: u32 = 0x7546_5A4C;
/// Signature of an uncompressed RTF payload ("MELA").
pub const LZFU_UNCOMPRESSED: u32 = 0x414C_454D;

const LZFU_HEADER_SIZE: usize = 16;
const RING_BUFFER_SIZE: usize = 4096;

/// Dictionary the ring buffer is seeded with before decoding.
const RTF_PREBUF: &[u8] = b"{\\rtf1\\ansi\\mac\\deff0\\deftab720{\\fonttbl;}{\\f0\\fnil \\froman \
\\fswiss \\fmodern \\fscript \\fdecor MS Sans SerifSymbolArialTimes New RomanCourier\
{\\colortbl\\red0\\green0\\blue0\r\n\\par \\pard\\plain\\f0\\fs20\\b\\i\\u\\tab\\tx";

/// Inflates a zlib-compressed block to exactly `expected_size` bytes.
pub fn inflate_block(payload: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    trace!(
        "Inflating block: {} bytes -> {} bytes (expected)",
        payload.len(),
        expected_size
    );
    let mut output = Vec::with_capacity(expected_size);
    let mut decoder = ZlibDecoder::new(payload);
    decoder
        .read_to_end(&mut output)
        .map_err(|e| PstError::DecompressionError(format!("Zlib decompression failed: {}", e)))?;
    if output.len() != expected_size {
        return Err(PstError::SizeMismatch {
            context: "inflated block",
            expected: expected_size as u64,
            found: output.len() as u64,
        });
    }
    Ok(output)
}

/// Decompresses a compressed-RTF payload.
///
/// # Header
/// ```text
/// [4 bytes] compressed size (LE)
/// [4 bytes] uncompressed size (LE)
/// [4 bytes] signature: "LZFu" or "MELA"
/// [4 bytes] CRC (not verified)
/// ```
///
/// Each control byte gates the next eight tokens, least significant bit
/// first. A clear bit copies one literal; a set bit reads a big-endian word
/// holding a 12-bit ring offset and a 4-bit length (plus 2). Reference bytes
/// are copied one at a time, so a run may overlap its own output.
///
/// # Errors
/// The output must be exactly the declared uncompressed size; anything else
/// is a [`PstError::SizeMismatch`]. Unknown signatures are rejected.
pub fn decompress_rtf(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < LZFU_HEADER_SIZE {
        return Err(PstError::InvalidFormat(format!(
            "Compressed RTF too short: {} bytes",
            data.len()
        )));
    }
    let raw_size = LittleEndian::read_u32(&data[4..8]) as usize;
    let signature = LittleEndian::read_u32(&data[8..12]);

    match signature {
        LZFU_UNCOMPRESSED => {
            trace!("Uncompressed RTF payload, copying {} bytes", data.len() - LZFU_HEADER_SIZE);
            Ok(data[LZFU_HEADER_SIZE..].to_vec())
        }
        LZFU_COMPRESSED => decompress_lzfu(&data[LZFU_HEADER_SIZE..], raw_size),
        other => Err(PstError::BadSignature {
            context: "compressed RTF",
            expected: LZFU_COMPRESSED,
            found: other,
        }),
    }
}

fn decompress_lzfu(payload: &[u8], raw_size: usize) -> Result<Vec<u8>> {
    trace!("Decompressing LZFu: {} bytes -> {} bytes (expected)", payload.len(), raw_size);

    let mut ring = [0u8; RING_BUFFER_SIZE];
    ring[..RTF_PREBUF.len()].copy_from_slice(RTF_PREBUF);
    let mut write_pos = RTF_PREBUF.len();

    let mut output = Vec::with_capacity(raw_size);
    let mut input = payload.iter().copied();

    'outer: while output.len() < raw_size {
        let Some(mut control) = input.next() else { break };
        for _ in 0..8 {
            if output.len() >= raw_size {
                break 'outer;
            }
            let is_reference = control & 1 == 1;
            control >>= 1;

            if is_reference {
                let (Some(high), Some(low)) = (input.next(), input.next()) else {
                    break 'outer;
                };
                let word = u16::from_be_bytes([high, low]);
                let mut read_pos = usize::from(word >> 4);
                let length = usize::from(word & 0x0F) + 2;
                for _ in 0..length {
                    if output.len() >= raw_size {
                        break;
                    }
                    let byte = ring[read_pos];
                    output.push(byte);
                    ring[write_pos] = byte;
                    write_pos = (write_pos + 1) % RING_BUFFER_SIZE;
                    read_pos = (read_pos + 1) % RING_BUFFER_SIZE;
                }
            } else {
                let Some(byte) = input.next() else { break 'outer };
                output.push(byte);
                ring[write_pos] = byte;
                write_pos = (write_pos + 1) % RING_BUFFER_SIZE;
            }
        }
    }

    if output.len() != raw_size {
        return Err(PstError::SizeMismatch {
            context: "LZFu decompressed RTF",
            expected: raw_size as u64,
            found: output.len() as u64,
        });
    }
    Ok(output)
}
