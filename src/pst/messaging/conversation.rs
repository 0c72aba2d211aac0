//! Conversation index (`PR_CONVERSATION_INDEX`) decoding.
//!
//! ```text
//! [0..4]   time high   (big-endian)
//! [4..6]   time low    (big-endian, shifted left 16)
//! [6..22]  thread GUID (big-endian halves)
//! then one 5-byte big-endian group per response:
//!   bit 39      delta code
//!   bits 8..39  time delta
//!   bits 0..8   random salt
//! ```
//!
//! The header is read as stored by existing producers: the time-high word
//! starts at byte 0.

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::pst::types::error::{PstError, Result};

use super::time::filetime_from_parts;

const HEADER_SIZE: usize = 22;
const RESPONSE_LEVEL_SIZE: usize = 5;

/// One reply step of a conversation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseLevel {
    pub delta_code: bool,
    /// Time since the previous message, in milliseconds.
    pub time_delta_millis: i64,
    pub random: u8,
}

/// A decoded conversation index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationIndex {
    pub delivery_time: Option<DateTime<Utc>>,
    pub guid: Uuid,
    pub responses: Vec<ResponseLevel>,
}

impl ConversationIndex {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(PstError::InvalidFormat(format!(
                "Conversation index of {} bytes is shorter than its {}-byte header",
                data.len(),
                HEADER_SIZE
            )));
        }
        let time_high = BigEndian::read_u32(&data[0..4]);
        let time_low = u32::from(BigEndian::read_u16(&data[4..6])) << 16;
        let delivery_time = filetime_from_parts(time_high, time_low);

        let guid_high = BigEndian::read_u64(&data[6..14]);
        let guid_low = BigEndian::read_u64(&data[14..22]);
        let guid = Uuid::from_u64_pair(guid_high, guid_low);

        let level_count = (data.len() - HEADER_SIZE) / RESPONSE_LEVEL_SIZE;
        let responses = data[HEADER_SIZE..]
            .chunks_exact(RESPONSE_LEVEL_SIZE)
            .take(level_count)
            .map(|group| {
                let value = BigEndian::read_uint(group, RESPONSE_LEVEL_SIZE);
                let delta_code = (value >> 39) & 1 == 1;
                let delta = (value >> 8) & 0x7FFF_FFFF;
                let ticks = if delta_code { delta << 23 } else { delta << 18 };
                ResponseLevel {
                    delta_code,
                    time_delta_millis: (ticks / 10_000) as i64,
                    random: (value & 0xFF) as u8,
                }
            })
            .collect();

        Ok(Self {
            delivery_time,
            guid,
            responses,
        })
    }
}
