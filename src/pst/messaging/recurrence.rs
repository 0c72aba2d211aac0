//! Appointment recurrence blob (`PidLidAppointmentRecur`) decoding.
//!
//! The blob is a recurrence pattern followed by appointment-specific data:
//!
//! ```text
//! ReaderVersion u16, WriterVersion u16,
//! RecurFrequency u16, PatternType u16, CalendarType u16,
//! FirstDateTime u32, Period u32, SlidingFlag u32,
//! PatternTypeSpecific (0, 4 or 8 bytes by pattern type),
//! EndType u32, OccurrenceCount u32, FirstDOW u32,
//! DeletedInstanceCount u32, DeletedInstanceDates[] u32,
//! ModifiedInstanceCount u32, ModifiedInstanceDates[] u32,
//! StartDate u32, EndDate u32,
//! ReaderVersion2 u32, WriterVersion2 u32, StartTimeOffset u32, EndTimeOffset u32,
//! ExceptionCount u16, ExceptionInfo[],
//! ReservedBlock1Size u32, ReservedBlock1,
//! ExtendedException[] (one per ExceptionInfo),
//! ReservedBlock2Size u32, ReservedBlock2
//! ```
//!
//! All times are minutes since 1601-01-01 in the appointment's local time.

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use encoding_rs::WINDOWS_1252;
use log::trace;

use crate::pst::types::error::{PstError, Result};
use crate::pst::utils::{decode_8bit, decode_utf16le};

use super::time::minutes_to_local;
use super::timezone::TimeZoneRule;

/// Writer version from which extended exceptions carry a change highlight.
const WRITER_VERSION_CHANGE_HIGHLIGHT: u32 = 0x3009;

const ARO_SUBJECT: u16 = 0x0001;
const ARO_MEETINGTYPE: u16 = 0x0002;
const ARO_REMINDERDELTA: u16 = 0x0004;
const ARO_REMINDER: u16 = 0x0008;
const ARO_LOCATION: u16 = 0x0010;
const ARO_BUSYSTATUS: u16 = 0x0020;
const ARO_ATTACHMENT: u16 = 0x0040;
const ARO_SUBTYPE: u16 = 0x0080;
const ARO_APPTCOLOR: u16 = 0x0100;
const ARO_EXCEPTIONAL_BODY: u16 = 0x0200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceFrequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Other(u16),
}

impl From<u16> for RecurrenceFrequency {
    fn from(value: u16) -> Self {
        match value {
            0x200A => Self::Daily,
            0x200B => Self::Weekly,
            0x200C => Self::Monthly,
            0x200D => Self::Yearly,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternType {
    Day,
    Week,
    Month,
    MonthNth,
    MonthEnd,
    HijriMonth,
    HijriMonthNth,
    HijriMonthEnd,
    Other(u16),
}

impl From<u16> for PatternType {
    fn from(value: u16) -> Self {
        match value {
            0x0000 => Self::Day,
            0x0001 => Self::Week,
            0x0002 => Self::Month,
            0x0003 => Self::MonthNth,
            0x0004 => Self::MonthEnd,
            0x000A => Self::HijriMonth,
            0x000B => Self::HijriMonthNth,
            0x000C => Self::HijriMonthEnd,
            other => Self::Other(other),
        }
    }
}

/// Pattern-type specific data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternSpecific {
    None,
    /// Bit mask of weekdays, bit 0 = Sunday.
    Week { days: u32 },
    /// Day of the month.
    Month { day: u32 },
    /// The `nth` occurrence (5 = last) of any weekday in `days`.
    MonthNth { days: u32, nth: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndType {
    AfterDate,
    AfterOccurrences,
    Never,
    Other(u32),
}

impl From<u32> for EndType {
    fn from(value: u32) -> Self {
        match value {
            0x2021 => Self::AfterDate,
            0x2022 => Self::AfterOccurrences,
            0x2023 | 0xFFFF_FFFF => Self::Never,
            other => Self::Other(other),
        }
    }
}

/// One modified instance of a recurring series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExceptionInfo {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub original_start: Option<NaiveDateTime>,
    pub override_flags: u16,
    pub subject: Option<String>,
    pub meeting_type: Option<u32>,
    pub reminder_delta: Option<u32>,
    pub reminder_set: Option<bool>,
    pub location: Option<String>,
    pub busy_status: Option<u32>,
    pub has_attachment: Option<bool>,
    pub sub_type: Option<u32>,
    pub appointment_color: Option<u32>,
    pub has_exceptional_body: bool,
    pub change_highlight: Option<u32>,
}

/// A decoded appointment recurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrencePattern {
    pub frequency: RecurrenceFrequency,
    pub pattern_type: PatternType,
    pub calendar_type: u16,
    pub first_date_time: u32,
    pub period: u32,
    pub sliding_flag: u32,
    pub pattern_specific: PatternSpecific,
    pub end_type: EndType,
    pub occurrence_count: u32,
    pub first_day_of_week: u32,
    pub deleted_instances: Vec<NaiveDateTime>,
    pub modified_instances: Vec<NaiveDateTime>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub writer_version: u32,
    /// Minutes after midnight each occurrence starts.
    pub start_time_offset: u32,
    pub end_time_offset: u32,
    pub exceptions: Vec<ExceptionInfo>,
    pub time_zone: Option<TimeZoneRule>,
}

fn truncated(what: &str) -> impl Fn(std::io::Error) -> PstError + '_ {
    move |_| PstError::InvalidFormat(format!("Recurrence blob truncated in {}", what))
}

fn read_bytes<'a>(cursor: &mut &'a [u8], len: usize, what: &str) -> Result<&'a [u8]> {
    if cursor.len() < len {
        return Err(PstError::InvalidFormat(format!(
            "Recurrence blob truncated in {}",
            what
        )));
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}

fn read_dates(cursor: &mut &[u8], what: &str) -> Result<Vec<NaiveDateTime>> {
    let count = cursor.read_u32::<LittleEndian>().map_err(truncated(what))? as usize;
    let raw = read_bytes(cursor, count.saturating_mul(4), what)?;
    Ok(raw
        .chunks_exact(4)
        .filter_map(|chunk| minutes_to_local(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect())
}

impl RecurrencePattern {
    /// Decodes a recurrence blob. Local times are interpreted in `time_zone`.
    pub fn parse(data: &[u8], time_zone: Option<TimeZoneRule>) -> Result<Self> {
        let mut cursor = data;
        let c = &mut cursor;

        let _reader_version = c.read_u16::<LittleEndian>().map_err(truncated("header"))?;
        let _writer_version = c.read_u16::<LittleEndian>().map_err(truncated("header"))?;
        let frequency = RecurrenceFrequency::from(c.read_u16::<LittleEndian>().map_err(truncated("header"))?);
        let raw_pattern_type = c.read_u16::<LittleEndian>().map_err(truncated("header"))?;
        let pattern_type = PatternType::from(raw_pattern_type);
        let calendar_type = c.read_u16::<LittleEndian>().map_err(truncated("header"))?;
        let first_date_time = c.read_u32::<LittleEndian>().map_err(truncated("header"))?;
        let period = c.read_u32::<LittleEndian>().map_err(truncated("header"))?;
        let sliding_flag = c.read_u32::<LittleEndian>().map_err(truncated("header"))?;

        let pattern_specific = match raw_pattern_type {
            0x0000 => PatternSpecific::None,
            0x0001 => PatternSpecific::Week {
                days: c.read_u32::<LittleEndian>().map_err(truncated("pattern"))?,
            },
            0x0003 | 0x000B => PatternSpecific::MonthNth {
                days: c.read_u32::<LittleEndian>().map_err(truncated("pattern"))?,
                nth: c.read_u32::<LittleEndian>().map_err(truncated("pattern"))?,
            },
            _ => PatternSpecific::Month {
                day: c.read_u32::<LittleEndian>().map_err(truncated("pattern"))?,
            },
        };

        let end_type = EndType::from(c.read_u32::<LittleEndian>().map_err(truncated("range"))?);
        let occurrence_count = c.read_u32::<LittleEndian>().map_err(truncated("range"))?;
        let first_day_of_week = c.read_u32::<LittleEndian>().map_err(truncated("range"))?;
        let deleted_instances = read_dates(c, "deleted instances")?;
        let modified_instances = read_dates(c, "modified instances")?;
        let start_date = minutes_to_local(c.read_u32::<LittleEndian>().map_err(truncated("range"))?);
        let end_date = minutes_to_local(c.read_u32::<LittleEndian>().map_err(truncated("range"))?);

        let _reader_version2 = c.read_u32::<LittleEndian>().map_err(truncated("versions"))?;
        let writer_version = c.read_u32::<LittleEndian>().map_err(truncated("versions"))?;
        let start_time_offset = c.read_u32::<LittleEndian>().map_err(truncated("offsets"))?;
        let end_time_offset = c.read_u32::<LittleEndian>().map_err(truncated("offsets"))?;
        let exception_count = c.read_u16::<LittleEndian>().map_err(truncated("exceptions"))? as usize;
        trace!(
            "Recurrence: {:?}/{:?}, period={}, {} deleted, {} modified, {} exceptions",
            frequency,
            pattern_type,
            period,
            deleted_instances.len(),
            modified_instances.len(),
            exception_count
        );

        let mut exceptions = Vec::with_capacity(exception_count);
        for _ in 0..exception_count {
            exceptions.push(read_exception_info(c)?);
        }

        let reserved_size = c.read_u32::<LittleEndian>().map_err(truncated("reserved block"))? as usize;
        read_bytes(c, reserved_size, "reserved block")?;

        for exception in exceptions.iter_mut() {
            read_extended_exception(c, writer_version, exception)?;
        }

        Ok(Self {
            frequency,
            pattern_type,
            calendar_type,
            first_date_time,
            period,
            sliding_flag,
            pattern_specific,
            end_type,
            occurrence_count,
            first_day_of_week,
            deleted_instances,
            modified_instances,
            start_date,
            end_date,
            writer_version,
            start_time_offset,
            end_time_offset,
            exceptions,
            time_zone,
        })
    }

    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match &self.time_zone {
            Some(zone) => zone.to_utc(local),
            None => Utc.from_utc_datetime(&local),
        }
    }

    /// Start of the first occurrence, in UTC.
    pub fn first_start(&self) -> Option<DateTime<Utc>> {
        let start = self.start_date? + Duration::minutes(i64::from(self.start_time_offset));
        Some(self.to_utc(start))
    }

    /// End of the recurrence range, in UTC.
    pub fn range_end(&self) -> Option<DateTime<Utc>> {
        self.end_date.map(|end| self.to_utc(end))
    }

    /// Calendar day of `time` in the recurrence's time zone.
    fn local_day(&self, time: &DateTime<Utc>) -> NaiveDate {
        match &self.time_zone {
            Some(zone) => zone.to_local(time).date(),
            None => time.date_naive(),
        }
    }

    /// Finds the exception whose original occurrence falls on the same
    /// calendar day as `replace_time`, in the recurrence's time zone.
    pub fn exception_for(&self, replace_time: &DateTime<Utc>) -> Option<usize> {
        let day = self.local_day(replace_time);
        self.exceptions.iter().position(|exception| {
            exception
                .original_start
                .map(|start| start.date() == day)
                .unwrap_or(false)
        })
    }

    /// Whether the occurrence on `day` has been deleted.
    pub fn is_deleted(&self, day: NaiveDate) -> bool {
        self.deleted_instances.iter().any(|deleted| deleted.date() == day)
    }
}

fn read_exception_info(c: &mut &[u8]) -> Result<ExceptionInfo> {
    let start = c.read_u32::<LittleEndian>().map_err(truncated("exception"))?;
    let end = c.read_u32::<LittleEndian>().map_err(truncated("exception"))?;
    let original_start = c.read_u32::<LittleEndian>().map_err(truncated("exception"))?;
    let flags = c.read_u16::<LittleEndian>().map_err(truncated("exception"))?;

    let mut info = ExceptionInfo {
        start: minutes_to_local(start),
        end: minutes_to_local(end),
        original_start: minutes_to_local(original_start),
        override_flags: flags,
        has_exceptional_body: flags & ARO_EXCEPTIONAL_BODY != 0,
        ..Default::default()
    };
    let read_u32 = |c: &mut &[u8]| c.read_u32::<LittleEndian>().map_err(truncated("exception"));

    if flags & ARO_SUBJECT != 0 {
        info.subject = Some(read_short_string(c)?);
    }
    if flags & ARO_MEETINGTYPE != 0 {
        info.meeting_type = Some(read_u32(c)?);
    }
    if flags & ARO_REMINDERDELTA != 0 {
        info.reminder_delta = Some(read_u32(c)?);
    }
    if flags & ARO_REMINDER != 0 {
        info.reminder_set = Some(read_u32(c)? != 0);
    }
    if flags & ARO_LOCATION != 0 {
        info.location = Some(read_short_string(c)?);
    }
    if flags & ARO_BUSYSTATUS != 0 {
        info.busy_status = Some(read_u32(c)?);
    }
    if flags & ARO_ATTACHMENT != 0 {
        info.has_attachment = Some(read_u32(c)? != 0);
    }
    if flags & ARO_SUBTYPE != 0 {
        info.sub_type = Some(read_u32(c)?);
    }
    if flags & ARO_APPTCOLOR != 0 {
        info.appointment_color = Some(read_u32(c)?);
    }
    Ok(info)
}

/// `Length u16, Length2 u16, bytes[Length2]` in the 8-bit code page.
fn read_short_string(c: &mut &[u8]) -> Result<String> {
    let _length = c.read_u16::<LittleEndian>().map_err(truncated("exception string"))?;
    let length2 = c.read_u16::<LittleEndian>().map_err(truncated("exception string"))? as usize;
    let bytes = read_bytes(c, length2, "exception string")?;
    Ok(decode_8bit(bytes, WINDOWS_1252))
}

fn read_extended_exception(c: &mut &[u8], writer_version: u32, info: &mut ExceptionInfo) -> Result<()> {
    if writer_version >= WRITER_VERSION_CHANGE_HIGHLIGHT {
        let size = c.read_u32::<LittleEndian>().map_err(truncated("change highlight"))? as usize;
        let block = read_bytes(c, size, "change highlight")?;
        if block.len() >= 4 {
            info.change_highlight = Some(u32::from_le_bytes([block[0], block[1], block[2], block[3]]));
        }
    }
    let reserved = c.read_u32::<LittleEndian>().map_err(truncated("extended exception"))? as usize;
    read_bytes(c, reserved, "extended exception")?;

    if info.override_flags & (ARO_SUBJECT | ARO_LOCATION) != 0 {
        // Start, end and original start repeat the exception info.
        read_bytes(c, 12, "extended exception")?;
        if info.override_flags & ARO_SUBJECT != 0 {
            info.subject = Some(read_wide_string(c)?);
        }
        if info.override_flags & ARO_LOCATION != 0 {
            info.location = Some(read_wide_string(c)?);
        }
        let reserved = c.read_u32::<LittleEndian>().map_err(truncated("extended exception"))? as usize;
        read_bytes(c, reserved, "extended exception")?;
    }
    Ok(())
}

/// `Length u16` (in characters), then UTF-16LE text.
fn read_wide_string(c: &mut &[u8]) -> Result<String> {
    let length = c.read_u16::<LittleEndian>().map_err(truncated("wide string"))? as usize;
    decode_utf16le(read_bytes(c, length * 2, "wide string")?)
}
