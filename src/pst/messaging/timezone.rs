//! Time zone rules stored in appointment properties.
//!
//! Two encodings are read:
//!
//! - the 48-byte time zone struct
//!   (`lBias, lStandardBias, lDaylightBias, wStandardYear, stStandardDate,
//!   wDaylightYear, stDaylightDate`)
//! - the time zone definition, a header with the zone's key name followed by
//!   66-byte rules of which the one flagged effective is used
//!
//! Biases are minutes to add to local time to get UTC. A transition whose
//! `wYear` is zero is a floating rule: the `wDay`-th `wDayOfWeek` of the
//! month, where day 5 means the last such weekday.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};

use crate::pst::types::error::{PstError, Result};
use crate::pst::utils::{decode_utf16le, slice_at};

const TZ_STRUCT_SIZE: usize = 48;
const TZ_RULE_SIZE: usize = 66;
const TZ_RULE_FLAG_EFFECTIVE: u16 = 0x0002;

/// A packed `SYSTEMTIME`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemTime {
    pub year: u16,
    pub month: u16,
    pub day_of_week: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub milliseconds: u16,
}

impl SystemTime {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let fields = slice_at(bytes, 0, 16)?;
        let field = |index: usize| LittleEndian::read_u16(&fields[index * 2..index * 2 + 2]);
        Ok(Self {
            year: field(0),
            month: field(1),
            day_of_week: field(2),
            day: field(3),
            hour: field(4),
            minute: field(5),
            second: field(6),
            milliseconds: field(7),
        })
    }
}

/// Which weekday of the month a floating transition falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    Nth(u8),
    Last,
}

/// A transition into standard or daylight time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Recurs every year on a weekday of a month.
    Floating {
        month: u32,
        weekday: Weekday,
        occurrence: Occurrence,
        hour: u32,
        minute: u32,
        second: u32,
    },
    /// Happens once, on a fixed date.
    Fixed(NaiveDateTime),
}

impl Transition {
    fn from_system_time(time: &SystemTime) -> Option<Self> {
        if time.month == 0 {
            return None;
        }
        if time.year != 0 {
            let date = NaiveDate::from_ymd_opt(
                i32::from(time.year),
                u32::from(time.month),
                u32::from(time.day),
            )?;
            let at = date.and_hms_opt(
                u32::from(time.hour),
                u32::from(time.minute),
                u32::from(time.second),
            )?;
            return Some(Transition::Fixed(at));
        }
        let occurrence = match time.day {
            1..=4 => Occurrence::Nth(time.day as u8),
            5 => Occurrence::Last,
            _ => return None,
        };
        Some(Transition::Floating {
            month: u32::from(time.month),
            weekday: weekday_from_sunday(time.day_of_week)?,
            occurrence,
            hour: u32::from(time.hour),
            minute: u32::from(time.minute),
            second: u32::from(time.second),
        })
    }

    /// The local wall-clock instant of this transition in `year`.
    pub fn in_year(&self, year: i32) -> Option<NaiveDateTime> {
        match *self {
            Transition::Fixed(at) => Some(at),
            Transition::Floating {
                month,
                weekday,
                occurrence,
                hour,
                minute,
                second,
            } => {
                let date = match occurrence {
                    Occurrence::Nth(n) => NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)?,
                    Occurrence::Last => last_weekday_of_month(year, month, weekday)?,
                };
                date.and_hms_opt(hour, minute, second)
            }
        }
    }
}

fn weekday_from_sunday(day: u16) -> Option<Weekday> {
    Some(match day {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        6 => Weekday::Sat,
        _ => return None,
    })
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let mut date = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    while date.weekday() != weekday {
        date = date.pred_opt()?;
    }
    Some(date)
}

/// A time zone: base bias plus optional daylight saving rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeZoneRule {
    pub name: Option<String>,
    /// Minutes added to local time to get UTC.
    pub bias: i32,
    pub standard_bias: i32,
    pub daylight_bias: i32,
    pub standard_date: SystemTime,
    pub daylight_date: SystemTime,
}

impl TimeZoneRule {
    /// Parses the 48-byte time zone struct.
    pub fn from_struct(bytes: &[u8]) -> Result<Self> {
        let bytes = slice_at(bytes, 0, TZ_STRUCT_SIZE)?;
        Ok(Self {
            name: None,
            bias: LittleEndian::read_i32(&bytes[0..4]),
            standard_bias: LittleEndian::read_i32(&bytes[4..8]),
            daylight_bias: LittleEndian::read_i32(&bytes[8..12]),
            standard_date: SystemTime::parse(&bytes[14..30])?,
            daylight_date: SystemTime::parse(&bytes[32..48])?,
        })
    }

    /// Parses a time zone definition, selecting the rule flagged effective.
    ///
    /// ```text
    /// bMajorVersion u8, bMinorVersion u8, cbHeader u16, wReserved u16,
    /// cchKeyName u16, KeyName (UTF-16), cRules u16, ...
    /// rules start at 4 + cbHeader, 66 bytes each:
    ///   bMajorVersion, bMinorVersion, wReserved, TZRuleFlags u16, wYear u16,
    ///   X[14], lBias, lStandardBias, lDaylightBias, stStandardDate, stDaylightDate
    /// ```
    pub fn from_definition(bytes: &[u8]) -> Result<Self> {
        let header = slice_at(bytes, 0, 8)?;
        let header_size = LittleEndian::read_u16(&header[2..4]) as usize;
        let name_size = LittleEndian::read_u16(&header[6..8]) as usize * 2;
        let name = decode_utf16le(slice_at(bytes, 8, name_size)?)?;
        let rule_count = LittleEndian::read_u16(slice_at(bytes, 8 + name_size, 2)?) as usize;
        if rule_count == 0 {
            return Err(PstError::InvalidFormat(
                "Time zone definition has no rules".to_string(),
            ));
        }

        let first_rule = 4 + header_size;
        let mut effective = None;
        for index in 0..rule_count {
            let rule = slice_at(bytes, first_rule + index * TZ_RULE_SIZE, TZ_RULE_SIZE)?;
            let flags = LittleEndian::read_u16(&rule[4..6]);
            if flags & TZ_RULE_FLAG_EFFECTIVE != 0 {
                effective = Some(rule);
                break;
            }
        }
        let rule = match effective {
            Some(rule) => rule,
            None => slice_at(bytes, first_rule, TZ_RULE_SIZE)?,
        };

        let body = &rule[6..];
        Ok(Self {
            name: if name.is_empty() { None } else { Some(name) },
            bias: LittleEndian::read_i32(&body[16..20]),
            standard_bias: LittleEndian::read_i32(&body[20..24]),
            daylight_bias: LittleEndian::read_i32(&body[24..28]),
            standard_date: SystemTime::parse(&body[28..44])?,
            daylight_date: SystemTime::parse(&body[44..60])?,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn has_daylight_saving(&self) -> bool {
        self.standard_date.month != 0 && self.daylight_date.month != 0
    }

    pub fn standard_transition(&self) -> Option<Transition> {
        Transition::from_system_time(&self.standard_date)
    }

    pub fn daylight_transition(&self) -> Option<Transition> {
        Transition::from_system_time(&self.daylight_date)
    }

    /// Whether a local wall-clock time falls in daylight saving time.
    pub fn is_daylight(&self, local: NaiveDateTime) -> bool {
        if !self.has_daylight_saving() {
            return false;
        }
        let year = local.year();
        let (Some(daylight_start), Some(standard_start)) = (
            self.daylight_transition().and_then(|t| t.in_year(year)),
            self.standard_transition().and_then(|t| t.in_year(year)),
        ) else {
            return false;
        };
        if daylight_start < standard_start {
            local >= daylight_start && local < standard_start
        } else {
            !(local >= standard_start && local < daylight_start)
        }
    }

    /// Minutes to add to `local` to get UTC.
    pub fn total_bias(&self, local: NaiveDateTime) -> i32 {
        if self.is_daylight(local) {
            self.bias.saturating_add(self.daylight_bias)
        } else {
            self.bias.saturating_add(self.standard_bias)
        }
    }

    /// UTC offset in minutes (east positive) at `local`.
    pub fn utc_offset_minutes(&self, local: NaiveDateTime) -> i32 {
        self.total_bias(local).saturating_neg()
    }

    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let utc = local + Duration::minutes(i64::from(self.total_bias(local)));
        Utc.from_utc_datetime(&utc)
    }

    pub fn to_local(&self, time: &DateTime<Utc>) -> NaiveDateTime {
        let utc = time.naive_utc();
        let standard_bias = self.bias.saturating_add(self.standard_bias);
        let standard = utc - Duration::minutes(i64::from(standard_bias));
        if self.is_daylight(standard) {
            let daylight_bias = self.bias.saturating_add(self.daylight_bias);
            utc - Duration::minutes(i64::from(daylight_bias))
        } else {
            standard
        }
    }
}
