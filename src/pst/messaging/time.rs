//! FILETIME and appointment-minute conversions.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use super::timezone::TimeZoneRule;

/// Milliseconds between 1601-01-01 and 1970-01-01.
pub const FILETIME_EPOCH_OFFSET_MILLIS: i64 = 11_644_473_600_000;
const SECONDS_FROM_1601_TO_1970: i64 = FILETIME_EPOCH_OFFSET_MILLIS / 1000;
const TICKS_PER_MILLISECOND: i64 = 10_000;

/// Converts a FILETIME (100 ns ticks since 1601-01-01 UTC) to UTC.
pub fn filetime_to_datetime(filetime: i64) -> Option<DateTime<Utc>> {
    let millis = filetime / TICKS_PER_MILLISECOND - FILETIME_EPOCH_OFFSET_MILLIS;
    Utc.timestamp_millis_opt(millis).single()
}

/// Converts a FILETIME given as its high and low 32-bit halves.
pub fn filetime_from_parts(high: u32, low: u32) -> Option<DateTime<Utc>> {
    filetime_to_datetime(((u64::from(high) << 32) | u64::from(low)) as i64)
}

/// Converts a UTC instant back to FILETIME ticks.
pub fn datetime_to_filetime(time: &DateTime<Utc>) -> i64 {
    (time.timestamp_millis() + FILETIME_EPOCH_OFFSET_MILLIS) * TICKS_PER_MILLISECOND
}

/// Converts minutes since 1601-01-01 (the unit of recurrence blobs) to a
/// wall-clock time.
pub fn minutes_to_local(minutes: u32) -> Option<NaiveDateTime> {
    let seconds = i64::from(minutes) * 60 - SECONDS_FROM_1601_TO_1970;
    Utc.timestamp_opt(seconds, 0)
        .single()
        .map(|time| time.naive_utc())
}

/// Converts appointment minutes in local time to UTC.
///
/// Without a time zone the wall-clock time is taken as UTC.
pub fn appointment_time_to_utc(minutes: u32, zone: Option<&TimeZoneRule>) -> Option<DateTime<Utc>> {
    let local = minutes_to_local(minutes)?;
    Some(match zone {
        Some(zone) => zone.to_utc(local),
        None => Utc.from_utc_datetime(&local),
    })
}
