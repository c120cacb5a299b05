use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

const ISO_NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const CALENDAR_DATE_FORMAT: &str = "%Y-%m-%d";

pub fn exchange_offset(gmtoffset_secs: i32) -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(gmtoffset_secs)
        .with_context(|| format!("invalid exchange gmtoffset: {gmtoffset_secs}s"))
}

/// Converts an upstream unix timestamp into the exchange's local trading day,
/// pinned at local midnight so every daily bar lands on its session date.
pub fn daily_bar_timestamp(
    unix_secs: i64,
    offset: FixedOffset,
) -> anyhow::Result<DateTime<FixedOffset>> {
    let utc = Utc
        .timestamp_opt(unix_secs, 0)
        .single()
        .with_context(|| format!("timestamp out of range: {unix_secs}"))?;
    let session_date = utc.with_timezone(&offset).date_naive();
    let midnight = session_date
        .and_hms_opt(0, 0, 0)
        .context("invalid midnight for session date")?;
    offset
        .from_local_datetime(&midnight)
        .single()
        .with_context(|| format!("ambiguous local midnight for {session_date}"))
}

/// Drops the offset and keeps the wall-clock reading as is.
pub fn to_naive_wall_clock(ts: &DateTime<FixedOffset>) -> NaiveDateTime {
    ts.naive_local()
}

pub fn iso_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(ISO_NAIVE_FORMAT).to_string()
}

pub fn calendar_date(ts: &NaiveDateTime) -> String {
    ts.format(CALENDAR_DATE_FORMAT).to_string()
}
