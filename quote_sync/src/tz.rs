//! Time zone and timestamp helpers.
//!
//! - [`parse_tz`]: IANA name to [`chrono_tz::Tz`].
//! - [`today_in`]: the current calendar day in the market's zone. The recent
//!   window is anchored here, not at the UTC date, so that a run just after
//!   midnight in Tokyo already treats the new session day as "today".
//! - [`to_rfc3339_millis`] / [`parse_ts_to_utc`]: the text form every timestamp
//!   takes in the database.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Parse an IANA time zone name (e.g., "Asia/Tokyo").
pub fn parse_tz(name: &str) -> anyhow::Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("bad tz: {name}"))
}

/// Calendar date of `now` as seen in `tz`.
pub fn today_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// RFC-3339 with offset -> UTC.
pub fn parse_ts_to_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(s).with_context(|| format!("bad rfc3339: {s}"))?;
    Ok(dt.with_timezone(&Utc))
}

/// Format a UTC datetime as an RFC-3339 string with millisecond precision.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
