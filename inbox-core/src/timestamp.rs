//! Lenient timestamp parsing for collaborator payloads.
//!
//! Backends hand out RFC 3339 strings, Postgres-style `YYYY-MM-DD HH:MM:SS+00`
//! strings, epoch milliseconds, or Firestore timestamp objects
//! (`{"seconds", "nanoseconds"}`, also seen as `_seconds`/`_nanoseconds`).
//! Anything unparseable becomes `None` so a bad timestamp degrades to a
//! placeholder instead of failing the payload.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

pub fn from_seconds(seconds: i64, nanoseconds: u32) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, nanoseconds).single()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Millis(i64),
    Fractional(f64),
    Seconds {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds", alias = "nanos")]
        nanoseconds: u32,
    },
    Other(IgnoredAny),
}

/// `deserialize_with` target for `Option<DateTime<Utc>>` fields.
pub fn lenient<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawTimestamp::Text(s)) => parse(&s),
        Some(RawTimestamp::Millis(ms)) => from_millis(ms),
        Some(RawTimestamp::Fractional(ms)) if ms.is_finite() => from_millis(ms as i64),
        Some(RawTimestamp::Seconds {
            seconds,
            nanoseconds,
        }) => from_seconds(seconds, nanoseconds),
        _ => None,
    })
}
