//! Timestamp utilities
//!
//! All times are UTC. SQLite stores them as text with microsecond precision
//! so that string equality in unique indexes matches instant equality.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::{Error, Result};

const DB_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Text representation used in database columns
pub fn to_db_string(time: &DateTime<Utc>) -> String {
    time.format(DB_FORMAT).to_string()
}

/// Parse a database column back into a timestamp
pub fn from_db_string(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, DB_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|source| Error::Timestamp { value: value.to_string(), source })
}

/// Seconds (with fraction) between two instants, `b - a`
pub fn seconds_between(a: &DateTime<Utc>, b: &DateTime<Utc>) -> f64 {
    let delta = *b - *a;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}
