//! Readers and writers for the seismological file formats
//!
//! Station metadata: dataless SEED, XSEED and RESP.
//! Waveforms: MiniSEED and SAC.
//! Events: QuakeML.
//!
//! Readers never panic on hostile input; anything that does not look like
//! the expected format yields a [`FormatError`].

pub mod miniseed;
pub mod quakeml;
pub mod resp;
pub mod sac;
pub mod seed;
pub mod waveform;
pub mod xseed;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use waveform::{read_waveform, write_trace, Samples, Trace, TraceStats, Waveform, WaveformFormat};

/// Format reader error
#[derive(Debug, Error)]
pub enum FormatError {
    /// Input is not in the expected format at all
    #[error("Unrecognized format: {0}")]
    Unrecognized(String),

    /// Input looks like the format but is damaged
    #[error("Malformed {format} data: {message}")]
    Malformed { format: &'static str, message: String },

    /// Input is valid but contains nothing usable
    #[error("No {0} found in file")]
    Empty(&'static str),

    /// Valid file using a feature this reader does not implement
    #[error("Unsupported {format} feature: {message}")]
    Unsupported { format: &'static str, message: String },
}

impl FormatError {
    pub(crate) fn malformed(format: &'static str, message: impl Into<String>) -> Self {
        FormatError::Malformed { format, message: message.into() }
    }
}

pub type FormatResult<T> = std::result::Result<T, FormatError>;

/// Station coordinates, always taken together from a single source
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_in_m: f64,
    pub local_depth_in_m: f64,
}

/// Station metadata file flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StationFormat {
    #[serde(rename = "SEED")]
    Seed,
    #[serde(rename = "XSEED")]
    Xseed,
    #[serde(rename = "RESP")]
    Resp,
}

impl StationFormat {
    /// Tag stored in the `format` column
    pub fn as_str(&self) -> &'static str {
        match self {
            StationFormat::Seed => "SEED",
            StationFormat::Xseed => "XSEED",
            StationFormat::Resp => "RESP",
        }
    }
}

/// One channel epoch extracted from a station metadata file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelInfo {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub format: StationFormat,
    pub coordinates: Option<Coordinates>,
}

/// Read a station metadata file of any supported flavour
///
/// The format is sniffed by trial: SEED, then XSEED, then RESP. The error of
/// the last attempt is not meaningful on its own, so a generic
/// [`FormatError::Unrecognized`] is returned if every reader fails.
pub fn read_station_information(data: &[u8]) -> FormatResult<Vec<ChannelInfo>> {
    match seed::read_seed(data) {
        Ok(channels) => return Ok(channels),
        Err(e) => debug!("Not a SEED file: {}", e),
    }
    match xseed::read_xseed(data) {
        Ok(channels) => return Ok(channels),
        Err(e) => debug!("Not an XSEED file: {}", e),
    }
    match resp::read_resp(data) {
        Ok(channels) => return Ok(channels),
        Err(e) => debug!("Not a RESP file: {}", e),
    }
    Err(FormatError::Unrecognized(
        "Could not read the station information file.".to_string(),
    ))
}

/// Parse a SEED time string `YYYY,DDD[,HH[:MM[:SS[.FFFF]]]]`
///
/// Returns `None` for empty or non-time values such as `No Ending Time`.
pub fn parse_seed_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim().trim_end_matches('~').trim();
    if value.chars().take(4).filter(|c| c.is_ascii_digit()).count() < 4 {
        return None;
    }

    let mut parts = value.splitn(3, ',');
    let year: i32 = parts.next()?.trim().parse().ok()?;
    let julday: u32 = match parts.next() {
        Some(day) if !day.trim().is_empty() => day.trim().parse().ok()?,
        _ => 1,
    };
    let (hour, minute, second, micro) = match parts.next() {
        Some(clock) => parse_clock(clock.trim())?,
        None => (0, 0, 0, 0),
    };

    let date = NaiveDate::from_yo_opt(year, julday)?;
    let naive = date.and_hms_micro_opt(hour, minute, second, micro)?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Parse `HH[:MM[:SS[.FFFF]]]`
fn parse_clock(clock: &str) -> Option<(u32, u32, u32, u32)> {
    if clock.is_empty() {
        return Some((0, 0, 0, 0));
    }
    let mut fields = clock.split(':');
    let hour: u32 = fields.next()?.parse().ok()?;
    let minute: u32 = match fields.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    let (second, micro) = match fields.next() {
        Some(s) => match s.split_once('.') {
            Some((whole, frac)) => (whole.parse().ok()?, fraction_to_micros(frac)?),
            None => (s.parse().ok()?, 0),
        },
        None => (0, 0),
    };
    Some((hour, minute, second, micro))
}

/// Decimal fraction digits to microseconds, truncating past six digits
fn fraction_to_micros(frac: &str) -> Option<u32> {
    if frac.is_empty() {
        return Some(0);
    }
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut digits: String = frac.chars().take(6).collect();
    while digits.len() < 6 {
        digits.push('0');
    }
    digits.parse().ok()
}

/// Parse an ISO 8601 timestamp, with or without `Z` and fraction
pub fn parse_iso_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    let trimmed = value.trim_end_matches('Z');
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parse either a SEED or an ISO timestamp
pub fn parse_any_time(value: &str) -> Option<DateTime<Utc>> {
    parse_seed_time(value).or_else(|| parse_iso_time(value))
}
