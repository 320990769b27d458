//! In-memory trace model shared by the waveform readers and writers

use super::{miniseed, sac, Coordinates, FormatError, FormatResult};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// On-disk waveform encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformFormat {
    MiniSeed,
    Sac,
}

impl WaveformFormat {
    /// Tag stored in the `format` column
    pub fn as_str(&self) -> &'static str {
        match self {
            WaveformFormat::MiniSeed => "MSEED",
            WaveformFormat::Sac => "SAC",
        }
    }

    /// Parse a stored tag or a `format` query value, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mseed" => Some(WaveformFormat::MiniSeed),
            "sac" => Some(WaveformFormat::Sac),
            _ => None,
        }
    }
}

/// Sample values, kept in the precision they were read with
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::Int(v) => v.len(),
            Samples::Float(v) => v.len(),
            Samples::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lossy conversion used by writers that only know single precision
    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            Samples::Int(v) => v.iter().map(|&x| x as f32).collect(),
            Samples::Float(v) => v.clone(),
            Samples::Double(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }

    /// Append samples of the same kind; returns false on a kind mismatch
    pub(crate) fn extend(&mut self, other: Samples) -> bool {
        match (self, other) {
            (Samples::Int(a), Samples::Int(b)) => a.extend(b),
            (Samples::Float(a), Samples::Float(b)) => a.extend(b),
            (Samples::Double(a), Samples::Double(b)) => a.extend(b),
            _ => return false,
        }
        true
    }
}

/// Trace header
#[derive(Debug, Clone, PartialEq)]
pub struct TraceStats {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub starttime: DateTime<Utc>,
    /// Samples per second
    pub sampling_rate: f64,
    /// Only SAC carries station coordinates
    pub coordinates: Option<Coordinates>,
}

/// One contiguous, evenly sampled time series
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub stats: TraceStats,
    pub data: Samples,
}

impl Trace {
    pub fn npts(&self) -> usize {
        self.data.len()
    }

    /// `NET.STA.LOC.CHA`
    pub fn id(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.stats.network, self.stats.station, self.stats.location, self.stats.channel
        )
    }

    /// Time of the last sample, or `None` when it lies outside the timestamp range
    pub fn checked_endtime(&self) -> Option<DateTime<Utc>> {
        offset_of_sample(self.npts().saturating_sub(1), self.stats.sampling_rate)
            .and_then(|offset| self.stats.starttime.checked_add_signed(offset))
    }

    /// Time of the last sample
    ///
    /// Traces built by the readers always have one; any other trace whose
    /// span overflows reports the latest representable time.
    pub fn endtime(&self) -> DateTime<Utc> {
        self.checked_endtime().unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Largest time offset accepted from a file header, roughly 3000 years
const MAX_OFFSET_SECONDS: f64 = 1e11;

/// Offset of `seconds` from a reference time
pub(crate) fn offset_from_seconds(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() || seconds.abs() > MAX_OFFSET_SECONDS {
        return None;
    }
    Some(Duration::microseconds((seconds * 1e6).round() as i64))
}

/// Time offset of sample `index` from the first sample
pub(crate) fn offset_of_sample(index: usize, sampling_rate: f64) -> Option<Duration> {
    if sampling_rate <= 0.0 || index == 0 {
        return Some(Duration::zero());
    }
    offset_from_seconds(index as f64 / sampling_rate)
}

/// Time of sample `index` of `trace`
pub(crate) fn time_of_sample(trace: &Trace, index: usize, format: &'static str) -> FormatResult<DateTime<Utc>> {
    offset_of_sample(index, trace.stats.sampling_rate)
        .and_then(|offset| trace.stats.starttime.checked_add_signed(offset))
        .ok_or_else(|| FormatError::malformed(format, "trace extends beyond the supported time range"))
}

/// Reject traces whose last sample cannot be timed
pub(crate) fn check_span(trace: &Trace, format: &'static str) -> FormatResult<()> {
    time_of_sample(trace, trace.npts().saturating_sub(1), format).map(|_| ())
}

/// A decoded waveform file
#[derive(Debug, Clone)]
pub struct Waveform {
    pub format: WaveformFormat,
    pub traces: Vec<Trace>,
}

/// Read a waveform file, sniffing MiniSEED first and SAC second
pub fn read_waveform(data: &[u8]) -> FormatResult<Waveform> {
    if miniseed::is_miniseed(data) {
        let traces = miniseed::read_miniseed(data)?;
        return Ok(Waveform { format: WaveformFormat::MiniSeed, traces });
    }
    debug!("Not a MiniSEED file, trying SAC");

    if sac::is_sac(data) {
        let trace = sac::read_sac(data)?;
        return Ok(Waveform { format: WaveformFormat::Sac, traces: vec![trace] });
    }
    debug!("Not a SAC file");

    Err(FormatError::Unrecognized("Could not read the waveform file.".to_string()))
}

/// Serialise a single trace
pub fn write_trace(trace: &Trace, format: WaveformFormat) -> FormatResult<Vec<u8>> {
    match format {
        WaveformFormat::MiniSeed => miniseed::write_miniseed(trace),
        WaveformFormat::Sac => Ok(sac::write_sac(trace)),
    }
}
