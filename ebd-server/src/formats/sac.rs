//! Binary SAC reader and writer
//!
//! The header is 70 floats, 40 integers and 192 bytes of strings (632
//! bytes) followed by `npts` 32 bit floats. Byte order is detected from the
//! header version, which must be 6. `-12345` marks an undefined value.

use super::waveform::{check_span, offset_from_seconds, Samples, Trace, TraceStats};
use super::{Coordinates, FormatError, FormatResult};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

const FORMAT: &str = "SAC";
const HEADER_LEN: usize = 632;
const FLOATS: usize = 70;
const INTS: usize = 40;
const INT_OFFSET: usize = FLOATS * 4;
const STRING_OFFSET: usize = INT_OFFSET + INTS * 4;
const UNDEFINED: f32 = -12345.0;
const UNDEFINED_INT: i32 = -12345;
const UNDEFINED_STRING: &str = "-12345";

// Float header indices
const DELTA: usize = 0;
const DEPMIN: usize = 1;
const DEPMAX: usize = 2;
const B: usize = 5;
const E: usize = 6;
const STLA: usize = 31;
const STLO: usize = 32;
const STEL: usize = 33;
const STDP: usize = 34;
const DEPMEN: usize = 56;

// Integer header indices
const NZYEAR: usize = 0;
const NZJDAY: usize = 1;
const NZHOUR: usize = 2;
const NZMIN: usize = 3;
const NZSEC: usize = 4;
const NZMSEC: usize = 5;
const NVHDR: usize = 6;
const NPTS: usize = 9;
const IFTYPE: usize = 15;
const LEVEN: usize = 35;

const ITIME: i32 = 1;

// String header byte offsets and widths
const KSTNM: (usize, usize) = (0, 8);
const KHOLE: (usize, usize) = (24, 8);
const KCMPNM: (usize, usize) = (160, 8);
const KNETWK: (usize, usize) = (168, 8);

#[derive(Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

struct Header<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Header<'a> {
    fn word(&self, offset: usize) -> [u8; 4] {
        let mut w = [0u8; 4];
        w.copy_from_slice(&self.data[offset..offset + 4]);
        w
    }

    fn float(&self, index: usize) -> f32 {
        let w = self.word(index * 4);
        match self.order {
            ByteOrder::Little => f32::from_le_bytes(w),
            ByteOrder::Big => f32::from_be_bytes(w),
        }
    }

    fn defined_float(&self, index: usize) -> Option<f64> {
        let value = self.float(index);
        if value == UNDEFINED || !value.is_finite() {
            None
        } else {
            Some(f64::from(value))
        }
    }

    fn int(&self, index: usize) -> i32 {
        read_int(self.data, INT_OFFSET + index * 4, self.order)
    }

    fn string(&self, (offset, width): (usize, usize)) -> String {
        let start = STRING_OFFSET + offset;
        let raw = String::from_utf8_lossy(&self.data[start..start + width]);
        let value = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        if value == UNDEFINED_STRING {
            String::new()
        } else {
            value.to_string()
        }
    }
}

fn read_int(data: &[u8], offset: usize, order: ByteOrder) -> i32 {
    let mut w = [0u8; 4];
    w.copy_from_slice(&data[offset..offset + 4]);
    match order {
        ByteOrder::Little => i32::from_le_bytes(w),
        ByteOrder::Big => i32::from_be_bytes(w),
    }
}

fn detect_byte_order(data: &[u8]) -> Option<ByteOrder> {
    if data.len() < HEADER_LEN {
        return None;
    }
    let offset = INT_OFFSET + NVHDR * 4;
    [ByteOrder::Little, ByteOrder::Big]
        .into_iter()
        .find(|&order| read_int(data, offset, order) == 6)
}

/// Cheap check whether `data` carries a SAC header
pub fn is_sac(data: &[u8]) -> bool {
    detect_byte_order(data).is_some()
}

/// Read an evenly sampled SAC time series
pub fn read_sac(data: &[u8]) -> FormatResult<Trace> {
    let order = detect_byte_order(data)
        .ok_or_else(|| FormatError::Unrecognized("no SAC header version found".to_string()))?;
    let header = Header { data, order };

    let leven = header.int(LEVEN);
    if leven == 0 {
        return Err(FormatError::Unsupported {
            format: FORMAT,
            message: "unevenly sampled data".to_string(),
        });
    }
    let iftype = header.int(IFTYPE);
    if iftype != ITIME && iftype != UNDEFINED_INT {
        return Err(FormatError::Unsupported {
            format: FORMAT,
            message: format!("file type {} is not a time series", iftype),
        });
    }

    let npts = header.int(NPTS);
    if npts < 0 {
        return Err(FormatError::malformed(FORMAT, format!("invalid number of points {}", npts)));
    }
    let npts = npts as usize;
    let expected = HEADER_LEN + npts * 4;
    if data.len() < expected {
        return Err(FormatError::malformed(
            FORMAT,
            format!("expected {} bytes of data, found {}", npts * 4, data.len() - HEADER_LEN),
        ));
    }

    let delta = header.float(DELTA);
    if !delta.is_finite() || delta <= 0.0 {
        return Err(FormatError::malformed(FORMAT, format!("invalid sample interval {}", delta)));
    }

    let samples = data[HEADER_LEN..expected]
        .chunks_exact(4)
        .map(|w| {
            let w = [w[0], w[1], w[2], w[3]];
            match order {
                ByteOrder::Little => f32::from_le_bytes(w),
                ByteOrder::Big => f32::from_be_bytes(w),
            }
        })
        .collect();

    let begin = header.defined_float(B).unwrap_or(0.0);
    let reference = reference_time(&header)?;
    let starttime = offset_from_seconds(f64::from(begin))
        .and_then(|offset| reference.checked_add_signed(offset))
        .ok_or_else(|| FormatError::malformed(FORMAT, format!("invalid begin time {}", begin)))?;

    let trace = Trace {
        stats: TraceStats {
            network: header.string(KNETWK),
            station: header.string(KSTNM),
            location: header.string(KHOLE),
            channel: header.string(KCMPNM),
            starttime,
            sampling_rate: 1.0 / f64::from(delta),
            coordinates: coordinates(&header),
        },
        data: Samples::Float(samples),
    };
    check_span(&trace, FORMAT)?;
    Ok(trace)
}

/// Latitude, longitude and elevation must all be defined; an undefined
/// depth counts as zero
fn coordinates(header: &Header) -> Option<Coordinates> {
    Some(Coordinates {
        latitude: header.defined_float(STLA)?,
        longitude: header.defined_float(STLO)?,
        elevation_in_m: header.defined_float(STEL)?,
        local_depth_in_m: header.defined_float(STDP).unwrap_or(0.0),
    })
}

/// Reference time; a header without one refers to the epoch
fn reference_time(header: &Header) -> FormatResult<DateTime<Utc>> {
    let fields = [NZYEAR, NZJDAY, NZHOUR, NZMIN, NZSEC, NZMSEC].map(|i| header.int(i));
    if fields.iter().any(|&v| v == UNDEFINED_INT) {
        return Ok(Utc.from_utc_datetime(&NaiveDateTime::default()));
    }
    let [year, jday, hour, minute, second, msec] = fields;
    let invalid = || FormatError::malformed(FORMAT, format!("invalid reference time {:?}", fields));

    let date = NaiveDate::from_yo_opt(year, u32::try_from(jday).map_err(|_| invalid())?).ok_or_else(invalid)?;
    let naive = date
        .and_hms_milli_opt(
            u32::try_from(hour).map_err(|_| invalid())?,
            u32::try_from(minute).map_err(|_| invalid())?,
            u32::try_from(second).map_err(|_| invalid())?,
            u32::try_from(msec).map_err(|_| invalid())?,
        )
        .ok_or_else(invalid)?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Write a little endian SAC file with single precision samples
///
/// The reference time is the (millisecond truncated) first sample time; the
/// remaining microseconds go into `b`.
pub fn write_sac(trace: &Trace) -> Vec<u8> {
    let stats = &trace.stats;
    let samples = trace.data.to_f32();

    let mut floats = [UNDEFINED; FLOATS];
    let mut ints = [UNDEFINED_INT; INTS];
    let mut strings = [b' '; 192];
    for chunk in strings.chunks_mut(8) {
        chunk[..6].copy_from_slice(UNDEFINED_STRING.as_bytes());
    }

    let start = stats.starttime;
    let sub_milli_us = i64::from(start.nanosecond() / 1_000 % 1_000);
    let delta = if stats.sampling_rate > 0.0 { 1.0 / stats.sampling_rate } else { 0.0 };
    let begin = sub_milli_us as f64 / 1e6;

    floats[DELTA] = delta as f32;
    floats[B] = begin as f32;
    floats[E] = (begin + delta * samples.len().saturating_sub(1) as f64) as f32;
    if !samples.is_empty() {
        let min = samples.iter().copied().fold(f32::INFINITY, f32::min);
        let max = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = samples.iter().map(|&x| f64::from(x)).sum::<f64>() / samples.len() as f64;
        floats[DEPMIN] = min;
        floats[DEPMAX] = max;
        floats[DEPMEN] = mean as f32;
    }
    if let Some(c) = stats.coordinates {
        floats[STLA] = c.latitude as f32;
        floats[STLO] = c.longitude as f32;
        floats[STEL] = c.elevation_in_m as f32;
        floats[STDP] = c.local_depth_in_m as f32;
    }

    ints[NZYEAR] = start.year();
    ints[NZJDAY] = start.ordinal() as i32;
    ints[NZHOUR] = start.hour() as i32;
    ints[NZMIN] = start.minute() as i32;
    ints[NZSEC] = start.second() as i32;
    ints[NZMSEC] = (start.nanosecond() / 1_000_000 % 1_000) as i32;
    ints[NVHDR] = 6;
    ints[NPTS] = samples.len() as i32;
    ints[IFTYPE] = ITIME;
    ints[LEVEN] = 1;

    put_string(&mut strings, KSTNM, &stats.station);
    put_string(&mut strings, KHOLE, &stats.location);
    put_string(&mut strings, KCMPNM, &stats.channel);
    put_string(&mut strings, KNETWK, &stats.network);

    let mut out = Vec::with_capacity(HEADER_LEN + samples.len() * 4);
    for f in floats {
        out.extend_from_slice(&f.to_le_bytes());
    }
    for i in ints {
        out.extend_from_slice(&i.to_le_bytes());
    }
    out.extend_from_slice(&strings);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

fn put_string(strings: &mut [u8; 192], (offset, width): (usize, usize), value: &str) {
    if value.is_empty() {
        return;
    }
    let field = &mut strings[offset..offset + width];
    field.fill(b' ');
    for (dst, src) in field.iter_mut().zip(value.bytes()) {
        *dst = src;
    }
}
