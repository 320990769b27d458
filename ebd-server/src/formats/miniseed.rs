//! MiniSEED data record reader and writer
//!
//! Records consist of a 48 byte fixed header, a chain of blockettes and the
//! data section. Blockette 1000 gives the encoding, byte order and record
//! length; blockette 1001 refines the start time to microseconds.
//!
//! Supported encodings: INT16, INT32, FLOAT32, FLOAT64, Steim-1 and Steim-2.
//! The writer emits 4096 byte big endian records.

use super::waveform::{check_span, offset_of_sample, time_of_sample, Samples, Trace, TraceStats};
use super::{FormatError, FormatResult};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use tracing::debug;

const FORMAT: &str = "MiniSEED";
const FIXED_HEADER_LEN: usize = 48;
const WRITE_RECORD_EXPONENT: u8 = 12;
const WRITE_RECORD_LEN: usize = 1 << WRITE_RECORD_EXPONENT;
const WRITE_DATA_OFFSET: usize = 64;

const ENCODING_INT16: u8 = 1;
const ENCODING_INT32: u8 = 3;
const ENCODING_FLOAT32: u8 = 4;
const ENCODING_FLOAT64: u8 = 5;
const ENCODING_STEIM1: u8 = 10;
const ENCODING_STEIM2: u8 = 11;

/// Activity flag: time correction already applied
const TIME_CORRECTION_APPLIED: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ByteOrder {
    Big,
    Little,
}

struct Bytes<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Bytes<'a> {
    fn u16(&self, offset: usize) -> u16 {
        let b = [self.data[offset], self.data[offset + 1]];
        match self.order {
            ByteOrder::Big => u16::from_be_bytes(b),
            ByteOrder::Little => u16::from_le_bytes(b),
        }
    }

    fn i16(&self, offset: usize) -> i16 {
        self.u16(offset) as i16
    }

    fn u32(&self, offset: usize) -> u32 {
        let b = [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ];
        match self.order {
            ByteOrder::Big => u32::from_be_bytes(b),
            ByteOrder::Little => u32::from_le_bytes(b),
        }
    }

    fn i32(&self, offset: usize) -> i32 {
        self.u32(offset) as i32
    }

    fn u64(&self, offset: usize) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.data[offset..offset + 8]);
        match self.order {
            ByteOrder::Big => u64::from_be_bytes(b),
            ByteOrder::Little => u64::from_le_bytes(b),
        }
    }
}

/// Header byte order, judged by the plausibility of the record start year
fn header_byte_order(record: &[u8]) -> Option<ByteOrder> {
    [ByteOrder::Big, ByteOrder::Little].into_iter().find(|&order| {
        let bytes = Bytes { data: record, order };
        let year = bytes.u16(20);
        let day = bytes.u16(22);
        (1900..=2100).contains(&year) && (1..=366).contains(&day)
    })
}

/// Cheap check whether `data` starts with a SEED data record
pub fn is_miniseed(data: &[u8]) -> bool {
    if data.len() < FIXED_HEADER_LEN + 8 {
        return false;
    }
    let sequence_ok = data[..6].iter().all(|b| b.is_ascii_digit() || *b == b' ' || *b == 0);
    let quality_ok = matches!(data[6], b'D' | b'R' | b'Q' | b'M');
    let reserved_ok = data[7] == b' ' || data[7] == 0;
    sequence_ok && quality_ok && reserved_ok && header_byte_order(data).is_some()
}

/// One decoded data record
#[derive(Debug)]
struct Record {
    stats: TraceStats,
    samples: Samples,
    length: usize,
}

/// Read every record and merge contiguous records of a channel into traces
pub fn read_miniseed(data: &[u8]) -> FormatResult<Vec<Trace>> {
    let mut traces: Vec<Trace> = Vec::new();
    let mut offset = 0;

    while offset + FIXED_HEADER_LEN <= data.len() {
        let record = read_record(&data[offset..])?;
        offset += record.length;
        append_record(&mut traces, record);
    }

    if traces.is_empty() {
        return Err(FormatError::Empty("MiniSEED record"));
    }
    for trace in &traces {
        check_span(trace, FORMAT)?;
    }
    debug!(traces = traces.len(), "Read MiniSEED file");
    Ok(traces)
}

fn append_record(traces: &mut Vec<Trace>, record: Record) {
    if let Some(last) = traces.last_mut() {
        let same_channel = last.stats.network == record.stats.network
            && last.stats.station == record.stats.station
            && last.stats.location == record.stats.location
            && last.stats.channel == record.stats.channel
            && last.stats.sampling_rate == record.stats.sampling_rate;
        let expected = offset_of_sample(last.npts(), last.stats.sampling_rate)
            .and_then(|offset| last.stats.starttime.checked_add_signed(offset))
            .filter(|_| same_channel && record.stats.sampling_rate > 0.0);
        if let Some(expected) = expected {
            let gap_us = (record.stats.starttime - expected).num_microseconds().unwrap_or(i64::MAX).abs();
            let half_sample_us = (0.5e6 / record.stats.sampling_rate) as i64;
            if gap_us <= half_sample_us {
                // Mismatched sample kinds start a new trace
                let samples = record.samples.clone();
                if last.data.extend(samples) {
                    return;
                }
            }
        }
    }
    traces.push(Trace { stats: record.stats, data: record.samples });
}

fn ascii(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

fn read_record(data: &[u8]) -> FormatResult<Record> {
    if data.len() < FIXED_HEADER_LEN {
        return Err(FormatError::malformed(FORMAT, "truncated fixed header"));
    }
    let order = header_byte_order(data).ok_or_else(|| FormatError::malformed(FORMAT, "implausible record start time"))?;
    let header = Bytes { data, order };

    let npts = usize::from(header.u16(30));
    let sampling_rate = sample_rate(header.i16(32), header.i16(34));
    let activity = data[36];
    let blockette_count = data[39];
    let time_correction = header.i32(40);
    let data_offset = usize::from(header.u16(44));
    let mut blockette_offset = usize::from(header.u16(46));

    let mut encoding = None;
    let mut data_order = order;
    let mut record_length = None;
    let mut microseconds = 0i64;

    for _ in 0..blockette_count {
        if blockette_offset == 0 {
            break;
        }
        if blockette_offset + 8 > data.len() {
            return Err(FormatError::malformed(FORMAT, "blockette beyond end of data"));
        }
        let kind = header.u16(blockette_offset);
        let next = usize::from(header.u16(blockette_offset + 2));
        match kind {
            1000 => {
                encoding = Some(data[blockette_offset + 4]);
                data_order = if data[blockette_offset + 5] == 0 { ByteOrder::Little } else { ByteOrder::Big };
                let exponent = data[blockette_offset + 6];
                if !(7..=20).contains(&exponent) {
                    return Err(FormatError::malformed(FORMAT, format!("record length 2^{} out of range", exponent)));
                }
                record_length = Some(1usize << exponent);
            }
            1001 => microseconds = i64::from(data[blockette_offset + 5] as i8),
            _ => {}
        }
        if next != 0 && next <= blockette_offset {
            return Err(FormatError::malformed(FORMAT, "blockette chain loops"));
        }
        blockette_offset = next;
    }

    let (Some(encoding), Some(length)) = (encoding, record_length) else {
        return Err(FormatError::Unsupported {
            format: FORMAT,
            message: "records without blockette 1000".to_string(),
        });
    };
    if data.len() < length || data_offset > length {
        return Err(FormatError::malformed(FORMAT, "truncated data record"));
    }

    let mut starttime = btime(&header)? + Duration::microseconds(microseconds);
    if activity & TIME_CORRECTION_APPLIED == 0 {
        starttime += Duration::microseconds(i64::from(time_correction) * 100);
    }

    let payload = Bytes { data: &data[data_offset..length], order: data_order };
    let samples = decode(&payload, encoding, npts)?;

    Ok(Record {
        stats: TraceStats {
            network: ascii(&data[18..20]),
            station: ascii(&data[8..13]),
            location: ascii(&data[13..15]),
            channel: ascii(&data[15..18]),
            starttime,
            sampling_rate,
            coordinates: None,
        },
        samples,
        length,
    })
}

/// Sample rate from the header factor and multiplier
fn sample_rate(factor: i16, multiplier: i16) -> f64 {
    let f = f64::from(factor);
    let m = f64::from(multiplier);
    match (factor, multiplier) {
        (0, _) | (_, 0) => 0.0,
        (f_, m_) if f_ > 0 && m_ > 0 => f * m,
        (f_, _) if f_ > 0 => -f / m,
        (_, m_) if m_ > 0 => -m / f,
        _ => 1.0 / (f * m),
    }
}

/// BTIME at offset 20: year, day of year, hour, minute, second, unused,
/// ten-thousandths of a second
fn btime(header: &Bytes) -> FormatResult<DateTime<Utc>> {
    let year = i32::from(header.u16(20));
    let day = u32::from(header.u16(22));
    let hour = u32::from(header.data[24]);
    let minute = u32::from(header.data[25]);
    let second = u32::from(header.data[26]);
    let fract = i64::from(header.u16(28));

    let naive = NaiveDate::from_yo_opt(year, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second.min(59)))
        .ok_or_else(|| FormatError::malformed(FORMAT, "invalid record start time"))?;
    // Leap second records are folded onto the next second
    let leap = if second == 60 { 1 } else { 0 };
    Ok(Utc.from_utc_datetime(&naive) + Duration::seconds(leap) + Duration::microseconds(fract * 100))
}

fn decode(payload: &Bytes, encoding: u8, npts: usize) -> FormatResult<Samples> {
    let available = payload.data.len();
    let need = |width: usize| {
        if npts * width > available {
            Err(FormatError::malformed(FORMAT, "data section shorter than sample count"))
        } else {
            Ok(())
        }
    };

    match encoding {
        ENCODING_INT16 => {
            need(2)?;
            Ok(Samples::Int((0..npts).map(|i| i32::from(payload.i16(i * 2))).collect()))
        }
        ENCODING_INT32 => {
            need(4)?;
            Ok(Samples::Int((0..npts).map(|i| payload.i32(i * 4)).collect()))
        }
        ENCODING_FLOAT32 => {
            need(4)?;
            Ok(Samples::Float((0..npts).map(|i| f32::from_bits(payload.u32(i * 4))).collect()))
        }
        ENCODING_FLOAT64 => {
            need(8)?;
            Ok(Samples::Double((0..npts).map(|i| f64::from_bits(payload.u64(i * 8))).collect()))
        }
        ENCODING_STEIM1 | ENCODING_STEIM2 => decode_steim(payload, encoding == ENCODING_STEIM2, npts).map(Samples::Int),
        other => Err(FormatError::Unsupported {
            format: FORMAT,
            message: format!("data encoding {}", other),
        }),
    }
}

/// Sign extend the lowest `bits` bits of `value`
fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Split `word` into `count` differences of `bits` bits, most significant first
fn unpack(word: u32, count: u32, bits: u32, out: &mut Vec<i32>) {
    for k in (0..count).rev() {
        out.push(sign_extend(word >> (k * bits), bits));
    }
}

/// Decode Steim-1 or Steim-2 compressed frames
///
/// Each 64 byte frame holds 16 words; word 0 packs a 2 bit control code for
/// every word. The first frame's words 1 and 2 are the forward and reverse
/// integration constants.
fn decode_steim(payload: &Bytes, steim2: bool, npts: usize) -> FormatResult<Vec<i32>> {
    if npts == 0 {
        return Ok(Vec::new());
    }
    let frames = payload.data.len() / 64;
    if frames == 0 {
        return Err(FormatError::malformed(FORMAT, "no Steim frames"));
    }

    let mut differences = Vec::with_capacity(npts);
    let mut first = 0i32;
    let mut last = 0i32;

    for frame in 0..frames {
        let base = frame * 64;
        let control = payload.u32(base);
        for w in 1..16 {
            let word = payload.u32(base + w * 4);
            if frame == 0 && w == 1 {
                first = word as i32;
                continue;
            }
            if frame == 0 && w == 2 {
                last = word as i32;
                continue;
            }
            let code = (control >> (30 - 2 * w)) & 0b11;
            let dnib = word >> 30;
            match (code, steim2) {
                (0, _) => {}
                (1, _) => unpack(word, 4, 8, &mut differences),
                (2, false) => unpack(word, 2, 16, &mut differences),
                (3, false) => differences.push(word as i32),
                (2, true) => match dnib {
                    1 => unpack(word, 1, 30, &mut differences),
                    2 => unpack(word, 2, 15, &mut differences),
                    3 => unpack(word, 3, 10, &mut differences),
                    _ => return Err(FormatError::malformed(FORMAT, "invalid Steim-2 sub-code")),
                },
                (3, true) => match dnib {
                    0 => unpack(word, 5, 6, &mut differences),
                    1 => unpack(word, 6, 5, &mut differences),
                    2 => unpack(word, 7, 4, &mut differences),
                    _ => return Err(FormatError::malformed(FORMAT, "invalid Steim-2 sub-code")),
                },
                _ => {}
            }
        }
        if differences.len() >= npts {
            break;
        }
    }

    if differences.len() < npts {
        return Err(FormatError::malformed(
            FORMAT,
            format!("Steim frames hold {} of {} samples", differences.len(), npts),
        ));
    }

    // The first difference refers to the previous record
    let mut samples = Vec::with_capacity(npts);
    samples.push(first);
    for d in &differences[1..npts] {
        let previous = samples[samples.len() - 1];
        samples.push(previous.wrapping_add(*d));
    }
    if samples[npts - 1] != last {
        debug!(expected = last, actual = samples[npts - 1], "Steim reverse integration constant mismatch");
    }
    Ok(samples)
}

/// Header factor and multiplier for a sample rate
fn rate_factors(sampling_rate: f64) -> FormatResult<(i16, i16)> {
    const SCALES: [f64; 5] = [1.0, 10.0, 100.0, 1000.0, 10000.0];
    let integral = |v: f64| (v - v.round()).abs() < 1e-9 && v.round() <= f64::from(i16::MAX) && v.round() >= 1.0;

    if sampling_rate <= 0.0 {
        return Ok((0, 0));
    }
    if sampling_rate >= 1.0 {
        for scale in SCALES {
            let scaled = sampling_rate * scale;
            if integral(scaled) {
                return Ok((scaled.round() as i16, -(scale as i16)));
            }
        }
    } else {
        let period = 1.0 / sampling_rate;
        for scale in SCALES {
            let scaled = period * scale;
            if integral(scaled) {
                return Ok((-(scaled.round() as i16), scale as i16));
            }
        }
    }
    Err(FormatError::Unsupported {
        format: FORMAT,
        message: format!("sample rate {} has no SEED representation", sampling_rate),
    })
}

fn fixed_field(value: &str, width: usize) -> Vec<u8> {
    let mut field: Vec<u8> = value.bytes().take(width).collect();
    field.resize(width, b' ');
    field
}

/// Write a trace as big endian 4096 byte records
///
/// Integer samples are stored as INT32, single and double precision samples
/// as FLOAT32 and FLOAT64.
pub fn write_miniseed(trace: &Trace) -> FormatResult<Vec<u8>> {
    let (factor, multiplier) = rate_factors(trace.stats.sampling_rate)?;
    let (encoding, width) = match trace.data {
        Samples::Int(_) => (ENCODING_INT32, 4),
        Samples::Float(_) => (ENCODING_FLOAT32, 4),
        Samples::Double(_) => (ENCODING_FLOAT64, 8),
    };
    let per_record = (WRITE_RECORD_LEN - WRITE_DATA_OFFSET) / width;
    let npts = trace.npts();
    let record_count = npts.div_ceil(per_record).max(1);

    let mut out = Vec::with_capacity(record_count * WRITE_RECORD_LEN);
    for r in 0..record_count {
        let first = r * per_record;
        let count = per_record.min(npts - first);
        let start = time_of_sample(trace, first, FORMAT)?;

        let mut record = vec![0u8; WRITE_RECORD_LEN];
        record[..6].copy_from_slice(format!("{:06}", (r + 1) % 1_000_000).as_bytes());
        record[6] = b'D';
        record[7] = b' ';
        record[8..13].copy_from_slice(&fixed_field(&trace.stats.station, 5));
        record[13..15].copy_from_slice(&fixed_field(&trace.stats.location, 2));
        record[15..18].copy_from_slice(&fixed_field(&trace.stats.channel, 3));
        record[18..20].copy_from_slice(&fixed_field(&trace.stats.network, 2));

        let micros = start.timestamp_subsec_micros();
        record[20..22].copy_from_slice(&(start.year() as u16).to_be_bytes());
        record[22..24].copy_from_slice(&(start.ordinal() as u16).to_be_bytes());
        record[24] = start.hour() as u8;
        record[25] = start.minute() as u8;
        record[26] = start.second() as u8;
        record[28..30].copy_from_slice(&((micros / 100) as u16).to_be_bytes());
        record[30..32].copy_from_slice(&(count as u16).to_be_bytes());
        record[32..34].copy_from_slice(&factor.to_be_bytes());
        record[34..36].copy_from_slice(&multiplier.to_be_bytes());
        record[39] = 2;
        record[44..46].copy_from_slice(&(WRITE_DATA_OFFSET as u16).to_be_bytes());
        record[46..48].copy_from_slice(&(FIXED_HEADER_LEN as u16).to_be_bytes());

        // Blockette 1000
        record[48..50].copy_from_slice(&1000u16.to_be_bytes());
        record[50..52].copy_from_slice(&56u16.to_be_bytes());
        record[52] = encoding;
        record[53] = 1;
        record[54] = WRITE_RECORD_EXPONENT;
        // Blockette 1001
        record[56..58].copy_from_slice(&1001u16.to_be_bytes());
        record[58..60].copy_from_slice(&0u16.to_be_bytes());
        record[61] = (micros % 100) as u8;

        let payload = &mut record[WRITE_DATA_OFFSET..];
        match &trace.data {
            Samples::Int(v) => {
                for (dst, s) in payload.chunks_exact_mut(4).zip(&v[first..first + count]) {
                    dst.copy_from_slice(&s.to_be_bytes());
                }
            }
            Samples::Float(v) => {
                for (dst, s) in payload.chunks_exact_mut(4).zip(&v[first..first + count]) {
                    dst.copy_from_slice(&s.to_be_bytes());
                }
            }
            Samples::Double(v) => {
                for (dst, s) in payload.chunks_exact_mut(8).zip(&v[first..first + count]) {
                    dst.copy_from_slice(&s.to_be_bytes());
                }
            }
        }
        out.extend_from_slice(&record);
    }
    Ok(out)
}
