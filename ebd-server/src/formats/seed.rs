//! Dataless SEED reader
//!
//! A SEED volume is a sequence of logical records. Every record starts with
//! an 8 byte header (`NNNNNNT*`: sequence number, record type, continuation
//! flag). Control headers (types `V`, `A`, `S`) hold ASCII blockettes which
//! may continue across record boundaries; unused record tails are padded
//! with spaces.
//!
//! Only station (050) and channel (052) identifier blockettes are needed.
//! The logical record length comes from the volume identifier (010).

use super::{parse_seed_time, ChannelInfo, Coordinates, FormatError, FormatResult, StationFormat};
use tracing::debug;

const FORMAT: &str = "SEED";
const RECORD_HEADER_LEN: usize = 8;
const BLOCKETTE_HEADER_LEN: usize = 7;

/// Read all channel epochs of a dataless (or full) SEED volume
pub fn read_seed(data: &[u8]) -> FormatResult<Vec<ChannelInfo>> {
    let record_length = volume_record_length(data)?;
    let (stream, boundaries) = control_stream(data, record_length);
    debug!(
        record_length,
        control_bytes = stream.len(),
        "Parsing SEED control headers"
    );

    let mut channels = Vec::new();
    let mut station: Option<StationIdentifier> = None;

    for blockette in Blockettes::new(&stream, &boundaries) {
        let (kind, body) = blockette?;
        match kind {
            50 => station = Some(parse_station_identifier(body)?),
            52 => {
                let Some(current) = station.as_ref() else {
                    return Err(FormatError::malformed(FORMAT, "channel blockette before station blockette"));
                };
                channels.push(parse_channel_identifier(body, current)?);
            }
            _ => {}
        }
    }

    if channels.is_empty() {
        return Err(FormatError::Empty("SEED channel"));
    }
    Ok(channels)
}

/// Validate the first record and extract the logical record length
fn volume_record_length(data: &[u8]) -> FormatResult<usize> {
    if data.len() < RECORD_HEADER_LEN + 13 {
        return Err(FormatError::Unrecognized("too short for a SEED volume".to_string()));
    }
    if !data[..6].iter().all(|b| b.is_ascii_digit() || *b == b' ') || data[6] != b'V' {
        return Err(FormatError::Unrecognized("missing volume header record".to_string()));
    }
    if &data[8..11] != b"010" {
        return Err(FormatError::Unrecognized("missing volume identifier blockette".to_string()));
    }

    let exponent = std::str::from_utf8(&data[19..21])
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .ok_or_else(|| FormatError::malformed(FORMAT, "invalid logical record length"))?;
    if !(8..=16).contains(&exponent) {
        return Err(FormatError::malformed(
            FORMAT,
            format!("logical record length 2^{} out of range", exponent),
        ));
    }
    Ok(1usize << exponent)
}

/// Concatenate the payload of every control header record
///
/// Returns the stream and the stream offsets at which records begin, so
/// record padding can be skipped.
fn control_stream(data: &[u8], record_length: usize) -> (Vec<u8>, Vec<usize>) {
    let mut stream = Vec::with_capacity(data.len());
    let mut boundaries = Vec::new();

    for record in data.chunks(record_length) {
        if record.len() <= RECORD_HEADER_LEN {
            break;
        }
        match record[6] {
            b'V' | b'A' | b'S' => {
                boundaries.push(stream.len());
                stream.extend_from_slice(&record[RECORD_HEADER_LEN..]);
            }
            // Time span headers are of no interest
            b'T' => continue,
            // Data records follow the control headers in full SEED
            _ => break,
        }
    }
    (stream, boundaries)
}

/// Iterator over `(blockette type, blockette bytes)` in a control stream
struct Blockettes<'a> {
    stream: &'a [u8],
    boundaries: &'a [usize],
    pos: usize,
}

impl<'a> Blockettes<'a> {
    fn new(stream: &'a [u8], boundaries: &'a [usize]) -> Self {
        Self { stream, boundaries, pos: 0 }
    }

    fn next_boundary(&self) -> Option<usize> {
        self.boundaries.iter().copied().find(|&b| b > self.pos)
    }
}

impl<'a> Iterator for Blockettes<'a> {
    type Item = FormatResult<(u16, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pos + BLOCKETTE_HEADER_LEN > self.stream.len() {
                return None;
            }
            let header = &self.stream[self.pos..self.pos + BLOCKETTE_HEADER_LEN];
            if !header.iter().all(u8::is_ascii_digit) {
                // Padding: continue with the next record
                self.pos = self.next_boundary()?;
                continue;
            }

            let kind = ascii_number(&header[..3]);
            let length = ascii_number(&header[3..]) as usize;
            if length < BLOCKETTE_HEADER_LEN || self.pos + length > self.stream.len() {
                self.pos = self.stream.len();
                return Some(Err(FormatError::malformed(
                    FORMAT,
                    format!("blockette {:03} has invalid length {}", kind, length),
                )));
            }

            let body = &self.stream[self.pos..self.pos + length];
            self.pos += length;
            return Some(Ok((kind as u16, body)));
        }
    }
}

fn ascii_number(digits: &[u8]) -> u32 {
    digits.iter().fold(0, |acc, d| acc * 10 + u32::from(d - b'0'))
}

/// Sequential reader over the fields of one blockette
struct Fields<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(blockette: &'a [u8]) -> Self {
        Self { data: blockette, pos: BLOCKETTE_HEADER_LEN }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Fixed width field
    fn fixed(&mut self, width: usize) -> FormatResult<String> {
        if self.remaining() < width {
            return Err(FormatError::malformed(FORMAT, "blockette ends inside a fixed field"));
        }
        let value = String::from_utf8_lossy(&self.data[self.pos..self.pos + width]).trim().to_string();
        self.pos += width;
        Ok(value)
    }

    /// Variable length field terminated by `~`
    fn variable(&mut self) -> FormatResult<String> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let end = rest
            .iter()
            .position(|&b| b == b'~')
            .ok_or_else(|| FormatError::malformed(FORMAT, "unterminated variable field"))?;
        let value = String::from_utf8_lossy(&rest[..end]).trim().to_string();
        self.pos += end + 1;
        Ok(value)
    }

    fn float(&mut self, width: usize) -> FormatResult<Option<f64>> {
        Ok(self.fixed(width)?.parse::<f64>().ok())
    }
}

struct StationIdentifier {
    network: String,
    station: String,
}

/// Blockette 050
fn parse_station_identifier(blockette: &[u8]) -> FormatResult<StationIdentifier> {
    let mut f = Fields::new(blockette);
    let station = f.fixed(5)?;
    f.fixed(10)?; // latitude
    f.fixed(11)?; // longitude
    f.fixed(7)?; // elevation
    f.fixed(4)?; // number of channels
    f.fixed(3)?; // number of station comments
    f.variable()?; // site name
    f.fixed(3)?; // network identifier code
    f.fixed(4)?; // 32 bit word order
    f.fixed(2)?; // 16 bit word order
    f.variable()?; // start effective date
    f.variable()?; // end effective date
    f.fixed(1)?; // update flag
    // The network code field was added in SEED 2.3
    let network = if f.remaining() >= 2 { f.fixed(2)? } else { String::new() };

    Ok(StationIdentifier { network, station })
}

/// Blockette 052
fn parse_channel_identifier(blockette: &[u8], station: &StationIdentifier) -> FormatResult<ChannelInfo> {
    let mut f = Fields::new(blockette);
    let location = f.fixed(2)?;
    let channel = f.fixed(3)?;
    f.fixed(4)?; // subchannel
    f.fixed(3)?; // instrument identifier
    f.variable()?; // optional comment
    f.fixed(3)?; // units of signal response
    f.fixed(3)?; // units of calibration input
    let latitude = f.float(10)?;
    let longitude = f.float(11)?;
    let elevation = f.float(7)?;
    let local_depth = f.float(5)?;
    f.fixed(5)?; // azimuth
    f.fixed(5)?; // dip
    f.fixed(4)?; // data format identifier code
    f.fixed(2)?; // data record length
    f.fixed(10)?; // sample rate
    f.fixed(10)?; // max clock drift
    f.fixed(4)?; // number of comments
    f.variable()?; // channel flags
    let start = f.variable()?;
    let end = f.variable()?;

    let start_date = parse_seed_time(&start)
        .ok_or_else(|| FormatError::malformed(FORMAT, format!("invalid channel start date '{}'", start)))?;

    let coordinates = match (latitude, longitude, elevation, local_depth) {
        (Some(latitude), Some(longitude), Some(elevation_in_m), Some(local_depth_in_m)) => Some(Coordinates {
            latitude,
            longitude,
            elevation_in_m,
            local_depth_in_m,
        }),
        _ => None,
    };

    Ok(ChannelInfo {
        network: station.network.clone(),
        station: station.station.clone(),
        location,
        channel,
        start_date,
        end_date: parse_seed_time(&end),
        format: StationFormat::Seed,
        coordinates,
    })
}

#[cfg(test)]
pub(crate) mod test_volume {
    //! Builder for small dataless SEED volumes

    pub struct ChannelSpec<'a> {
        pub location: &'a str,
        pub channel: &'a str,
        pub latitude: f64,
        pub longitude: f64,
        pub elevation: f64,
        pub local_depth: f64,
        pub start: &'a str,
        pub end: &'a str,
    }

    pub fn blockette(kind: &str, body: &str) -> String {
        format!("{}{:04}{}", kind, body.len() + 7, body)
    }

    pub fn station_blockette(network: &str, station: &str, channels: usize) -> String {
        let body = format!(
            "{:<5}{:+010.6}{:+011.6}{:+07.1}{:04}{:03}{}~{:03}{}{}{}~{}~{}{:<2}",
            station, 48.845085, 13.701584, 1132.5, channels, 0, "Test Site", 0, "3210", "10",
            "2002,220,12:00:00.0000", "", "N", network
        );
        blockette("050", &body)
    }

    pub fn channel_blockette(c: &ChannelSpec) -> String {
        let body = format!(
            "{:<2}{:<3}{:04}{:03}~{:03}{:03}{:+010.6}{:+011.6}{:+07.1}{:+05.1}{:+05.1}{:+05.1}{:04}{:02}{}{}{:04}{}~{}~{}~{}",
            c.location, c.channel, 0, 1, 2, 3, c.latitude, c.longitude, c.elevation,
            c.local_depth, 0.0, 0.0, 0, 12, "1.0000E+02", "0.0000E+00", 0, "CG", c.start,
            c.end, "N"
        );
        blockette("052", &body)
    }

    /// Pack control headers into records of 2^exponent bytes, letting
    /// blockettes continue across record boundaries
    pub fn volume(exponent: u32, station_blockettes: &[String]) -> Vec<u8> {
        let record_length = 1usize << exponent;
        let payload = record_length - 8;
        let mut out = Vec::new();
        let mut sequence = 1;

        let b010 = blockette(
            "010",
            &format!("02.3{:02}1992,001~2999,365~2012,001~Test~Label~", exponent),
        );
        push_records(&mut out, &mut sequence, b'V', b010.as_bytes(), payload);
        let stations: String = station_blockettes.concat();
        push_records(&mut out, &mut sequence, b'S', stations.as_bytes(), payload);
        out
    }

    fn push_records(out: &mut Vec<u8>, sequence: &mut usize, kind: u8, content: &[u8], payload: usize) {
        for (i, chunk) in content.chunks(payload).enumerate() {
            out.extend_from_slice(format!("{:06}", sequence).as_bytes());
            out.push(kind);
            out.push(if i == 0 { b' ' } else { b'*' });
            out.extend_from_slice(chunk);
            out.extend(std::iter::repeat(b' ').take(payload - chunk.len()));
            *sequence += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_volume::*;
    use super::*;
    use chrono::{TimeZone, Utc};

    fn gec2_channel(channel: &str) -> String {
        channel_blockette(&ChannelSpec {
            location: "",
            channel,
            latitude: 48.845085,
            longitude: 13.701584,
            elevation: 1132.5,
            local_depth: 0.0,
            start: "2002,220,12:00:00.0000",
            end: "",
        })
    }

    fn gec2_station() -> String {
        let mut s = station_blockette("GR", "GEC2", 3);
        for channel in ["HHE", "HHN", "HHZ"] {
            s.push_str(&gec2_channel(channel));
        }
        s
    }

    #[test]
    fn test_three_channel_station() {
        let data = volume(12, &[gec2_station()]);
        let channels = read_seed(&data).unwrap();

        assert_eq!(channels.len(), 3);
        let names: Vec<&str> = channels.iter().map(|c| c.channel.as_str()).collect();
        assert_eq!(names, vec!["HHE", "HHN", "HHZ"]);
        for c in &channels {
            assert_eq!(c.network, "GR");
            assert_eq!(c.station, "GEC2");
            assert_eq!(c.location, "");
            assert_eq!(c.format, StationFormat::Seed);
            assert_eq!(c.start_date, Utc.with_ymd_and_hms(2002, 8, 8, 12, 0, 0).unwrap());
            assert_eq!(c.end_date, None);
            let coords = c.coordinates.unwrap();
            assert!((coords.latitude - 48.845085).abs() < 1e-9);
            assert!((coords.longitude - 13.701584).abs() < 1e-9);
            assert!((coords.elevation_in_m - 1132.5).abs() < 1e-9);
            assert_eq!(coords.local_depth_in_m, 0.0);
        }
    }

    #[test]
    fn test_blockettes_spanning_small_records() {
        // 256 byte records force channel blockettes across boundaries
        let data = volume(8, &[gec2_station()]);
        assert!(data.len() > 256 * 2);
        let channels = read_seed(&data).unwrap();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[2].channel, "HHZ");
    }

    #[test]
    fn test_multiple_stations_get_their_own_codes() {
        let mut second = station_blockette("BW", "FURT", 1);
        second.push_str(&gec2_channel("EHZ"));
        let data = volume(12, &[gec2_station(), second]);

        let channels = read_seed(&data).unwrap();
        assert_eq!(channels.len(), 4);
        assert_eq!(channels[3].network, "BW");
        assert_eq!(channels[3].station, "FURT");
        assert_eq!(channels[3].channel, "EHZ");
    }

    #[test]
    fn test_non_seed_input_is_unrecognized() {
        assert!(matches!(read_seed(b"<?xml version='1.0'?><xseed/>"), Err(FormatError::Unrecognized(_))));
        assert!(read_seed(b"").is_err());
    }

    #[test]
    fn test_volume_without_channels_is_empty() {
        let data = volume(12, &[station_blockette("GR", "GEC2", 0)]);
        assert!(matches!(read_seed(&data), Err(FormatError::Empty(_))));
    }
}
