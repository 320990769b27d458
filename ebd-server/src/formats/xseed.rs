//! XSEED reader
//!
//! XSEED is the XML rendition of SEED. Blockettes become elements carrying a
//! `blockette` attribute and their fields become child elements:
//!
//! ```xml
//! <station_identifier blockette="050">
//!   <station_call_letters>GEC2</station_call_letters>
//!   <network_code>GR</network_code>
//! </station_identifier>
//! <channel_identifier blockette="052">
//!   <location_identifier/>
//!   <channel_identifier>HHZ</channel_identifier>
//! </channel_identifier>
//! ```
//!
//! The channel blockette and its channel field share an element name, so
//! fields are only recognised one level below their blockette element.

use super::{parse_any_time, ChannelInfo, Coordinates, FormatError, FormatResult, StationFormat};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

const FORMAT: &str = "XSEED";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Blockette {
    Station,
    Channel,
}

struct OpenBlockette {
    kind: Blockette,
    depth: usize,
    fields: HashMap<String, String>,
}

#[derive(Default)]
struct Station {
    network: String,
    station: String,
}

/// Read all channel epochs of an XSEED document
pub fn read_xseed(data: &[u8]) -> FormatResult<Vec<ChannelInfo>> {
    let mut reader = Reader::from_reader(data);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut open: Option<OpenBlockette> = None;
    let mut field: Option<(String, String)> = None;
    let mut station: Option<Station> = None;
    let mut channels = Vec::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) if seen_root => return Err(FormatError::malformed(FORMAT, e.to_string())),
            Err(e) => return Err(FormatError::Unrecognized(e.to_string())),
        };

        match event {
            Event::Start(e) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if depth == 1 {
                    check_root(&name)?;
                    seen_root = true;
                } else if let Some(block) = open.as_ref() {
                    if depth == block.depth + 1 {
                        field = Some((name, String::new()));
                    }
                } else if let Some(kind) = blockette_kind(&e)? {
                    open = Some(OpenBlockette { kind, depth, fields: HashMap::new() });
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if depth == 0 {
                    check_root(&name)?;
                    seen_root = true;
                } else if let Some(block) = open.as_mut() {
                    if depth == block.depth {
                        block.fields.insert(name, String::new());
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, value)) = field.as_mut() {
                    let text = t.unescape().map_err(|e| FormatError::malformed(FORMAT, e.to_string()))?;
                    value.push_str(&text);
                }
            }
            Event::End(_) => {
                if let Some(block) = open.as_mut() {
                    if depth == block.depth + 1 {
                        if let Some((name, value)) = field.take() {
                            block.fields.insert(name, value.trim().to_string());
                        }
                    } else if depth == block.depth {
                        if let Some(block) = open.take() {
                            close_blockette(block, &mut station, &mut channels)?;
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(FormatError::Unrecognized("no XSEED root element".to_string()));
    }
    if channels.is_empty() {
        return Err(FormatError::Empty("XSEED channel"));
    }
    Ok(channels)
}

fn check_root(name: &str) -> FormatResult<()> {
    if name == "xseed" {
        Ok(())
    } else {
        Err(FormatError::Unrecognized(format!("root element is <{}>, not <xseed>", name)))
    }
}

fn blockette_kind(e: &quick_xml::events::BytesStart) -> FormatResult<Option<Blockette>> {
    let attribute = e
        .try_get_attribute("blockette")
        .map_err(|err| FormatError::malformed(FORMAT, err.to_string()))?;
    let Some(attribute) = attribute else {
        return Ok(None);
    };
    let value = attribute
        .unescape_value()
        .map_err(|err| FormatError::malformed(FORMAT, err.to_string()))?;
    Ok(match value.trim() {
        "050" => Some(Blockette::Station),
        "052" => Some(Blockette::Channel),
        _ => None,
    })
}

fn close_blockette(
    block: OpenBlockette,
    station: &mut Option<Station>,
    channels: &mut Vec<ChannelInfo>,
) -> FormatResult<()> {
    let get = |name: &str| block.fields.get(name).map(String::as_str).unwrap_or("");

    match block.kind {
        Blockette::Station => {
            *station = Some(Station {
                network: get("network_code").to_string(),
                station: get("station_call_letters").to_string(),
            });
        }
        Blockette::Channel => {
            let Some(current) = station.as_ref() else {
                return Err(FormatError::malformed(FORMAT, "channel blockette before station blockette"));
            };
            let start = get("start_date");
            let start_date = parse_any_time(start)
                .ok_or_else(|| FormatError::malformed(FORMAT, format!("invalid channel start date '{}'", start)))?;

            let number = |name: &str| get(name).parse::<f64>().ok();
            let coordinates = match (
                number("latitude"),
                number("longitude"),
                number("elevation"),
                number("local_depth"),
            ) {
                (Some(latitude), Some(longitude), Some(elevation_in_m), Some(local_depth_in_m)) => Some(Coordinates {
                    latitude,
                    longitude,
                    elevation_in_m,
                    local_depth_in_m,
                }),
                _ => None,
            };

            channels.push(ChannelInfo {
                network: current.network.clone(),
                station: current.station.clone(),
                location: get("location_identifier").to_string(),
                channel: get("channel_identifier").to_string(),
                start_date,
                end_date: parse_any_time(get("end_date")),
                format: StationFormat::Xseed,
                coordinates,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn channel(cha: &str) -> String {
        format!(
            r#"
    <channel_identifier blockette="052">
      <location_identifier/>
      <channel_identifier>{}</channel_identifier>
      <subchannel_identifier>0</subchannel_identifier>
      <latitude>+48.845085</latitude>
      <longitude>+13.701584</longitude>
      <elevation>+1132.5</elevation>
      <local_depth>0.0</local_depth>
      <azimuth>0.0</azimuth>
      <dip>-90.0</dip>
      <start_date>2002-08-08T12:00:00</start_date>
      <end_date></end_date>
    </channel_identifier>"#,
            cha
        )
    }

    fn document(channels: &str) -> String {
        format!(
            r#"<?xml version='1.0' encoding='utf-8'?>
<xseed version="1.0">
  <volume_index_control_header>
    <volume_identifier blockette="010">
      <version_of_format>2.4</version_of_format>
    </volume_identifier>
  </volume_index_control_header>
  <station_control_header>
    <station_identifier blockette="050">
      <station_call_letters>GEC2</station_call_letters>
      <latitude>+48.845085</latitude>
      <start_effective_date>2002,220,12:00:00.0000</start_effective_date>
      <network_code>GR</network_code>
    </station_identifier>{}
  </station_control_header>
</xseed>"#,
            channels
        )
    }

    #[test]
    fn test_three_channels() {
        let xml = document(&format!("{}{}{}", channel("HHE"), channel("HHN"), channel("HHZ")));
        let channels = read_xseed(xml.as_bytes()).unwrap();

        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].channel, "HHE");
        assert_eq!(channels[2].channel, "HHZ");
        for c in &channels {
            assert_eq!(c.network, "GR");
            assert_eq!(c.station, "GEC2");
            assert_eq!(c.location, "");
            assert_eq!(c.format, StationFormat::Xseed);
            assert_eq!(c.start_date, Utc.with_ymd_and_hms(2002, 8, 8, 12, 0, 0).unwrap());
            assert_eq!(c.end_date, None);
            let coords = c.coordinates.unwrap();
            assert!((coords.elevation_in_m - 1132.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_missing_coordinate_drops_all_coordinates() {
        let xml = document(&channel("HHZ").replace("<local_depth>0.0</local_depth>", ""));
        let channels = read_xseed(xml.as_bytes()).unwrap();
        assert_eq!(channels[0].coordinates, None);
    }

    #[test]
    fn test_other_xml_is_unrecognized() {
        let xml = br#"<?xml version="1.0"?><q:quakeml xmlns:q="http://quakeml.org/xmlns/quakeml/1.2"/>"#;
        assert!(matches!(read_xseed(xml), Err(FormatError::Unrecognized(_))));
        assert!(read_xseed(b"B050F03     Station:     PFVI").is_err());
    }

    #[test]
    fn test_no_channels_is_empty() {
        let xml = document("");
        assert!(matches!(read_xseed(xml.as_bytes()), Err(FormatError::Empty(_))));
    }
}
