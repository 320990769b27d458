//! QuakeML event summary extraction
//!
//! Only the first `<event>` is looked at. Within it the first origin,
//! magnitude and moment tensor supply the indexed fields.

use super::{parse_iso_time, FormatError, FormatResult};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::collections::HashMap;

const FORMAT: &str = "QuakeML";

/// Moment tensor components in the up-south-east system
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MomentTensor {
    pub mrr: f64,
    pub mtt: f64,
    pub mpp: f64,
    pub mrt: f64,
    pub mrp: f64,
    pub mtp: f64,
}

/// Indexed fields of a QuakeML event
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventSummary {
    pub public_id: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub depth: Option<f64>,
    pub magnitude: Option<f64>,
    pub magnitude_type: Option<String>,
    pub moment_tensor: Option<MomentTensor>,
    pub scalar_moment: Option<f64>,
}

/// Extract the summary of the first event in a QuakeML document
pub fn read_quakeml(data: &[u8]) -> FormatResult<EventSummary> {
    let mut reader = Reader::from_reader(data);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut event_depth: Option<usize> = None;
    let mut seen_event = false;
    let mut public_id = None;
    // Paths relative to the event element, first occurrence wins
    let mut values: HashMap<String, String> = HashMap::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| {
                if path.is_empty() && !seen_event {
                    FormatError::Unrecognized(e.to_string())
                } else {
                    FormatError::malformed(FORMAT, e.to_string())
                }
            })?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if path.is_empty() && name != "quakeml" {
                    return Err(FormatError::Unrecognized(format!("root element is <{}>, not <quakeml>", name)));
                }
                path.push(name);
                if event_depth.is_none() && !seen_event && path.last().map(String::as_str) == Some("event") {
                    event_depth = Some(path.len());
                    seen_event = true;
                    public_id = e
                        .try_get_attribute("publicID")
                        .ok()
                        .flatten()
                        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                }
            }
            Event::Empty(e) => {
                if path.is_empty() {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if name != "quakeml" {
                        return Err(FormatError::Unrecognized(format!("root element is <{}>, not <quakeml>", name)));
                    }
                }
            }
            Event::Text(t) => {
                if let Some(depth) = event_depth {
                    let key = path[depth..].join("/");
                    if !values.contains_key(&key) {
                        let text = t.unescape().map_err(|e| FormatError::malformed(FORMAT, e.to_string()))?;
                        values.insert(key, text.trim().to_string());
                    }
                }
            }
            Event::End(_) => {
                if event_depth == Some(path.len()) {
                    event_depth = None;
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_event {
        return Err(FormatError::Empty("QuakeML event"));
    }

    let text = |key: &str| values.get(key).map(String::as_str).filter(|v| !v.is_empty());
    let number = |key: &str| text(key).and_then(|v| v.parse::<f64>().ok());
    let component = |name: &str| number(&format!("focalMechanism/momentTensor/tensor/{}/value", name));

    let moment_tensor = match (
        component("Mrr"),
        component("Mtt"),
        component("Mpp"),
        component("Mrt"),
        component("Mrp"),
        component("Mtp"),
    ) {
        (Some(mrr), Some(mtt), Some(mpp), Some(mrt), Some(mrp), Some(mtp)) => {
            Some(MomentTensor { mrr, mtt, mpp, mrt, mrp, mtp })
        }
        _ => None,
    };

    Ok(EventSummary {
        public_id,
        time: text("origin/time/value").and_then(parse_iso_time),
        latitude: number("origin/latitude/value"),
        longitude: number("origin/longitude/value"),
        depth: number("origin/depth/value"),
        magnitude: number("magnitude/mag/value"),
        magnitude_type: text("magnitude/type").map(str::to_string),
        moment_tensor,
        scalar_moment: number("focalMechanism/momentTensor/scalarMoment/value")
            .or_else(|| number("focalMechanism/momentTensor/scalarMoment")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const GCMT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<q:quakeml xmlns="http://quakeml.org/xmlns/bed/1.2" xmlns:q="http://quakeml.org/xmlns/quakeml/1.2">
  <eventParameters publicID="smi:local/catalog">
    <event publicID="smi:local/event/GCMT_event_VANCOUVER_ISLAND">
      <origin publicID="smi:local/origin/1">
        <time><value>2011-09-09T19:41:34.400000Z</value></time>
        <latitude><value>49.54</value></latitude>
        <longitude><value>-126.89</value></longitude>
        <depth><value>22000.0</value></depth>
      </origin>
      <magnitude publicID="smi:local/magnitude/1">
        <mag><value>6.4</value></mag>
        <type>Mwc</type>
      </magnitude>
      <focalMechanism publicID="smi:local/fm/1">
        <momentTensor publicID="smi:local/mt/1">
          <scalarMoment><value>4.71e+18</value></scalarMoment>
          <tensor>
            <Mrr><value>2.22e+18</value></Mrr>
            <Mtt><value>-2.19e+18</value></Mtt>
            <Mpp><value>-3.0e+16</value></Mpp>
            <Mrt><value>3.41e+18</value></Mrt>
            <Mrp><value>-2.01e+18</value></Mrp>
            <Mtp><value>1.04e+18</value></Mtp>
          </tensor>
        </momentTensor>
      </focalMechanism>
    </event>
    <event publicID="smi:local/event/second">
      <magnitude><mag><value>1.0</value></mag></magnitude>
    </event>
  </eventParameters>
</q:quakeml>"#;

    #[test]
    fn test_first_event_fields() {
        let summary = read_quakeml(GCMT.as_bytes()).unwrap();
        assert_eq!(summary.public_id.as_deref(), Some("smi:local/event/GCMT_event_VANCOUVER_ISLAND"));
        assert_eq!(
            summary.time,
            Some(Utc.with_ymd_and_hms(2011, 9, 9, 19, 41, 34).unwrap() + chrono::Duration::milliseconds(400))
        );
        assert_eq!(summary.latitude, Some(49.54));
        assert_eq!(summary.longitude, Some(-126.89));
        assert_eq!(summary.depth, Some(22000.0));
        assert_eq!(summary.magnitude, Some(6.4));
        assert_eq!(summary.magnitude_type.as_deref(), Some("Mwc"));
        assert_eq!(summary.scalar_moment, Some(4.71e18));
        let mt = summary.moment_tensor.unwrap();
        assert_eq!(mt.mrr, 2.22e18);
        assert_eq!(mt.mtp, 1.04e18);
    }

    #[test]
    fn test_event_without_tensor() {
        let xml = r#"<q:quakeml xmlns:q="http://quakeml.org/xmlns/quakeml/1.2">
  <eventParameters><event publicID="e"><magnitude><mag><value>3.1</value></mag></magnitude></event></eventParameters>
</q:quakeml>"#;
        let summary = read_quakeml(xml.as_bytes()).unwrap();
        assert_eq!(summary.magnitude, Some(3.1));
        assert_eq!(summary.moment_tensor, None);
        assert_eq!(summary.time, None);
    }

    #[test]
    fn test_documents_without_event_are_rejected() {
        let empty = r#"<q:quakeml xmlns:q="http://quakeml.org/xmlns/quakeml/1.2"><eventParameters/></q:quakeml>"#;
        assert!(matches!(read_quakeml(empty.as_bytes()), Err(FormatError::Empty(_))));
        assert!(matches!(read_quakeml(b"<xseed/>"), Err(FormatError::Unrecognized(_))));
        assert!(read_quakeml(b"not xml at all").is_err());
    }
}
