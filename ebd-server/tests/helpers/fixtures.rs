//! Small station, event and waveform documents

use chrono::{DateTime, Duration, TimeZone, Utc};
use ebd_server::formats::{write_trace, Coordinates, Samples, Trace, TraceStats, WaveformFormat};

pub const RESP_PFVI: &str = "\
#\t\t<< IRIS SEED Reader, Release 4.8 >>
#
######################
B050F03     Station:     PFVI
B050F16     Network:     PM
B052F03     Location:    ??
B052F04     Channel:     BHZ
B052F22     Start date:  2007,001,00:00:00
B052F23     End date:    No Ending Time
#
B053F03     Transfer function type:                A [Laplace Transform (Rad/sec)]
B053F04     Stage sequence number:                 1
";

/// RESP for a station that also appears in [`xseed_gec2`]
pub const RESP_GEC2: &str = "\
B050F03     Station:     GEC2
B050F16     Network:     GR
B052F03     Location:    ??
B052F04     Channel:     BHZ
B052F22     Start date:  2010,001,00:00:00
B052F23     End date:    No Ending Time
";

pub const QUAKEML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
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
  </eventParameters>
</q:quakeml>"#;

/// An event with magnitude only
pub const QUAKEML_WITHOUT_TENSOR: &str = r#"<q:quakeml xmlns:q="http://quakeml.org/xmlns/quakeml/1.2">
  <eventParameters><event publicID="smi:local/event/small"><magnitude><mag><value>3.1</value></mag></magnitude></event></eventParameters>
</q:quakeml>"#;

fn xseed_channel(channel: &str) -> String {
    format!(
        r#"
    <channel_identifier blockette="052">
      <location_identifier/>
      <channel_identifier>{}</channel_identifier>
      <latitude>+48.845085</latitude>
      <longitude>+13.701584</longitude>
      <elevation>+1132.5</elevation>
      <local_depth>0.0</local_depth>
      <start_date>2002-08-08T12:00:00</start_date>
      <end_date></end_date>
    </channel_identifier>"#,
        channel
    )
}

/// XSEED volume of station GR.GEC2 with the given channels
pub fn xseed_gec2(channels: &[&str]) -> String {
    let blocks: String = channels.iter().map(|c| xseed_channel(c)).collect();
    format!(
        r#"<?xml version='1.0' encoding='utf-8'?>
<xseed version="1.0">
  <station_control_header>
    <station_identifier blockette="050">
      <station_call_letters>GEC2</station_call_letters>
      <network_code>GR</network_code>
    </station_identifier>{}
  </station_control_header>
</xseed>"#,
        blocks
    )
}

pub fn pfvi_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2012, 8, 27, 4, 43, 56).unwrap()
}

/// Exactly representable in the single precision SAC header
pub fn pfvi_coordinates() -> Coordinates {
    Coordinates {
        latitude: 37.125,
        longitude: -8.8125,
        elevation_in_m: 189.0,
        local_depth_in_m: 0.0,
    }
}

/// A one-minute trace of PM.PFVI..BHE at 1 Hz
pub fn pfvi_trace(channel: &str) -> Trace {
    Trace {
        stats: TraceStats {
            network: "PM".to_string(),
            station: "PFVI".to_string(),
            location: "".to_string(),
            channel: channel.to_string(),
            starttime: pfvi_start(),
            sampling_rate: 1.0,
            coordinates: Some(pfvi_coordinates()),
        },
        data: Samples::Float((0..60).map(|i| (i as f32 * 0.1).sin()).collect()),
    }
}

pub fn sac_file(channel: &str) -> Vec<u8> {
    write_trace(&pfvi_trace(channel), WaveformFormat::Sac).unwrap()
}

pub fn mseed_file(channel: &str) -> Vec<u8> {
    let mut trace = pfvi_trace(channel);
    trace.data = Samples::Int((0..60).collect());
    write_trace(&trace, WaveformFormat::MiniSeed).unwrap()
}

/// Two records of the same channel an hour apart
pub fn gapped_mseed_file() -> Vec<u8> {
    let mut trace = pfvi_trace("BHZ");
    trace.data = Samples::Int((0..60).collect());
    let mut data = write_trace(&trace, WaveformFormat::MiniSeed).unwrap();
    trace.stats.starttime = trace.stats.starttime + Duration::hours(1);
    data.extend(write_trace(&trace, WaveformFormat::MiniSeed).unwrap());
    data
}
