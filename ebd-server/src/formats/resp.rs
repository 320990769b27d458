//! RESP (evalresp) text reader
//!
//! Only the channel identification lines are interpreted:
//!
//! ```text
//! B050F03     Station:     PFVI
//! B050F16     Network:     PM
//! B052F03     Location:    ??
//! B052F04     Channel:     BHZ
//! B052F22     Start date:  2007,001,00:00:00
//! B052F23     End date:    No Ending Time
//! ```
//!
//! The end date line closes a channel block. RESP files carry no
//! coordinates.

use super::{parse_seed_time, ChannelInfo, FormatError, FormatResult, StationFormat};
use chrono::{DateTime, Utc};

#[derive(Default)]
struct PendingChannel {
    network: Option<String>,
    station: Option<String>,
    location: Option<String>,
    channel: Option<String>,
    start_date: Option<DateTime<Utc>>,
}

/// Read all channel epochs of a RESP file
///
/// Some RESP files repeat an identical channel block; duplicates are
/// returned once.
pub fn read_resp(data: &[u8]) -> FormatResult<Vec<ChannelInfo>> {
    let text = String::from_utf8_lossy(data);
    let mut channels: Vec<ChannelInfo> = Vec::new();
    let mut pending = PendingChannel::default();

    for line in text.lines() {
        let line = line.trim();
        let last = line.split_whitespace().last().unwrap_or("");

        if line.starts_with("B050F03") {
            pending.station = Some(last.to_string());
        } else if line.starts_with("B050F16") {
            pending.network = Some(last.to_string());
        } else if line.starts_with("B052F03") {
            // A blank location leaves the field label as the last token
            let location = if last == "??" || last.ends_with(':') { "" } else { last };
            pending.location = Some(location.to_string());
        } else if line.starts_with("B052F04") {
            pending.channel = Some(last.to_string());
        } else if line.starts_with("B052F22") {
            pending.start_date = parse_seed_time(last);
        } else if line.starts_with("B052F23") {
            let end_date = parse_seed_time(last);
            let finished = std::mem::take(&mut pending);
            if let (Some(network), Some(station), Some(location), Some(channel), Some(start_date)) = (
                finished.network,
                finished.station,
                finished.location,
                finished.channel,
                finished.start_date,
            ) {
                let info = ChannelInfo {
                    network,
                    station,
                    location,
                    channel,
                    start_date,
                    end_date,
                    format: StationFormat::Resp,
                    coordinates: None,
                };
                if !channels.contains(&info) {
                    channels.push(info);
                }
            }
        }
    }

    if channels.is_empty() {
        return Err(FormatError::Empty("RESP channel"));
    }
    Ok(channels)
}
