//! Waveform endpoints
//!
//! POST /waveform stores a file bound to an event. GET /waveform lists the
//! channels of an event or returns the data of one channel.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ebd_common::time::seconds_between;
use serde::Deserialize;

use crate::db::{events, stations, waveforms};
use crate::formats::{self, Trace, WaveformFormat};
use crate::results::{result_set, ListFormat};
use crate::services::upload::{self, WaveformUpload, WaveformUploadOptions};
use crate::{ApiError, ApiResult, AppState};

/// Largest start/end time difference, in seconds, between a stored row and
/// the trace selected from its file
const TRACE_MATCH_TOLERANCE: f64 = 1.0;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub event: Option<String>,
    pub synthetic: Option<String>,
    pub tag: Option<String>,
    pub index_file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WaveformQuery {
    pub event: Option<String>,
    pub channel_id: Option<String>,
    pub tag: Option<String>,
    pub format: Option<String>,
}

/// Requested output of GET /waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Raw,
    Encoded(WaveformFormat),
}

fn parse_output(format: Option<&str>) -> ApiResult<Option<Output>> {
    let Some(format) = format else {
        return Ok(None);
    };
    if format.eq_ignore_ascii_case("raw") {
        return Ok(Some(Output::Raw));
    }
    WaveformFormat::from_name(format)
        .map(|f| Some(Output::Encoded(f)))
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "'{}' is an unsupported format. Supported formats: mseed, sac, raw",
                format
            ))
        })
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.to_ascii_lowercase()).as_deref(),
        Some("true") | Some("yes") | Some("y")
    )
}

fn required_event(event: Option<String>) -> ApiResult<String> {
    match event {
        Some(e) if !e.is_empty() => Ok(e),
        _ => Err(ApiError::BadRequest(
            "No event parameter passed. Every waveform is bound to an existing event.".to_string(),
        )),
    }
}

/// POST /waveform
pub async fn upload_waveform(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<WaveformUpload>)> {
    let options = WaveformUploadOptions {
        event: required_event(query.event)?,
        tag: query.tag.unwrap_or_default(),
        is_synthetic: is_truthy(query.synthetic.as_deref()),
    };
    let result = upload::ingest_waveform(
        &state.db,
        &state.waveform_root,
        body.to_vec(),
        query.index_file.as_deref(),
        &options,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /waveform
pub async fn get_waveform(State(state): State<AppState>, Query(query): Query<WaveformQuery>) -> ApiResult<Response> {
    let output = parse_output(query.format.as_deref())?;
    let event = required_event(query.event)?;
    let event_id = events::get_event_id(&state.db, &event).await?.ok_or_else(|| {
        ApiError::BadRequest(format!(
            "The given event resource name '{}' is not known to the server.",
            event
        ))
    })?;

    let Some(channel_id) = query.channel_id else {
        let channels = waveforms::list_for_event(&state.db, event_id).await?;
        return result_set(&channels, ListFormat::Json);
    };

    let codes: Vec<&str> = channel_id.split('.').collect();
    let &[network, station, location, channel] = codes.as_slice() else {
        return Err(ApiError::BadRequest(
            "Invalid 'channel_id'. Needs to be NET.STA.LOC.CHAN.".to_string(),
        ));
    };

    if stations::get_station(&state.db, network, station).await?.is_none() {
        return Err(ApiError::BadRequest(format!(
            "Could not find station {}.{} in the database",
            network, station
        )));
    }

    let tag = query.tag.unwrap_or_default();
    let record = waveforms::find_waveform(&state.db, event_id, network, station, location, channel, &tag)
        .await?
        .ok_or_else(|| ApiError::NotFound("No matching data found in the database.".to_string()))?;

    let data = tokio::fs::read(&record.filepath).await?;
    let format = match output {
        Some(Output::Raw) => return Ok(octet_stream(data)),
        Some(Output::Encoded(format)) => format,
        None => WaveformFormat::from_name(&record.format).ok_or_else(|| {
            ApiError::Internal(format!("Unknown stored waveform format '{}'.", record.format))
        })?,
    };

    let waveform = formats::read_waveform(&data)
        .map_err(|e| ApiError::Internal(format!("Stored waveform could not be read: {}", e)))?;
    let trace = waveform
        .traces
        .iter()
        .find(|t| matches_record(t, &record))
        .ok_or_else(|| ApiError::Internal("Could not find the corresponding waveform file.".to_string()))?;

    let encoded = formats::write_trace(trace, format)
        .map_err(|e| ApiError::Internal(format!("Could not encode waveform: {}", e)))?;
    Ok(octet_stream(encoded))
}

/// Same channel codes and start/end times within the tolerance
fn matches_record(trace: &Trace, record: &waveforms::WaveformRecord) -> bool {
    let s = &trace.stats;
    s.network == record.network
        && s.station == record.station
        && s.location == record.location
        && s.channel == record.channel
        && seconds_between(&s.starttime, &record.starttime).abs() <= TRACE_MATCH_TOLERANCE
        && seconds_between(&trace.endtime(), &record.endtime).abs() <= TRACE_MATCH_TOLERANCE
}

fn octet_stream(data: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/octet-stream")], data).into_response()
}

pub fn waveform_routes() -> Router<AppState> {
    Router::new().route("/waveform", get(get_waveform).post(upload_waveform))
}
