//! Station information endpoints
//!
//! POST /station, GET /station, GET /station/{NET.STA}

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{metadata, stations};
use crate::results::{result_set, station_features, ListFormat};
use crate::services::upload::{self, StationUpload};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Index a file already on the server instead of the request body
    pub index_file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StationListQuery {
    pub format: Option<String>,
    pub network: Option<String>,
    pub station: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StationQuery {
    pub format: Option<String>,
}

/// One channel epoch of a station
#[derive(Debug, Serialize)]
pub struct ChannelEpoch {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation_in_m: Option<f64>,
    pub local_depth_in_m: Option<f64>,
    pub filepath_id: i64,
    pub starttime: DateTime<Utc>,
    pub endtime: Option<DateTime<Utc>>,
    pub format: String,
}

/// POST /station
pub async fn upload_station(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<StationUpload>)> {
    let payload = upload::obtain_payload(body.to_vec(), query.index_file.as_deref()).await?;
    let result = upload::ingest_station_information(&state.db, &state.station_root, payload).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /station
pub async fn list_stations(
    State(state): State<AppState>,
    Query(query): Query<StationListQuery>,
) -> ApiResult<Response> {
    let format = ListFormat::parse(query.format.as_deref(), true)?;
    let stations = stations::list_stations(&state.db, query.network.as_deref(), query.station.as_deref()).await?;
    match format {
        ListFormat::GeoJson => Ok(station_features(&stations)),
        other => result_set(&stations, other),
    }
}

/// GET /station/{NET.STA}
pub async fn get_station(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
    Query(query): Query<StationQuery>,
) -> ApiResult<Response> {
    let format = ListFormat::parse(query.format.as_deref(), false)?;
    let (network, station) = station_id
        .split_once('.')
        .filter(|(_, sta)| !sta.contains('.'))
        .ok_or_else(|| ApiError::BadRequest("Invalid station id. Needs to be NET.STA.".to_string()))?;

    let record = stations::get_station(&state.db, network, station)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Could not find station {}.{} in the database", network, station)))?;

    let mut epochs = Vec::new();
    for channel in stations::list_channels(&state.db, record.id).await? {
        for epoch in metadata::list_for_channel(&state.db, channel.id).await? {
            epochs.push(ChannelEpoch {
                network: record.network.clone(),
                station: record.station.clone(),
                location: channel.location.clone(),
                channel: channel.channel.clone(),
                latitude: record.latitude,
                longitude: record.longitude,
                elevation_in_m: record.elevation_in_m,
                local_depth_in_m: record.local_depth_in_m,
                filepath_id: epoch.filepath_id,
                starttime: epoch.starttime,
                endtime: epoch.endtime,
                format: epoch.format,
            });
        }
    }

    result_set(&epochs, format)
}

pub fn station_routes() -> Router<AppState> {
    Router::new()
        .route("/station", get(list_stations).post(upload_station))
        .route("/station/:station_id", get(get_station))
}
