//! Event endpoints
//!
//! GET /event, POST /event[/{name}], GET /event/{name},
//! GET /event/getBeachball

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::events;
use crate::error::is_unique_violation;
use crate::formats::quakeml;
use crate::results::{result_set, xml_response, ListFormat};
use crate::services::{beachball, upload};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub format: Option<String>,
}

/// POST /event response
#[derive(Debug, Serialize)]
pub struct EventCreated {
    pub resource_name: String,
}

#[derive(Debug, Deserialize)]
pub struct BeachballQuery {
    pub event: Option<String>,
    pub width: Option<String>,
    pub color: Option<String>,
}

/// GET /event
pub async fn list_events(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Response> {
    let format = ListFormat::parse(query.format.as_deref(), false)?;
    let events = events::list_events(&state.db).await?;
    result_set(&events, format)
}

/// POST /event
///
/// The resource name is generated.
pub async fn create_event(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let name = Uuid::new_v4().simple().to_string();
    store_event(&state, name, &body).await
}

/// POST /event/{name}
pub async fn create_named_event(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    store_event(&state, name, &body).await
}

async fn store_event(state: &AppState, name: String, body: &[u8]) -> ApiResult<Response> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("Empty event resource name.".to_string()));
    }
    if !upload::is_path_safe(&name) {
        return Err(ApiError::BadRequest(format!("Invalid event resource name '{}'.", name)));
    }
    let document = std::str::from_utf8(body)
        .map_err(|_| ApiError::InvalidObject("The event document is not valid UTF-8.".to_string()))?;
    let summary = quakeml::read_quakeml(body)?;

    match events::insert_event(&state.db, &name, document, &summary).await {
        Ok(id) => {
            tracing::info!(event = %name, id, public_id = ?summary.public_id, "Stored event");
            let location = format!("/event/{}", name);
            Ok((
                StatusCode::CREATED,
                [(header::LOCATION, location)],
                Json(EventCreated { resource_name: name }),
            )
                .into_response())
        }
        Err(ebd_common::Error::Database(e)) if is_unique_violation(&e) => Err(ApiError::Duplicate(format!(
            "Event '{}' already exists.",
            name
        ))),
        Err(e) => Err(e.into()),
    }
}

/// GET /event/{name}
pub async fn get_event(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Response> {
    let document = events::get_event_document(&state.db, &name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Event {} not found in database", name)))?;
    Ok(xml_response(document))
}

/// GET /event/getBeachball
pub async fn get_beachball(
    State(state): State<AppState>,
    Query(query): Query<BeachballQuery>,
) -> ApiResult<Response> {
    let event = match query.event.as_deref() {
        Some(e) if !e.is_empty() => e,
        _ => return Err(ApiError::BadRequest("'event' parameter missing.".to_string())),
    };
    let width = match query.width.as_deref() {
        None => beachball::DEFAULT_WIDTH,
        Some(w) => match w.parse::<u32>() {
            Ok(w) if (1..=beachball::MAX_WIDTH).contains(&w) => w,
            _ => {
                return Err(ApiError::BadRequest(format!(
                    "Invalid 'width' parameter '{}'. Must be between 1 and {}.",
                    w,
                    beachball::MAX_WIDTH
                )))
            }
        },
    };
    let color_name = query.color.as_deref().unwrap_or(beachball::DEFAULT_COLOR);
    let face = beachball::parse_color(color_name)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown color '{}'.", color_name)))?;

    let not_found = || ApiError::NotFound(format!("Event {} not found in database", event));
    let record = events::get_event(&state.db, event).await?.ok_or_else(not_found)?;
    let tensor = record.moment_tensor().ok_or_else(not_found)?;

    let png = tokio::task::spawn_blocking(move || beachball::render_png(&tensor, width, face))
        .await
        .map_err(|e| ApiError::Internal(format!("Beachball rendering task failed: {}", e)))??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/event", get(list_events).post(create_event))
        .route("/event/getBeachball", get(get_beachball))
        .route("/event/:name", get(get_event).post(create_named_event))
}
