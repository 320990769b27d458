//! GET /downloadFile

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::db::filepaths;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub filepath_id: Option<String>,
}

/// Return the stored bytes of one file as an attachment
pub async fn download_file(State(state): State<AppState>, Query(query): Query<DownloadQuery>) -> ApiResult<Response> {
    let id = query
        .filepath_id
        .as_deref()
        .and_then(|id| id.trim().parse::<i64>().ok())
        .ok_or_else(|| ApiError::BadRequest("File with the given id not found.".to_string()))?;

    let record = filepaths::get_filepath(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("File with the given id not found.".to_string()))?;

    let data = tokio::fs::read(&record.filepath).await.map_err(|e| {
        tracing::error!(path = %record.filepath.display(), "Failed to read stored file: {}", e);
        ApiError::Internal("Error reading data.".to_string())
    })?;

    let filename = record
        .filepath
        .file_name()
        .map(|name| name.to_string_lossy().replace('"', ""))
        .unwrap_or_default();

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename={}", filename)),
        ],
        data,
    )
        .into_response())
}

pub fn file_routes() -> Router<AppState> {
    Router::new().route("/downloadFile", get(download_file))
}
