//! Error types for ebd-server
//!
//! Every handler returns [`ApiResult`]; the error variant decides the HTTP
//! status and the `code` of the JSON error body.

use crate::formats::FormatError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Missing or invalid parameter (400)
    #[error("Invalid parameter: {0}")]
    BadRequest(String),

    /// Object already stored (409)
    #[error("Duplicate object: {0}")]
    Duplicate(String),

    /// Uploaded file could not be read (409)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ebd_common::Error> for ApiError {
    fn from(err: ebd_common::Error) -> Self {
        match err {
            ebd_common::Error::Database(e) => ApiError::Database(e),
            ebd_common::Error::Io(e) => ApiError::Io(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<FormatError> for ApiError {
    fn from(err: FormatError) -> Self {
        ApiError::InvalidObject(err.to_string())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Duplicate(_) | ApiError::InvalidObject(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message) = match self {
            ApiError::NotFound(msg) => ("NOT_FOUND", msg),
            ApiError::BadRequest(msg) => ("BAD_REQUEST", msg),
            ApiError::Duplicate(msg) => ("DUPLICATE_OBJECT", msg),
            ApiError::InvalidObject(msg) => ("INVALID_OBJECT", msg),
            ApiError::Internal(msg) => ("INTERNAL_ERROR", msg),
            ApiError::Io(ref err) => ("IO_ERROR", err.to_string()),
            ApiError::Database(ref err) => ("DATABASE_ERROR", err.to_string()),
            ApiError::Other(ref err) => ("INTERNAL_ERROR", err.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Whether a database error is a UNIQUE (or primary key) violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
