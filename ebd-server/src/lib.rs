//! ebd-server library interface
//!
//! Exposes the router and state for the binary and for integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod formats;
pub mod results;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use ebd_common::config::ServiceConfig;
use sqlx::SqlitePool;
use std::path::PathBuf;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Managed waveform files live below this folder
    pub waveform_root: PathBuf,
    /// Managed station information files live below this folder
    pub station_root: PathBuf,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, waveform_root: PathBuf, station_root: PathBuf) -> Self {
        Self {
            db,
            waveform_root,
            station_root,
            startup_time: ebd_common::time::now(),
        }
    }

    pub fn from_config(db: SqlitePool, config: &ServiceConfig) -> Self {
        Self::new(db, config.waveform_filepath.clone(), config.station_filepath.clone())
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::event_routes())
        .merge(api::station_routes())
        .merge(api::waveform_routes())
        .merge(api::file_routes())
        .merge(api::health_routes())
        .with_state(state)
}
