//! Shared utilities for the ebd-server integration tests

#![allow(dead_code)]

pub mod fixtures;

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use ebd_server::AppState;
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tower::util::ServiceExt;

/// A server on a fresh database and data tree
pub struct TestServer {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub state: AppState,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestServer {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let pool = ebd_common::db::init_database(&dir.path().join("ebd.db"))
            .await
            .expect("Failed to create database");
        let state = AppState::new(
            pool.clone(),
            dir.path().join("data").join("waveforms"),
            dir.path().join("data").join("responses"),
        );
        Self { dir, pool, state }
    }

    pub fn app(&self) -> Router {
        ebd_server::build_router(self.state.clone())
    }

    pub async fn request(&self, method: Method, uri: &str, body: impl Into<Body>) -> TestResponse {
        let response = self
            .app()
            .oneshot(Request::builder().method(method).uri(uri).body(body.into()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, Body::empty()).await
    }

    pub async fn post(&self, uri: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        self.request(Method::POST, uri, Body::from(body.into())).await
    }

    /// Store the fixture QuakeML document under `name`
    pub async fn create_event(&self, name: &str) {
        let response = self.post(&format!("/event/{}", name), fixtures::QUAKEML).await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
    }

    pub fn waveform_root(&self) -> &Path {
        &self.state.waveform_root
    }

    pub fn station_root(&self) -> &Path {
        &self.state.station_root
    }
}

/// Every regular file below `root`
pub fn files_below(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Row counts of the file, channel, metadata and waveform tables
pub async fn row_counts(pool: &SqlitePool) -> (i64, i64, i64, i64) {
    use ebd_server::db::{filepaths, metadata, stations, waveforms};
    (
        filepaths::count_filepaths(pool).await.unwrap(),
        stations::count_channels(pool).await.unwrap(),
        metadata::count_channel_metadata(pool).await.unwrap(),
        waveforms::count_waveform_channels(pool).await.unwrap(),
    )
}
