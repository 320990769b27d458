//! Database initialization
//!
//! Creates the SQLite database on first run and the tables of the
//! event-based data schema. Every table is prefixed with `ebd_`.
//! All statements are idempotent, so opening an existing database is safe.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Foreign keys must be enabled per connection, so they go into the
    // connect options rather than a one-off PRAGMA.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create every table and index of the schema
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_stations_table(pool).await?;
    create_channels_table(pool).await?;
    create_filepaths_table(pool).await?;
    create_channel_metadata_table(pool).await?;
    create_events_table(pool).await?;
    create_waveform_channels_table(pool).await?;

    info!("Database tables initialized (stations, channels, filepaths, channel_metadata, events, waveform_channels)");
    Ok(())
}

/// Stations. Coordinates are nullable because they are not always known;
/// they are filled in once a source carrying them is uploaded.
pub async fn create_stations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ebd_stations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            network TEXT NOT NULL,
            station TEXT NOT NULL,
            latitude REAL,
            longitude REAL,
            elevation_in_m REAL,
            local_depth_in_m REAL,
            UNIQUE(network, station)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_channels_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ebd_channels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id INTEGER NOT NULL REFERENCES ebd_stations(id),
            location TEXT NOT NULL,
            channel TEXT NOT NULL,
            UNIQUE(station_id, location, channel)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Physical files. `is_managed` marks files the service copied into its own
/// tree and therefore may move or delete; indexed files are never touched.
pub async fn create_filepaths_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ebd_filepaths (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filepath TEXT NOT NULL UNIQUE,
            size INTEGER NOT NULL,
            mtime TEXT NOT NULL,
            checksum TEXT NOT NULL UNIQUE,
            is_managed INTEGER NOT NULL,
            file_origin_resource_id INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per continuous channel epoch, even if several share a file
pub async fn create_channel_metadata_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ebd_channel_metadata (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id INTEGER NOT NULL REFERENCES ebd_channels(id),
            filepath_id INTEGER NOT NULL REFERENCES ebd_filepaths(id),
            starttime TEXT NOT NULL,
            endtime TEXT,
            format TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // A plain UNIQUE constraint would let two open-ended epochs coexist
    // because NULLs compare distinct.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ebd_channel_metadata_interval
        ON ebd_channel_metadata (channel_id, filepath_id, starttime, COALESCE(endtime, ''))
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Event documents with the indexed QuakeML values
pub async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ebd_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resource_name TEXT NOT NULL UNIQUE,
            document TEXT NOT NULL,
            document_last_modified TEXT NOT NULL,
            time TEXT,
            latitude REAL,
            longitude REAL,
            depth REAL,
            magnitude REAL,
            magnitude_type TEXT,
            mrr REAL,
            mtt REAL,
            mpp REAL,
            mrt REAL,
            mrp REAL,
            mtp REAL,
            scalar_moment REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per continuous trace, even if several share a file
pub async fn create_waveform_channels_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ebd_waveform_channels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id INTEGER NOT NULL REFERENCES ebd_channels(id),
            filepath_id INTEGER NOT NULL REFERENCES ebd_filepaths(id),
            event_resource_id INTEGER NOT NULL REFERENCES ebd_events(id),
            starttime TEXT NOT NULL,
            endtime TEXT NOT NULL,
            sampling_rate REAL NOT NULL,
            format TEXT NOT NULL,
            is_synthetic INTEGER NOT NULL,
            tag TEXT NOT NULL DEFAULT '',
            metadata_resource_id INTEGER,
            processing_history_resource_id INTEGER,
            UNIQUE(channel_id, event_resource_id, tag)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
