//! Event bound waveform channels

use chrono::{DateTime, Utc};
use ebd_common::time::{from_db_string, to_db_string};
use ebd_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::PathBuf;

/// A waveform row to insert
#[derive(Debug, Clone)]
pub struct NewWaveformChannel<'a> {
    pub channel_id: i64,
    pub filepath_id: i64,
    pub event_id: i64,
    pub starttime: DateTime<Utc>,
    pub endtime: DateTime<Utc>,
    pub sampling_rate: f64,
    pub format: &'a str,
    pub is_synthetic: bool,
    pub tag: &'a str,
}

pub async fn insert_waveform_channel(conn: &mut SqliteConnection, row: &NewWaveformChannel<'_>) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO ebd_waveform_channels (
            channel_id, filepath_id, event_resource_id, starttime, endtime,
            sampling_rate, format, is_synthetic, tag
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(row.channel_id)
    .bind(row.filepath_id)
    .bind(row.event_id)
    .bind(to_db_string(&row.starttime))
    .bind(to_db_string(&row.endtime))
    .bind(row.sampling_rate)
    .bind(row.format)
    .bind(row.is_synthetic)
    .bind(row.tag)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Tags already used by a channel for an event
pub async fn get_all_tags(
    pool: &SqlitePool,
    network: &str,
    station: &str,
    location: &str,
    channel: &str,
    event_id: i64,
) -> Result<Vec<String>> {
    let tags = sqlx::query_scalar(
        r#"
        SELECT w.tag
        FROM ebd_waveform_channels w
        JOIN ebd_channels c ON c.id = w.channel_id
        JOIN ebd_stations s ON s.id = c.station_id
        WHERE s.network = ? AND s.station = ? AND c.location = ? AND c.channel = ?
          AND w.event_resource_id = ?
        ORDER BY w.tag
        "#,
    )
    .bind(network)
    .bind(station)
    .bind(location)
    .bind(channel)
    .bind(event_id)
    .fetch_all(pool)
    .await?;
    Ok(tags)
}

/// One waveform channel with its channel codes and file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveformRecord {
    pub id: i64,
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub filepath_id: i64,
    #[serde(skip)]
    pub filepath: PathBuf,
    pub tag: String,
    pub starttime: DateTime<Utc>,
    pub endtime: DateTime<Utc>,
    pub sampling_rate: f64,
    pub format: String,
    pub is_synthetic: bool,
}

impl WaveformRecord {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let filepath: String = row.get("filepath");
        let starttime: String = row.get("starttime");
        let endtime: String = row.get("endtime");
        Ok(Self {
            id: row.get("id"),
            network: row.get("network"),
            station: row.get("station"),
            location: row.get("location"),
            channel: row.get("channel"),
            filepath_id: row.get("filepath_id"),
            filepath: PathBuf::from(filepath),
            tag: row.get("tag"),
            starttime: from_db_string(&starttime)?,
            endtime: from_db_string(&endtime)?,
            sampling_rate: row.get("sampling_rate"),
            format: row.get("format"),
            is_synthetic: row.get("is_synthetic"),
        })
    }
}

const WAVEFORM_SELECT: &str = r#"
    SELECT w.id, s.network, s.station, c.location, c.channel, w.filepath_id, f.filepath,
           w.tag, w.starttime, w.endtime, w.sampling_rate, w.format, w.is_synthetic
    FROM ebd_waveform_channels w
    JOIN ebd_channels c ON c.id = w.channel_id
    JOIN ebd_stations s ON s.id = c.station_id
    JOIN ebd_filepaths f ON f.id = w.filepath_id
"#;

pub async fn list_for_event(pool: &SqlitePool, event_id: i64) -> Result<Vec<WaveformRecord>> {
    let rows = sqlx::query(&format!(
        "{} WHERE w.event_resource_id = ? ORDER BY s.network, s.station, c.location, c.channel, w.tag",
        WAVEFORM_SELECT
    ))
    .bind(event_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(WaveformRecord::from_row).collect()
}

/// The waveform of one channel, event and tag
pub async fn find_waveform(
    pool: &SqlitePool,
    event_id: i64,
    network: &str,
    station: &str,
    location: &str,
    channel: &str,
    tag: &str,
) -> Result<Option<WaveformRecord>> {
    let row = sqlx::query(&format!(
        "{} WHERE w.event_resource_id = ? AND s.network = ? AND s.station = ? \
         AND c.location = ? AND c.channel = ? AND w.tag = ?",
        WAVEFORM_SELECT
    ))
    .bind(event_id)
    .bind(network)
    .bind(station)
    .bind(location)
    .bind(channel)
    .bind(tag)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(WaveformRecord::from_row).transpose()
}

pub async fn count_waveform_channels(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ebd_waveform_channels")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
