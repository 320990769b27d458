//! Stations and channels
//!
//! Both are shared by station metadata and waveform uploads and are
//! created on first sight.

use crate::formats::Coordinates;
use ebd_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRecord {
    pub id: i64,
    pub network: String,
    pub station: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation_in_m: Option<f64>,
    pub local_depth_in_m: Option<f64>,
}

impl StationRecord {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            network: row.get("network"),
            station: row.get("station"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            elevation_in_m: row.get("elevation_in_m"),
            local_depth_in_m: row.get("local_depth_in_m"),
        }
    }

    /// All four coordinates, if every one of them is known
    pub fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates {
            latitude: self.latitude?,
            longitude: self.longitude?,
            elevation_in_m: self.elevation_in_m?,
            local_depth_in_m: self.local_depth_in_m?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelRecord {
    pub id: i64,
    pub station_id: i64,
    pub location: String,
    pub channel: String,
}

/// Get the channel id, creating station and channel rows as needed
///
/// Coordinates are written only when all four come from `coordinates` and
/// the stored station lacks at least one of them, so a station never mixes
/// values from two sources and is never cleared.
pub async fn add_or_update_channel(
    conn: &mut SqliteConnection,
    network: &str,
    station: &str,
    location: &str,
    channel: &str,
    coordinates: Option<Coordinates>,
) -> Result<i64> {
    sqlx::query(
        r#"
        INSERT INTO ebd_stations (network, station) VALUES (?, ?)
        ON CONFLICT(network, station) DO NOTHING
        "#,
    )
    .bind(network)
    .bind(station)
    .execute(&mut *conn)
    .await?;

    let station_id: i64 = sqlx::query_scalar("SELECT id FROM ebd_stations WHERE network = ? AND station = ?")
        .bind(network)
        .bind(station)
        .fetch_one(&mut *conn)
        .await?;

    if let Some(c) = coordinates {
        sqlx::query(
            r#"
            UPDATE ebd_stations
            SET latitude = ?, longitude = ?, elevation_in_m = ?, local_depth_in_m = ?
            WHERE id = ?
              AND (latitude IS NULL OR longitude IS NULL
                   OR elevation_in_m IS NULL OR local_depth_in_m IS NULL)
            "#,
        )
        .bind(c.latitude)
        .bind(c.longitude)
        .bind(c.elevation_in_m)
        .bind(c.local_depth_in_m)
        .bind(station_id)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO ebd_channels (station_id, location, channel) VALUES (?, ?, ?)
        ON CONFLICT(station_id, location, channel) DO NOTHING
        "#,
    )
    .bind(station_id)
    .bind(location)
    .bind(channel)
    .execute(&mut *conn)
    .await?;

    let channel_id: i64 =
        sqlx::query_scalar("SELECT id FROM ebd_channels WHERE station_id = ? AND location = ? AND channel = ?")
            .bind(station_id)
            .bind(location)
            .bind(channel)
            .fetch_one(&mut *conn)
            .await?;

    Ok(channel_id)
}

/// Stations, optionally filtered by network and/or station code
pub async fn list_stations(
    pool: &SqlitePool,
    network: Option<&str>,
    station: Option<&str>,
) -> Result<Vec<StationRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, network, station, latitude, longitude, elevation_in_m, local_depth_in_m
        FROM ebd_stations
        WHERE (?1 IS NULL OR network = ?1)
          AND (?2 IS NULL OR station = ?2)
        ORDER BY network, station
        "#,
    )
    .bind(network)
    .bind(station)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(StationRecord::from_row).collect())
}

pub async fn get_station(pool: &SqlitePool, network: &str, station: &str) -> Result<Option<StationRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, network, station, latitude, longitude, elevation_in_m, local_depth_in_m
        FROM ebd_stations
        WHERE network = ? AND station = ?
        "#,
    )
    .bind(network)
    .bind(station)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(StationRecord::from_row))
}

pub async fn list_channels(pool: &SqlitePool, station_id: i64) -> Result<Vec<ChannelRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, station_id, location, channel
        FROM ebd_channels
        WHERE station_id = ?
        ORDER BY location, channel
        "#,
    )
    .bind(station_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ChannelRecord {
            id: row.get("id"),
            station_id: row.get("station_id"),
            location: row.get("location"),
            channel: row.get("channel"),
        })
        .collect())
}

pub async fn count_channels(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ebd_channels")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
