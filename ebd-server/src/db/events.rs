//! Event documents
//!
//! The QuakeML text is stored verbatim next to its indexed values.

use crate::formats::quakeml::{EventSummary, MomentTensor};
use chrono::{DateTime, Utc};
use ebd_common::time::{from_db_string, now, to_db_string};
use ebd_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Indexed values of a stored event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub id: i64,
    pub resource_name: String,
    pub document_last_modified: DateTime<Utc>,
    pub time: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub depth: Option<f64>,
    pub magnitude: Option<f64>,
    pub magnitude_type: Option<String>,
    #[serde(rename = "Mrr")]
    pub mrr: Option<f64>,
    #[serde(rename = "Mtt")]
    pub mtt: Option<f64>,
    #[serde(rename = "Mpp")]
    pub mpp: Option<f64>,
    #[serde(rename = "Mrt")]
    pub mrt: Option<f64>,
    #[serde(rename = "Mrp")]
    pub mrp: Option<f64>,
    #[serde(rename = "Mtp")]
    pub mtp: Option<f64>,
    pub scalar_moment: Option<f64>,
}

impl EventRecord {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let modified: String = row.get("document_last_modified");
        let time: Option<String> = row.get("time");
        Ok(Self {
            id: row.get("id"),
            resource_name: row.get("resource_name"),
            document_last_modified: from_db_string(&modified)?,
            time: time.as_deref().map(from_db_string).transpose()?,
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            depth: row.get("depth"),
            magnitude: row.get("magnitude"),
            magnitude_type: row.get("magnitude_type"),
            mrr: row.get("mrr"),
            mtt: row.get("mtt"),
            mpp: row.get("mpp"),
            mrt: row.get("mrt"),
            mrp: row.get("mrp"),
            mtp: row.get("mtp"),
            scalar_moment: row.get("scalar_moment"),
        })
    }

    pub fn moment_tensor(&self) -> Option<MomentTensor> {
        Some(MomentTensor {
            mrr: self.mrr?,
            mtt: self.mtt?,
            mpp: self.mpp?,
            mrt: self.mrt?,
            mrp: self.mrp?,
            mtp: self.mtp?,
        })
    }
}

const EVENT_COLUMNS: &str = "id, resource_name, document_last_modified, time, latitude, longitude, depth, \
     magnitude, magnitude_type, mrr, mtt, mpp, mrt, mrp, mtp, scalar_moment";

/// Store a new event document; an existing name is a unique violation
pub async fn insert_event(
    pool: &SqlitePool,
    resource_name: &str,
    document: &str,
    summary: &EventSummary,
) -> Result<i64> {
    let mt = summary.moment_tensor;
    let result = sqlx::query(
        r#"
        INSERT INTO ebd_events (
            resource_name, document, document_last_modified, time, latitude, longitude, depth,
            magnitude, magnitude_type, mrr, mtt, mpp, mrt, mrp, mtp, scalar_moment
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(resource_name)
    .bind(document)
    .bind(to_db_string(&now()))
    .bind(summary.time.as_ref().map(to_db_string))
    .bind(summary.latitude)
    .bind(summary.longitude)
    .bind(summary.depth)
    .bind(summary.magnitude)
    .bind(summary.magnitude_type.as_deref())
    .bind(mt.map(|m| m.mrr))
    .bind(mt.map(|m| m.mtt))
    .bind(mt.map(|m| m.mpp))
    .bind(mt.map(|m| m.mrt))
    .bind(mt.map(|m| m.mrp))
    .bind(mt.map(|m| m.mtp))
    .bind(summary.scalar_moment)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Row id of an event, used as the foreign key of waveform rows
pub async fn get_event_id(pool: &SqlitePool, resource_name: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM ebd_events WHERE resource_name = ?")
        .bind(resource_name)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

pub async fn get_event(pool: &SqlitePool, resource_name: &str) -> Result<Option<EventRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM ebd_events WHERE resource_name = ?", EVENT_COLUMNS))
        .bind(resource_name)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(EventRecord::from_row).transpose()
}

pub async fn get_event_document(pool: &SqlitePool, resource_name: &str) -> Result<Option<String>> {
    let document = sqlx::query_scalar("SELECT document FROM ebd_events WHERE resource_name = ?")
        .bind(resource_name)
        .fetch_optional(pool)
        .await?;
    Ok(document)
}

pub async fn list_events(pool: &SqlitePool) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query(&format!("SELECT {} FROM ebd_events ORDER BY id", EVENT_COLUMNS))
        .fetch_all(pool)
        .await?;
    rows.iter().map(EventRecord::from_row).collect()
}
