//! Channel metadata epochs

use chrono::{DateTime, Utc};
use ebd_common::time::{from_db_string, to_db_string};
use ebd_common::Result;
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelMetadataRecord {
    pub id: i64,
    pub channel_id: i64,
    pub filepath_id: i64,
    pub starttime: DateTime<Utc>,
    pub endtime: Option<DateTime<Utc>>,
    pub format: String,
}

/// Insert one epoch; an identical (channel, file, start, end) epoch is a
/// unique violation
pub async fn insert_channel_metadata(
    conn: &mut SqliteConnection,
    channel_id: i64,
    filepath_id: i64,
    starttime: &DateTime<Utc>,
    endtime: Option<&DateTime<Utc>>,
    format: &str,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO ebd_channel_metadata (channel_id, filepath_id, starttime, endtime, format)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(channel_id)
    .bind(filepath_id)
    .bind(to_db_string(starttime))
    .bind(endtime.map(to_db_string))
    .bind(format)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn list_for_channel(pool: &SqlitePool, channel_id: i64) -> Result<Vec<ChannelMetadataRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, channel_id, filepath_id, starttime, endtime, format
        FROM ebd_channel_metadata
        WHERE channel_id = ?
        ORDER BY starttime
        "#,
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let starttime: String = row.get("starttime");
        let endtime: Option<String> = row.get("endtime");
        records.push(ChannelMetadataRecord {
            id: row.get("id"),
            channel_id: row.get("channel_id"),
            filepath_id: row.get("filepath_id"),
            starttime: from_db_string(&starttime)?,
            endtime: endtime.as_deref().map(from_db_string).transpose()?,
            format: row.get("format"),
        });
    }
    Ok(records)
}

pub async fn count_channel_metadata(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ebd_channel_metadata")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::filepaths::insert_filepath;
    use crate::db::stations::add_or_update_channel;
    use crate::db::test_pool;
    use crate::error::is_unique_violation;
    use chrono::TimeZone;
    use std::path::Path;

    #[tokio::test]
    async fn test_interval_uniqueness() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let channel = add_or_update_channel(&mut conn, "PM", "PFVI", "", "BHZ", None).await.unwrap();
        let file = insert_filepath(&mut conn, Path::new("/resp"), 10, "abc", true).await.unwrap();

        let start = Utc.with_ymd_and_hms(2007, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap();

        insert_channel_metadata(&mut conn, channel, file, &start, None, "RESP").await.unwrap();
        let err = insert_channel_metadata(&mut conn, channel, file, &start, None, "RESP")
            .await
            .unwrap_err();
        assert!(matches!(err, ebd_common::Error::Database(ref e) if is_unique_violation(e)));

        insert_channel_metadata(&mut conn, channel, file, &start, Some(&later), "RESP")
            .await
            .unwrap();
        insert_channel_metadata(&mut conn, channel, file, &later, None, "RESP").await.unwrap();
        drop(conn);

        let records = list_for_channel(&pool, channel).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].starttime, start);
        assert_eq!(count_channel_metadata(&pool).await.unwrap(), 3);
    }
}
