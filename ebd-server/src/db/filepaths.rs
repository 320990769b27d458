//! File bookkeeping
//!
//! Every stored or indexed file gets one row, keyed by absolute path and by
//! content checksum.

use ebd_common::time::{from_db_string, now, to_db_string};
use ebd_common::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FilepathRecord {
    pub id: i64,
    pub filepath: PathBuf,
    pub size: i64,
    pub mtime: DateTime<Utc>,
    pub checksum: String,
    pub is_managed: bool,
}

/// SHA-256 of the file contents, lowercase hex
pub fn calculate_checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

pub async fn checksum_exists(pool: &SqlitePool, checksum: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ebd_filepaths WHERE checksum = ?")
        .bind(checksum)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Insert a file row and return its id
pub async fn insert_filepath(
    conn: &mut SqliteConnection,
    filepath: &Path,
    size: i64,
    checksum: &str,
    is_managed: bool,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO ebd_filepaths (filepath, size, mtime, checksum, is_managed)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(filepath.to_string_lossy().as_ref())
    .bind(size)
    .bind(to_db_string(&now()))
    .bind(checksum)
    .bind(is_managed)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_filepath(pool: &SqlitePool, id: i64) -> Result<Option<FilepathRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, filepath, size, mtime, checksum, is_managed
        FROM ebd_filepaths
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let filepath: String = row.get("filepath");
            let mtime: String = row.get("mtime");
            Ok(Some(FilepathRecord {
                id: row.get("id"),
                filepath: PathBuf::from(filepath),
                size: row.get("size"),
                mtime: from_db_string(&mtime)?,
                checksum: row.get("checksum"),
                is_managed: row.get("is_managed"),
            }))
        }
        None => Ok(None),
    }
}

pub async fn count_filepaths(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ebd_filepaths")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            calculate_checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let pool = test_pool().await;
        let checksum = calculate_checksum(b"payload");
        assert!(!checksum_exists(&pool, &checksum).await.unwrap());

        let mut conn = pool.acquire().await.unwrap();
        let id = insert_filepath(&mut conn, Path::new("/data/GR/file"), 7, &checksum, true)
            .await
            .unwrap();
        drop(conn);

        assert!(checksum_exists(&pool, &checksum).await.unwrap());
        let record = get_filepath(&pool, id).await.unwrap().unwrap();
        assert_eq!(record.filepath, PathBuf::from("/data/GR/file"));
        assert_eq!(record.size, 7);
        assert!(record.is_managed);
        assert!(get_filepath(&pool, id + 1).await.unwrap().is_none());
        assert_eq!(count_filepaths(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_checksum_is_rejected() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        insert_filepath(&mut conn, Path::new("/a"), 1, "same", true).await.unwrap();
        let err = insert_filepath(&mut conn, Path::new("/b"), 1, "same", true)
            .await
            .unwrap_err();
        match err {
            ebd_common::Error::Database(e) => assert!(crate::error::is_unique_violation(&e)),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
