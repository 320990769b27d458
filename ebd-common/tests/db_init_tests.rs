//! Database initialization tests

use ebd_common::db::init::init_database;
use tempfile::TempDir;

async fn table_names(pool: &sqlx::SqlitePool) -> Vec<String> {
    sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'ebd_%' ORDER BY name")
        .fetch_all(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("ebd.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");

    let tables = table_names(&result.unwrap()).await;
    assert_eq!(
        tables,
        vec![
            "ebd_channel_metadata",
            "ebd_channels",
            "ebd_events",
            "ebd_filepaths",
            "ebd_stations",
            "ebd_waveform_channels",
        ]
    );
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("ebd.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO ebd_stations (network, station) VALUES ('GR', 'FUR')")
        .execute(&pool1)
        .await
        .unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ebd_stations")
        .fetch_one(&pool2.unwrap())
        .await
        .unwrap();
    assert_eq!(count, 1, "Existing rows must survive re-initialization");
}

#[tokio::test]
async fn test_station_uniqueness_enforced() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("ebd.db")).await.unwrap();

    sqlx::query("INSERT INTO ebd_stations (network, station) VALUES ('GR', 'FUR')")
        .execute(&pool)
        .await
        .unwrap();
    let second = sqlx::query("INSERT INTO ebd_stations (network, station) VALUES ('GR', 'FUR')")
        .execute(&pool)
        .await;
    assert!(second.is_err());
}

#[tokio::test]
async fn test_open_ended_metadata_intervals_collide() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("ebd.db")).await.unwrap();

    sqlx::query("INSERT INTO ebd_stations (id, network, station) VALUES (1, 'GR', 'FUR')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO ebd_channels (id, station_id, location, channel) VALUES (1, 1, '', 'BHZ')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO ebd_filepaths (id, filepath, size, mtime, checksum, is_managed) \
         VALUES (1, '/tmp/a', 1, '2020-01-01T00:00:00.000000', 'abc', 1)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let insert = "INSERT INTO ebd_channel_metadata (channel_id, filepath_id, starttime, endtime, format) \
                  VALUES (1, 1, '2007-01-01T00:00:00.000000', NULL, 'RESP')";
    sqlx::query(insert).execute(&pool).await.unwrap();
    assert!(sqlx::query(insert).execute(&pool).await.is_err());
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("ebd.db")).await.unwrap();

    let orphan = sqlx::query("INSERT INTO ebd_channels (station_id, location, channel) VALUES (42, '', 'BHZ')")
        .execute(&pool)
        .await;
    assert!(orphan.is_err(), "Channel without station must be rejected");
}
