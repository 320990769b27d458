//! Database access for ebd-server
//!
//! Functions that take part in an upload write through a
//! `&mut SqliteConnection` so the caller can run them inside one
//! transaction; lookups take the pool.

pub mod events;
pub mod filepaths;
pub mod metadata;
pub mod stations;
pub mod waveforms;

#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    // A single connection, so every query sees the same in-memory database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    ebd_common::db::init_schema(&pool).await.unwrap();
    pool
}
