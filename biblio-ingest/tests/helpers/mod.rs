//! Test Helper Utilities
//!
//! Shared utilities for testing biblio-ingest

#![allow(dead_code)]

pub mod harvest;
pub mod log_capture;

use biblio_ingest::models::{MultilingualContent, Owner, PublicationType, RecordSource, ImportRecord};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// In-memory database with the full schema
///
/// One connection, so every query sees the same in-memory database.
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    biblio_common::db::init_schema(&pool).await.unwrap();
    pool
}

/// Journal article with an English title owned by `owner`
pub fn owned_record(identifier: &str, title: &str, owner: Owner) -> ImportRecord {
    let mut record = ImportRecord::new(
        identifier,
        RecordSource::OpenAlex,
        PublicationType::JournalPublication,
    );
    record.title = MultilingualContent::english(title).into_iter().collect();
    record.add_owner(owner);
    record
}

pub async fn count_records(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM import_records")
        .fetch_one(pool)
        .await
        .unwrap()
}
