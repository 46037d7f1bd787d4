//! Settings database operations
//!
//! Key-value accessors for the `settings` table: per-source API keys and
//! the lock-retry budget.

use sqlx::{Pool, Sqlite};
use biblio_common::db::MAX_LOCK_WAIT_SETTING;
use biblio_common::{Error, Result};

use crate::models::SourceKind;

const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

fn api_key_setting(source: SourceKind) -> String {
    format!("{}_api_key", source.as_str().to_ascii_lowercase())
}

/// API key stored for a source, if any
pub async fn get_api_key(db: &Pool<Sqlite>, source: SourceKind) -> Result<Option<String>> {
    get_setting::<String>(db, &api_key_setting(source)).await
}

pub async fn set_api_key(db: &Pool<Sqlite>, source: SourceKind, key: String) -> Result<()> {
    set_setting(db, &api_key_setting(source), key).await
}

/// Total time a write may spend retrying on `database is locked`
///
/// **Default:** 5000 ms
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, MAX_LOCK_WAIT_SETTING)
        .await
        .map(|opt| opt.unwrap_or(DEFAULT_MAX_LOCK_WAIT_MS))
}

/// Generic setting getter
///
/// NULL values read as unset.
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row.and_then(|(value,)| value) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Setting {} has invalid value: {}", key, e))),
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
