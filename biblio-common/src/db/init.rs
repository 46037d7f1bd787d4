//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates every table the
//! harvesting pipeline uses. All statements are idempotent.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Setting key: maximum total wait for a locked database write
pub const MAX_LOCK_WAIT_SETTING: &str = "harvest_database_max_lock_wait_ms";

/// Setting key: SQLite busy timeout
pub const LOCK_RETRY_SETTING: &str = "harvest_database_lock_retry_ms";

const DEFAULT_LOCK_RETRY_MS: u64 = 250;
const POOL_SIZE: u32 = 20;

/// Initialize database connection and create tables if needed
///
/// **Lifecycle:**
/// 1. Single-connection bootstrap pool creates the schema and reads the
///    busy timeout from the settings table
/// 2. Bootstrap pool closed
/// 3. Production pool opened with per-connection options (busy timeout,
///    WAL, foreign keys), so every pooled connection carries them
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let connect_options = || {
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
    };

    let bootstrap = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options())
        .await?;

    // WAL lets the loader wizard read while a harvest writes; persistent per file
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&bootstrap)
        .await?;

    init_schema(&bootstrap).await?;
    let lock_retry_ms = read_lock_retry_ms(&bootstrap).await?;
    bootstrap.close().await;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(POOL_SIZE)
        .min_connections(2)
        .connect_with(
            connect_options()
                .busy_timeout(Duration::from_millis(lock_retry_ms))
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
        )
        .await?;

    info!(
        "Database pool ready: {} connections, busy_timeout={}ms",
        POOL_SIZE, lock_retry_ms
    );

    Ok(pool)
}

async fn read_lock_retry_ms(pool: &SqlitePool) -> Result<u64> {
    let stored: Option<i64> = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = ?",
    )
    .bind(LOCK_RETRY_SETTING)
    .fetch_optional(pool)
    .await?;

    match stored {
        Some(ms) if ms > 0 => Ok(ms as u64),
        Some(ms) => {
            warn!("Invalid {} value {}, using {} ms", LOCK_RETRY_SETTING, ms, DEFAULT_LOCK_RETRY_MS);
            Ok(DEFAULT_LOCK_RETRY_MS)
        }
        None => Ok(DEFAULT_LOCK_RETRY_MS),
    }
}

/// Create all tables and default settings on an already-open pool
///
/// Used by `init_database` and directly by tests running on `sqlite::memory:`.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_settings_table(pool).await?;
    create_import_records_table(pool).await?;
    create_import_record_owners_table(pool).await?;
    create_loading_progress_table(pool).await?;
    create_scheduled_tasks_table(pool).await?;

    // Primary domain tables backing the default entity store
    create_institutions_table(pool).await?;
    create_persons_table(pool).await?;
    create_journals_table(pool).await?;
    create_events_table(pool).await?;
    create_users_tables(pool).await?;

    init_default_settings(pool).await?;

    Ok(())
}

/// Create the settings table
///
/// Stores configuration key-value pairs (API keys, lock timing).
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_import_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_records (
            identifier TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            publication_type TEXT NOT NULL,
            doi TEXT,
            metadata_key TEXT,
            publication_year INTEGER,
            loaded INTEGER NOT NULL DEFAULT 0,
            document TEXT NOT NULL,
            embedding TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_import_records_doi ON import_records(doi)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_import_records_metadata_key ON import_records(metadata_key)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_import_records_loaded ON import_records(loaded, identifier)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_import_record_owners_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_record_owners (
            identifier TEXT NOT NULL REFERENCES import_records(identifier) ON DELETE CASCADE,
            owner_kind TEXT NOT NULL CHECK (owner_kind IN ('USER', 'INSTITUTION')),
            owner_id INTEGER NOT NULL,
            PRIMARY KEY (identifier, owner_kind, owner_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_import_record_owners_owner ON import_record_owners(owner_kind, owner_id, identifier)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_loading_progress_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS loading_progress (
            dataset TEXT NOT NULL,
            owner_kind TEXT NOT NULL,
            owner_id INTEGER NOT NULL,
            cursor TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (dataset, owner_kind, owner_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_scheduled_tasks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scheduled_tasks (
            task_id TEXT PRIMARY KEY,
            time_to_run TEXT NOT NULL,
            anchor_time TEXT,
            task_type TEXT NOT NULL,
            recurrence TEXT NOT NULL,
            parameters TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_institutions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS institutions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            scopus_afid TEXT UNIQUE,
            open_alex_id TEXT UNIQUE,
            ror TEXT UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_persons_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS persons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            middle_name TEXT,
            last_name TEXT NOT NULL,
            scopus_author_id TEXT UNIQUE,
            open_alex_id TEXT UNIQUE,
            orcid TEXT UNIQUE,
            web_of_science_id TEXT UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_journals_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS journals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            e_issn TEXT,
            print_issn TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_journals_e_issn ON journals(e_issn)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_journals_print_issn ON journals(print_issn)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL,
            date_from TEXT,
            date_to TEXT,
            place TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_name_key ON events(name_key)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_users_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            scopus_author_id TEXT,
            open_alex_id TEXT,
            orcid TEXT,
            web_of_science_id TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_employments (
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            institution_id INTEGER NOT NULL,
            PRIMARY KEY (user_id, institution_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, MAX_LOCK_WAIT_SETTING, "5000").await?;
    ensure_setting(pool, LOCK_RETRY_SETTING, "250").await?;

    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE tolerates concurrent initialization
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
