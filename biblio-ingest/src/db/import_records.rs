//! Import record persistence
//!
//! Each record is stored as its full JSON document plus the columns the
//! pipeline queries on (DOI, metadata key, year, loaded flag) and a JSON
//! embedding vector. Owners live in `import_record_owners`; on read they
//! replace whatever owner sets the document carries.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use biblio_common::{Error, Result};

use crate::models::{ImportRecord, Owner};

const SELECT_RECORD: &str = r#"
    SELECT r.identifier, r.document, r.embedding, r.loaded,
           (SELECT group_concat(o.owner_kind || ':' || o.owner_id, ',')
              FROM import_record_owners o
             WHERE o.identifier = r.identifier) AS owners
      FROM import_records r
"#;

fn record_from_row(row: &SqliteRow) -> Result<ImportRecord> {
    let document: String = row.get("document");
    let mut record: ImportRecord = serde_json::from_str(&document)?;

    record.loaded = row.get::<i64, _>("loaded") != 0;
    record.embedding = row
        .get::<Option<String>, _>("embedding")
        .map(|json| serde_json::from_str::<Vec<f32>>(&json))
        .transpose()?;

    record.import_users_id.clear();
    record.import_institutions_id.clear();
    let owners: Option<String> = row.get("owners");
    for entry in owners.iter().flat_map(|o| o.split(',')) {
        let owner = entry
            .split_once(':')
            .and_then(|(kind, id)| Owner::from_parts(kind, id.parse().ok()?));
        match owner {
            Some(owner) => record.add_owner(owner),
            None => {
                return Err(Error::Internal(format!(
                    "Corrupt owner entry '{}' on record {}",
                    entry, record.identifier
                )))
            }
        }
    }

    Ok(record)
}

fn embedding_json(record: &ImportRecord) -> Result<Option<String>> {
    Ok(record
        .embedding
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?)
}

async fn insert_owners(
    tx: &mut Transaction<'_, Sqlite>,
    identifier: &str,
    owners: &[Owner],
) -> Result<()> {
    for owner in owners {
        if matches!(owner, Owner::System) {
            continue;
        }
        sqlx::query(
            "INSERT OR IGNORE INTO import_record_owners (identifier, owner_kind, owner_id) VALUES (?, ?, ?)",
        )
        .bind(identifier)
        .bind(owner.kind())
        .bind(owner.id())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Insert a new unloaded record
///
/// Returns `false` without touching anything when the identifier already
/// exists, so concurrent harvests of the same item store it once.
pub async fn insert_record(pool: &SqlitePool, record: &ImportRecord) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO import_records (
            identifier, source, publication_type, doi, metadata_key, publication_year,
            loaded, document, embedding
        ) VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
        ON CONFLICT(identifier) DO NOTHING
        "#,
    )
    .bind(&record.identifier)
    .bind(record.source.as_str())
    .bind(record.publication_type.as_str())
    .bind(&record.doi)
    .bind(record.metadata_key())
    .bind(record.publication_year())
    .bind(serde_json::to_string(record)?)
    .bind(embedding_json(record)?)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        == 1;

    if inserted {
        insert_owners(&mut tx, &record.identifier, &record.owners()).await?;
    }
    tx.commit().await?;

    Ok(inserted)
}

/// Rewrite an unloaded record after a merge and union its owners
///
/// Loaded records are immutable: returns `false` and writes nothing when the
/// record is missing or was loaded since it was read.
pub async fn update_record(pool: &SqlitePool, record: &ImportRecord) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE import_records
           SET publication_type = ?, doi = ?, metadata_key = ?, publication_year = ?,
               document = ?, embedding = COALESCE(?, embedding), updated_at = CURRENT_TIMESTAMP
         WHERE identifier = ? AND loaded = 0
        "#,
    )
    .bind(record.publication_type.as_str())
    .bind(&record.doi)
    .bind(record.metadata_key())
    .bind(record.publication_year())
    .bind(serde_json::to_string(record)?)
    .bind(embedding_json(record)?)
    .bind(&record.identifier)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    insert_owners(&mut tx, &record.identifier, &record.owners()).await?;
    tx.commit().await?;

    Ok(true)
}

/// Add owners to an existing record (re-harvest by another requester)
pub async fn add_owners(pool: &SqlitePool, identifier: &str, owners: &[Owner]) -> Result<()> {
    let mut tx = pool.begin().await?;
    insert_owners(&mut tx, identifier, owners).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn find_by_identifier(pool: &SqlitePool, identifier: &str) -> Result<Option<ImportRecord>> {
    let sql = format!("{} WHERE r.identifier = ?", SELECT_RECORD);
    let row = sqlx::query(&sql).bind(identifier).fetch_optional(pool).await?;
    row.as_ref().map(record_from_row).transpose()
}

/// Stored record sharing the DOI, else the metadata key
///
/// A DOI match wins over a metadata-key match.
pub async fn find_merge_candidate(
    pool: &SqlitePool,
    doi: Option<&str>,
    metadata_key: Option<&str>,
) -> Result<Option<ImportRecord>> {
    if let Some(doi) = doi {
        let sql = format!("{} WHERE r.doi = ? ORDER BY r.created_at, r.identifier LIMIT 1", SELECT_RECORD);
        if let Some(row) = sqlx::query(&sql).bind(doi).fetch_optional(pool).await? {
            return record_from_row(&row).map(Some);
        }
    }
    if let Some(key) = metadata_key {
        let sql = format!(
            "{} WHERE r.metadata_key = ? ORDER BY r.created_at, r.identifier LIMIT 1",
            SELECT_RECORD
        );
        if let Some(row) = sqlx::query(&sql).bind(key).fetch_optional(pool).await? {
            return record_from_row(&row).map(Some);
        }
    }
    Ok(None)
}

/// Stored embeddings to compare a new record against
///
/// Same publication year when known, otherwise any year; at most `limit` rows.
pub async fn similarity_candidates(
    pool: &SqlitePool,
    year: Option<i32>,
    limit: i64,
) -> Result<Vec<(String, Vec<f32>)>> {
    let rows = match year {
        Some(year) => {
            sqlx::query(
                "SELECT identifier, embedding FROM import_records
                  WHERE embedding IS NOT NULL AND publication_year = ?
                  ORDER BY identifier LIMIT ?",
            )
            .bind(year)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT identifier, embedding FROM import_records
                  WHERE embedding IS NOT NULL
                  ORDER BY identifier LIMIT ?",
            )
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    rows.iter()
        .map(|row| -> Result<(String, Vec<f32>)> {
            let identifier: String = row.get("identifier");
            let embedding: String = row.get("embedding");
            Ok((identifier, serde_json::from_str(&embedding)?))
        })
        .collect()
}

/// Owner filter shared by the loader queries; `System` sees everything
fn owner_clause(owner: &Owner) -> &'static str {
    match owner {
        Owner::System => "1 = 1",
        _ => "EXISTS (SELECT 1 FROM import_record_owners o
                       WHERE o.identifier = r.identifier AND o.owner_kind = ? AND o.owner_id = ?)",
    }
}

/// First unloaded record visible to `owner` at or after `from`
///
/// `inclusive = false` starts strictly after `from`.
pub async fn next_unloaded(
    pool: &SqlitePool,
    owner: &Owner,
    from: Option<&str>,
    inclusive: bool,
) -> Result<Option<ImportRecord>> {
    let comparison = if inclusive { ">=" } else { ">" };
    let sql = format!(
        "{} WHERE r.loaded = 0 AND r.identifier {} ? AND {} ORDER BY r.identifier LIMIT 1",
        SELECT_RECORD,
        comparison,
        owner_clause(owner)
    );
    let mut query = sqlx::query(&sql).bind(from.unwrap_or(""));
    if !matches!(owner, Owner::System) {
        query = query.bind(owner.kind()).bind(owner.id());
    }
    let row = query.fetch_optional(pool).await?;
    row.as_ref().map(record_from_row).transpose()
}

/// Flip `loaded` on an unloaded record; `false` when nothing was flipped
pub async fn mark_loaded(pool: &SqlitePool, identifier: &str) -> Result<bool> {
    let flipped = sqlx::query(
        "UPDATE import_records SET loaded = 1, updated_at = CURRENT_TIMESTAMP
          WHERE identifier = ? AND loaded = 0",
    )
    .bind(identifier)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(flipped == 1)
}

/// Unloaded records visible to `owner`
pub async fn count_unloaded(pool: &SqlitePool, owner: &Owner) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) AS remaining FROM import_records r WHERE r.loaded = 0 AND {}",
        owner_clause(owner)
    );
    let mut query = sqlx::query(&sql);
    if !matches!(owner, Owner::System) {
        query = query.bind(owner.kind()).bind(owner.id());
    }
    Ok(query.fetch_one(pool).await?.get("remaining"))
}
