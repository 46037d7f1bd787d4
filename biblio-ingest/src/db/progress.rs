//! Progress store
//!
//! One cursor per (dataset, owner). Harvests store resumption tokens or
//! `page:pageSize` pairs; the loader wizard stores the identifier of the
//! record under review.
//!
//! `set` deletes then inserts inside one transaction instead of updating
//! in place, so a harvest writing its cursor and an operator resetting
//! the same key never interleave into a stale row.

use sqlx::{Row, SqlitePool};
use biblio_common::Result;

use crate::models::{DatasetKey, Owner};

#[derive(Clone)]
pub struct ProgressStore {
    pool: SqlitePool,
}

impl ProgressStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, dataset: &DatasetKey, owner: &Owner) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT cursor FROM loading_progress WHERE dataset = ? AND owner_kind = ? AND owner_id = ?",
        )
        .bind(dataset.as_str())
        .bind(owner.kind())
        .bind(owner.id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("cursor")))
    }

    pub async fn set(&self, dataset: &DatasetKey, owner: &Owner, cursor: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM loading_progress WHERE dataset = ? AND owner_kind = ? AND owner_id = ?")
            .bind(dataset.as_str())
            .bind(owner.kind())
            .bind(owner.id())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO loading_progress (dataset, owner_kind, owner_id, cursor) VALUES (?, ?, ?, ?)",
        )
        .bind(dataset.as_str())
        .bind(owner.kind())
        .bind(owner.id())
        .bind(cursor)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(dataset = %dataset, owner = %owner, cursor, "Progress cursor stored");
        Ok(())
    }

    pub async fn clear(&self, dataset: &DatasetKey, owner: &Owner) -> Result<()> {
        sqlx::query("DELETE FROM loading_progress WHERE dataset = ? AND owner_kind = ? AND owner_id = ?")
            .bind(dataset.as_str())
            .bind(owner.kind())
            .bind(owner.id())
            .execute(&self.pool)
            .await?;

        tracing::debug!(dataset = %dataset, owner = %owner, "Progress cursor cleared");
        Ok(())
    }
}
