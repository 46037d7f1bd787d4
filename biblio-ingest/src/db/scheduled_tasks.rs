//! Persisted scheduled-task metadata
//!
//! `{taskId, timeToRun, taskType, recurrence, parameters}` rows written when a
//! task is registered and read back at startup by the restorer. `anchor_time`
//! is the first run of a recurring task, which later runs are counted from.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use biblio_common::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTaskRow {
    pub task_id: String,
    pub time_to_run: DateTime<Utc>,
    pub anchor_time: DateTime<Utc>,
    pub task_type: String,
    pub recurrence: String,
    pub parameters: Value,
}

pub async fn insert_task(pool: &SqlitePool, task: &ScheduledTaskRow) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO scheduled_tasks (task_id, time_to_run, anchor_time, task_type, recurrence, parameters)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(task_id) DO UPDATE SET
            time_to_run = excluded.time_to_run,
            anchor_time = excluded.anchor_time,
            recurrence = excluded.recurrence,
            parameters = excluded.parameters
        "#,
    )
    .bind(&task.task_id)
    .bind(task.time_to_run.to_rfc3339())
    .bind(task.anchor_time.to_rfc3339())
    .bind(&task.task_type)
    .bind(&task.recurrence)
    .bind(task.parameters.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Tasks whose type is one of `task_types`, oldest run time first
pub async fn list_tasks_by_type(pool: &SqlitePool, task_types: &[&str]) -> Result<Vec<ScheduledTaskRow>> {
    if task_types.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; task_types.len()].join(", ");
    let sql = format!(
        "SELECT task_id, time_to_run, anchor_time, task_type, recurrence, parameters
           FROM scheduled_tasks WHERE task_type IN ({}) ORDER BY time_to_run, task_id",
        placeholders
    );
    let mut query = sqlx::query(&sql);
    for task_type in task_types {
        query = query.bind(*task_type);
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter()
        .map(|row| -> Result<ScheduledTaskRow> {
            let task_id: String = row.get("task_id");
            let parse_time = |value: &str| {
                biblio_common::time::parse_rfc3339(value).map_err(|e| {
                    Error::Internal(format!("Task {} has invalid run time: {}", task_id, e))
                })
            };
            let time_to_run = parse_time(&row.get::<String, _>("time_to_run"))?;
            let anchor_time = match row.get::<Option<String>, _>("anchor_time") {
                Some(anchor) => parse_time(&anchor)?,
                None => time_to_run,
            };
            let parameters: String = row.get("parameters");
            Ok(ScheduledTaskRow {
                time_to_run,
                anchor_time,
                task_type: row.get("task_type"),
                recurrence: row.get("recurrence"),
                parameters: serde_json::from_str(&parameters)?,
                task_id,
            })
        })
        .collect()
}

pub async fn delete_task(pool: &SqlitePool, task_id: &str) -> Result<bool> {
    let deleted = sqlx::query("DELETE FROM scheduled_tasks WHERE task_id = ?")
        .bind(task_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(deleted > 0)
}
