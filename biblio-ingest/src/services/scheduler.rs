//! Task scheduling and startup restore
//!
//! [`TokioScheduler`] persists every registered task, sleeps on a tokio task
//! until it is due, runs it, and for recurring tasks re-persists the next
//! run time. Recurring run times are counted from the first run (the
//! anchor), so a monthly task set for the 31st comes back to the 31st after
//! shorter months. [`ScheduledHarvestRestorer`] runs once at startup: every
//! persisted harvest row is scheduled again and the old row deleted, so
//! restarts neither drop recurring harvests nor accumulate rows.

use async_trait::async_trait;
use biblio_common::{Error, Result};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Months, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::scheduled_tasks::{self, ScheduledTaskRow};

/// Task type of scheduled harvests
pub const HARVEST_TASK_TYPE: &str = "HARVEST";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recurrence {
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Once => "ONCE",
            Recurrence::Daily => "DAILY",
            Recurrence::Weekly => "WEEKLY",
            Recurrence::Monthly => "MONTHLY",
        }
    }

    /// First run strictly after `after`, counting whole periods from `anchor`
    ///
    /// `None` for one-shot tasks. Monthly runs clamp to the last day of
    /// shorter months without moving the anchor day.
    pub fn next_after(&self, anchor: DateTime<Utc>, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let period = match self {
            Recurrence::Once => return None,
            Recurrence::Daily => ChronoDuration::days(1),
            Recurrence::Weekly => ChronoDuration::weeks(1),
            Recurrence::Monthly => return next_month_after(anchor, after),
        };
        let elapsed = (after - anchor).num_seconds();
        let periods = if elapsed < 0 { 1 } else { elapsed / period.num_seconds() + 1 };
        anchor.checked_add_signed(ChronoDuration::seconds(period.num_seconds().checked_mul(periods)?))
    }
}

fn next_month_after(anchor: DateTime<Utc>, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let elapsed = (after.year() - anchor.year()) * 12 + after.month() as i32 - anchor.month() as i32;
    // One month early so month-end clamping cannot skip an occurrence
    let mut months = u32::try_from(elapsed - 1).unwrap_or(0).max(1);
    loop {
        let candidate = anchor.checked_add_months(Months::new(months))?;
        if candidate > after {
            return Some(candidate);
        }
        months += 1;
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ONCE" => Ok(Recurrence::Once),
            "DAILY" => Ok(Recurrence::Daily),
            "WEEKLY" => Ok(Recurrence::Weekly),
            "MONTHLY" => Ok(Recurrence::Monthly),
            other => Err(Error::InvalidInput(format!("Unknown recurrence: {}", other))),
        }
    }
}

/// What to run
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub task_type: String,
    pub parameters: Value,
    /// First run of a recurring task; the scheduled time when absent
    pub anchor: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    pub fn new(task_type: impl Into<String>, parameters: Value) -> Self {
        Self {
            task_type: task_type.into(),
            parameters,
            anchor: None,
        }
    }

    pub fn with_anchor(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Register `task` to run at `time`, repeating per `recurrence`; returns the task id
    async fn schedule(&self, task: ScheduledTask, time: DateTime<Utc>, recurrence: Recurrence) -> Result<String>;
}

/// Executes one task type
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, parameters: &Value) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct TokioScheduler {
    pool: SqlitePool,
    runners: Arc<HashMap<String, Arc<dyn TaskRunner>>>,
    shutdown: CancellationToken,
}

impl TokioScheduler {
    pub fn new(pool: SqlitePool, runners: HashMap<String, Arc<dyn TaskRunner>>) -> Self {
        Self {
            pool,
            runners: Arc::new(runners),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop every pending task; persisted rows stay for the next restore
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn drive(self, task_id: String, task: ScheduledTask, mut time: DateTime<Utc>, recurrence: Recurrence) {
        let Some(runner) = self.runners.get(&task.task_type).cloned() else {
            error!(task_id = %task_id, task_type = %task.task_type, "No runner for task type");
            return;
        };
        let anchor = task.anchor.unwrap_or(time);

        loop {
            let wait = (time - Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }

            info!(task_id = %task_id, task_type = %task.task_type, "Running scheduled task");
            if let Err(e) = runner.run_task(&task.parameters).await {
                warn!(task_id = %task_id, error = %e, "Scheduled task failed");
            }

            let Some(next) = recurrence.next_after(anchor, time.max(Utc::now())) else {
                if let Err(e) = scheduled_tasks::delete_task(&self.pool, &task_id).await {
                    warn!(task_id = %task_id, error = %e, "Could not delete finished task");
                }
                return;
            };
            time = next;

            let row = ScheduledTaskRow {
                task_id: task_id.clone(),
                time_to_run: time,
                anchor_time: anchor,
                task_type: task.task_type.clone(),
                recurrence: recurrence.as_str().to_string(),
                parameters: task.parameters.clone(),
            };
            if let Err(e) = scheduled_tasks::insert_task(&self.pool, &row).await {
                warn!(task_id = %task_id, error = %e, "Could not persist next run");
            }
        }
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn schedule(&self, task: ScheduledTask, time: DateTime<Utc>, recurrence: Recurrence) -> Result<String> {
        if !self.runners.contains_key(&task.task_type) {
            return Err(Error::InvalidInput(format!("Unknown task type: {}", task.task_type)));
        }

        let task_id = Uuid::new_v4().to_string();
        scheduled_tasks::insert_task(
            &self.pool,
            &ScheduledTaskRow {
                task_id: task_id.clone(),
                time_to_run: time,
                anchor_time: task.anchor.unwrap_or(time),
                task_type: task.task_type.clone(),
                recurrence: recurrence.as_str().to_string(),
                parameters: task.parameters.clone(),
            },
        )
        .await?;

        info!(task_id = %task_id, task_type = %task.task_type, time = %time, recurrence = %recurrence, "Task scheduled");
        tokio::spawn(self.clone().drive(task_id.clone(), task, time, recurrence));
        Ok(task_id)
    }
}

/// Re-registers persisted harvest tasks at startup
pub struct ScheduledHarvestRestorer {
    pool: SqlitePool,
    scheduler: Arc<dyn Scheduler>,
}

impl ScheduledHarvestRestorer {
    pub fn new(pool: SqlitePool, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { pool, scheduler }
    }

    /// Returns how many tasks were restored
    ///
    /// A row that fails to re-register is kept for the next start.
    pub async fn restore(&self) -> Result<usize> {
        let rows = scheduled_tasks::list_tasks_by_type(&self.pool, &[HARVEST_TASK_TYPE]).await?;
        let mut restored = 0;

        for row in rows {
            let recurrence = match row.recurrence.parse::<Recurrence>() {
                Ok(recurrence) => recurrence,
                Err(e) => {
                    warn!(task_id = %row.task_id, error = %e, "Skipping task with bad recurrence");
                    continue;
                }
            };

            let task = ScheduledTask::new(row.task_type.clone(), row.parameters.clone())
                .with_anchor(row.anchor_time);
            match self.scheduler.schedule(task, row.time_to_run, recurrence).await {
                Ok(new_id) => {
                    if new_id != row.task_id {
                        scheduled_tasks::delete_task(&self.pool, &row.task_id).await?;
                    }
                    restored += 1;
                    info!(old_task_id = %row.task_id, task_id = %new_id, "Scheduled harvest restored");
                }
                Err(e) => {
                    warn!(task_id = %row.task_id, error = %e, "Could not restore scheduled harvest");
                }
            }
        }

        Ok(restored)
    }
}
