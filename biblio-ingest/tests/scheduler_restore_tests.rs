//! Scheduled harvest persistence and startup restore

mod helpers;

use async_trait::async_trait;
use biblio_ingest::db::scheduled_tasks::{self, ScheduledTaskRow};
use biblio_ingest::services::{
    Recurrence, ScheduledHarvestRestorer, ScheduledTask, Scheduler, TaskRunner, TokioScheduler,
    HARVEST_TASK_TYPE,
};
use chrono::{Duration as ChronoDuration, Utc};
use helpers::create_test_db;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records the parameters of every run
#[derive(Default)]
struct RecordingRunner {
    runs: Mutex<Vec<Value>>,
}

#[async_trait]
impl TaskRunner for RecordingRunner {
    async fn run_task(&self, parameters: &Value) -> anyhow::Result<()> {
        self.runs.lock().unwrap().push(parameters.clone());
        Ok(())
    }
}

fn harvest_scheduler(pool: &SqlitePool, runner: Arc<RecordingRunner>) -> TokioScheduler {
    let mut runners: HashMap<String, Arc<dyn TaskRunner>> = HashMap::new();
    runners.insert(HARVEST_TASK_TYPE.to_string(), runner);
    TokioScheduler::new(pool.clone(), runners)
}

fn harvest_parameters() -> Value {
    json!({ "source": "OAI_PMH", "endpoint": "repo", "dataset": "theses" })
}

async fn persisted(pool: &SqlitePool) -> Vec<ScheduledTaskRow> {
    scheduled_tasks::list_tasks_by_type(pool, &[HARVEST_TASK_TYPE]).await.unwrap()
}

#[tokio::test]
async fn test_restore_reschedules_and_replaces_row() {
    let pool = create_test_db().await;
    let time_to_run = Utc::now() + ChronoDuration::hours(1);
    scheduled_tasks::insert_task(
        &pool,
        &ScheduledTaskRow {
            task_id: "before-restart".to_string(),
            time_to_run,
            anchor_time: time_to_run - ChronoDuration::weeks(3),
            task_type: HARVEST_TASK_TYPE.to_string(),
            recurrence: "WEEKLY".to_string(),
            parameters: harvest_parameters(),
        },
    )
    .await
    .unwrap();

    let scheduler = harvest_scheduler(&pool, Arc::new(RecordingRunner::default()));
    let restored = ScheduledHarvestRestorer::new(pool.clone(), Arc::new(scheduler.clone()))
        .restore()
        .await
        .unwrap();
    scheduler.shutdown();

    assert_eq!(restored, 1);
    let rows = persisted(&pool).await;
    assert_eq!(rows.len(), 1);
    assert_ne!(rows[0].task_id, "before-restart");
    assert_eq!(rows[0].recurrence, "WEEKLY");
    assert_eq!(rows[0].parameters, harvest_parameters());
    assert_eq!(rows[0].time_to_run.timestamp(), time_to_run.timestamp());
    assert_eq!(
        rows[0].anchor_time.timestamp(),
        (time_to_run - ChronoDuration::weeks(3)).timestamp()
    );
}

#[tokio::test]
async fn test_repeated_restarts_do_not_accumulate_rows() {
    let pool = create_test_db().await;
    let scheduler = harvest_scheduler(&pool, Arc::new(RecordingRunner::default()));
    scheduler
        .schedule(
            ScheduledTask::new(HARVEST_TASK_TYPE, harvest_parameters()),
            Utc::now() + ChronoDuration::days(1),
            Recurrence::Daily,
        )
        .await
        .unwrap();
    scheduler.shutdown();

    for _ in 0..3 {
        let restarted = harvest_scheduler(&pool, Arc::new(RecordingRunner::default()));
        ScheduledHarvestRestorer::new(pool.clone(), Arc::new(restarted.clone()))
            .restore()
            .await
            .unwrap();
        restarted.shutdown();
    }

    assert_eq!(persisted(&pool).await.len(), 1);
}

#[tokio::test]
async fn test_unrestorable_row_is_kept() {
    let pool = create_test_db().await;
    scheduled_tasks::insert_task(
        &pool,
        &ScheduledTaskRow {
            task_id: "odd".to_string(),
            time_to_run: Utc::now(),
            anchor_time: Utc::now(),
            task_type: HARVEST_TASK_TYPE.to_string(),
            recurrence: "HOURLY".to_string(),
            parameters: harvest_parameters(),
        },
    )
    .await
    .unwrap();

    let scheduler = harvest_scheduler(&pool, Arc::new(RecordingRunner::default()));
    let restored = ScheduledHarvestRestorer::new(pool.clone(), Arc::new(scheduler.clone()))
        .restore()
        .await
        .unwrap();
    scheduler.shutdown();

    assert_eq!(restored, 0);
    let rows = persisted(&pool).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].task_id, "odd");
}

#[tokio::test]
async fn test_due_one_shot_task_runs_and_is_removed() {
    let pool = create_test_db().await;
    let runner = Arc::new(RecordingRunner::default());
    let scheduler = harvest_scheduler(&pool, Arc::clone(&runner));

    scheduler
        .schedule(
            ScheduledTask::new(HARVEST_TASK_TYPE, harvest_parameters()),
            Utc::now() - ChronoDuration::seconds(1),
            Recurrence::Once,
        )
        .await
        .unwrap();

    let mut remaining = persisted(&pool).await.len();
    for _ in 0..100 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        remaining = persisted(&pool).await.len();
    }

    assert_eq!(remaining, 0);
    assert_eq!(runner.runs.lock().unwrap().as_slice(), &[harvest_parameters()]);
}

#[tokio::test]
async fn test_unknown_task_type_is_rejected() {
    let pool = create_test_db().await;
    let scheduler = harvest_scheduler(&pool, Arc::new(RecordingRunner::default()));

    let result = scheduler
        .schedule(
            ScheduledTask::new("REINDEX", json!({})),
            Utc::now(),
            Recurrence::Once,
        )
        .await;

    assert!(matches!(result, Err(biblio_common::Error::InvalidInput(_))));
    assert!(persisted(&pool).await.is_empty());
}
