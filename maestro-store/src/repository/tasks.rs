//! Task executions repository
//!
//! Rows are keyed by `(ExecutionId, TaskId)`. The lifecycle writes are split
//! into the exact updates the task runner performs: pre-registration,
//! dispatch, live state, retry bump, terminal success/failure.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use maestro_core::domain::{TaskExecutionRecord, TaskStatus, TriggerType};
use maestro_core::params::Params;

use crate::contract::{Filter, Row, Store, Table};
use crate::error::Result;

use super::{instant, int, iso, json_map, opt_int, opt_iso, opt_text, text};

fn key(execution_id: Uuid, task_id: &str) -> Filter {
    Filter::new()
        .eq("ExecutionId", execution_id.to_string())
        .eq("TaskId", task_id)
}

pub fn to_row(record: &TaskExecutionRecord) -> Result<Row> {
    let mut row = Row::new();
    row.insert(
        "ExecutionId".into(),
        Value::String(record.execution_id.to_string()),
    );
    row.insert("TaskId".into(), Value::String(record.task_id.clone()));
    row.insert("JobName".into(), Value::String(record.job_name.clone()));
    row.insert("WorkflowName".into(), opt_text(&record.workflow_name));
    row.insert(
        "TriggerType".into(),
        Value::String(record.trigger_type.label()),
    );
    row.insert("InputData".into(), serialize_map(&record.input_data)?);
    row.insert("OutputData".into(), serialize_map(&record.output_data)?);
    row.insert("ExecutionLog".into(), opt_text(&record.execution_log));
    row.insert("ErrorLog".into(), opt_text(&record.error_log));
    row.insert("Status".into(), Value::String(record.status.as_str().into()));
    row.insert("State".into(), Value::String(record.state.clone()));
    row.insert("StartedAt".into(), opt_iso(&record.started_at));
    row.insert("EndedAt".into(), opt_iso(&record.ended_at));
    row.insert("RuntimeMs".into(), opt_int(&record.runtime_ms));
    row.insert("ExitCode".into(), opt_int(&record.exit_code));
    row.insert("Attempt".into(), Value::from(record.attempt));
    row.insert("MaxRetries".into(), Value::from(record.max_retries));
    Ok(row)
}

fn serialize_map(map: &Option<Params>) -> Result<Value> {
    Ok(match map {
        Some(map) => Value::String(serde_json::to_string(map)?),
        None => Value::Null,
    })
}

pub fn from_row(row: &Row) -> TaskExecutionRecord {
    TaskExecutionRecord {
        execution_id: text(row, "ExecutionId")
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .unwrap_or(Uuid::nil()),
        task_id: text(row, "TaskId").unwrap_or_default(),
        job_name: text(row, "JobName").unwrap_or_default(),
        workflow_name: text(row, "WorkflowName"),
        trigger_type: TriggerType::parse(&text(row, "TriggerType").unwrap_or_default()),
        input_data: json_map(row, "InputData"),
        output_data: json_map(row, "OutputData"),
        execution_log: text(row, "ExecutionLog"),
        error_log: text(row, "ErrorLog"),
        status: TaskStatus::parse(&text(row, "Status").unwrap_or_default()),
        state: text(row, "State").unwrap_or_default(),
        started_at: instant(row, "StartedAt"),
        ended_at: instant(row, "EndedAt"),
        runtime_ms: int(row, "RuntimeMs"),
        exit_code: int(row, "ExitCode"),
        attempt: int(row, "Attempt").unwrap_or(0),
        max_retries: int(row, "MaxRetries").unwrap_or(0),
    }
}

pub async fn exists(store: &dyn Store, execution_id: Uuid, task_id: &str) -> Result<bool> {
    store
        .exists(Table::TaskExecutions, &key(execution_id, task_id))
        .await
}

/// Pre-register a step as `Waiting` unless a row for the key already exists.
pub async fn insert_waiting(store: &dyn Store, record: &TaskExecutionRecord) -> Result<()> {
    if exists(store, record.execution_id, &record.task_id).await? {
        return Ok(());
    }
    store.insert(Table::TaskExecutions, to_row(record)?).await
}

/// Move a step to `Running` at dispatch time.
///
/// Updates the pre-registered row when one exists (the workflow/job path),
/// otherwise inserts a fresh one (the standalone task path).
pub async fn upsert_dispatch(store: &dyn Store, record: &TaskExecutionRecord) -> Result<()> {
    if exists(store, record.execution_id, &record.task_id).await? {
        let mut set = Row::new();
        set.insert("Status".into(), Value::String(record.status.as_str().into()));
        set.insert("State".into(), Value::String(record.state.clone()));
        set.insert("StartedAt".into(), opt_iso(&record.started_at));
        set.insert("InputData".into(), serialize_map(&record.input_data)?);
        set.insert("Attempt".into(), Value::from(record.attempt));
        set.insert("MaxRetries".into(), Value::from(record.max_retries));
        store
            .update(
                Table::TaskExecutions,
                &key(record.execution_id, &record.task_id),
                set,
            )
            .await?;
        Ok(())
    } else {
        store.insert(Table::TaskExecutions, to_row(record)?).await
    }
}

/// Live-progress write for the `STATE:` channel and `Waiting for:` updates.
pub async fn update_state(
    store: &dyn Store,
    execution_id: Uuid,
    task_id: &str,
    state: &str,
) -> Result<()> {
    let mut set = Row::new();
    set.insert("State".into(), Value::String(state.to_string()));
    store
        .update(Table::TaskExecutions, &key(execution_id, task_id), set)
        .await?;
    Ok(())
}

/// Bump the attempt counter before a retry sleep.
pub async fn mark_retrying(
    store: &dyn Store,
    execution_id: Uuid,
    task_id: &str,
    attempt: i64,
    max_attempts: i64,
) -> Result<()> {
    let mut set = Row::new();
    set.insert(
        "State".into(),
        Value::String(format!("Retrying ({}/{})", attempt, max_attempts)),
    );
    set.insert("Attempt".into(), Value::from(attempt));
    store
        .update(Table::TaskExecutions, &key(execution_id, task_id), set)
        .await?;
    Ok(())
}

/// Terminal update for a successful run.
#[allow(clippy::too_many_arguments)]
pub async fn finish_success(
    store: &dyn Store,
    execution_id: Uuid,
    task_id: &str,
    state: &str,
    ended_at: DateTime<Utc>,
    runtime_ms: i64,
    execution_log: &str,
    output_data: &Params,
) -> Result<()> {
    let mut set = Row::new();
    set.insert(
        "Status".into(),
        Value::String(TaskStatus::Completed.as_str().into()),
    );
    set.insert("State".into(), Value::String(state.to_string()));
    set.insert("ExitCode".into(), Value::from(0));
    set.insert("EndedAt".into(), iso(&ended_at));
    set.insert("RuntimeMs".into(), Value::from(runtime_ms));
    set.insert(
        "ExecutionLog".into(),
        Value::String(execution_log.to_string()),
    );
    set.insert(
        "OutputData".into(),
        Value::String(serde_json::to_string(output_data)?),
    );
    store
        .update(Table::TaskExecutions, &key(execution_id, task_id), set)
        .await?;
    Ok(())
}

/// Terminal update for a failed run.
pub async fn finish_failure(
    store: &dyn Store,
    execution_id: Uuid,
    task_id: &str,
    error_log: &str,
    ended_at: DateTime<Utc>,
    runtime_ms: i64,
    exit_code: i64,
) -> Result<()> {
    let mut set = Row::new();
    set.insert(
        "Status".into(),
        Value::String(TaskStatus::Failed.as_str().into()),
    );
    set.insert("ErrorLog".into(), Value::String(error_log.to_string()));
    set.insert("EndedAt".into(), iso(&ended_at));
    set.insert("RuntimeMs".into(), Value::from(runtime_ms));
    set.insert("ExitCode".into(), Value::from(exit_code));
    store
        .update(Table::TaskExecutions, &key(execution_id, task_id), set)
        .await?;
    Ok(())
}

pub async fn get(
    store: &dyn Store,
    execution_id: Uuid,
    task_id: &str,
) -> Result<Option<TaskExecutionRecord>> {
    let rows = store
        .query(Table::TaskExecutions, &key(execution_id, task_id), None)
        .await?;
    Ok(rows.first().map(from_row))
}

pub async fn by_execution(
    store: &dyn Store,
    execution_id: Uuid,
) -> Result<Vec<TaskExecutionRecord>> {
    let rows = store
        .query(
            Table::TaskExecutions,
            &Filter::new().eq("ExecutionId", execution_id.to_string()),
            None,
        )
        .await?;
    Ok(rows.iter().map(from_row).collect())
}

pub async fn all(store: &dyn Store) -> Result<Vec<TaskExecutionRecord>> {
    let rows = store
        .query(Table::TaskExecutions, &Filter::new(), None)
        .await?;
    Ok(rows.iter().map(from_row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileStore;

    #[tokio::test]
    async fn test_insert_waiting_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("data.json"));
        let execution_id = Uuid::new_v4();

        let record = TaskExecutionRecord::waiting(
            execution_id,
            "extract",
            "etl",
            Some("daily".into()),
            TriggerType::Manual,
        );

        insert_waiting(&store, &record).await.unwrap();
        insert_waiting(&store, &record).await.unwrap();

        let rows = by_execution(&store, execution_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TaskStatus::Waiting);
        assert_eq!(rows[0].state, "Waiting");
    }

    #[tokio::test]
    async fn test_upsert_dispatch_updates_preregistered_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("data.json"));
        let execution_id = Uuid::new_v4();

        let waiting = TaskExecutionRecord::waiting(
            execution_id,
            "extract",
            "etl",
            None,
            TriggerType::Manual,
        );
        insert_waiting(&store, &waiting).await.unwrap();

        let mut running = waiting.clone();
        running.status = TaskStatus::Running;
        running.state = "Running".into();
        running.started_at = Some(Utc::now());
        running.attempt = 1;
        running.max_retries = 2;
        upsert_dispatch(&store, &running).await.unwrap();

        let rows = by_execution(&store, execution_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TaskStatus::Running);
        assert_eq!(rows[0].attempt, 1);
        assert_eq!(rows[0].max_retries, 2);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("data.json"));
        let execution_id = Uuid::new_v4();

        let mut record = TaskExecutionRecord::waiting(
            execution_id,
            "load",
            "etl",
            None,
            TriggerType::InvokedBy("etl".into()),
        );
        let mut input = Params::new();
        input.insert("rows".into(), serde_json::json!(10));
        record.input_data = Some(input);
        store
            .insert(Table::TaskExecutions, to_row(&record).unwrap())
            .await
            .unwrap();

        let restored = get(&store, execution_id, "load").await.unwrap().unwrap();
        assert_eq!(restored.trigger_type, record.trigger_type);
        assert_eq!(
            restored.input_data.unwrap()["rows"],
            serde_json::json!(10)
        );
    }
}
