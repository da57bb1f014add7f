//! Workflows repository

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use maestro_core::domain::{ExecutionStatus, TriggerType, WorkflowRecord};

use crate::contract::{Filter, Row, Store, Table};
use crate::error::Result;

use super::{instant, int, iso, opt_int, opt_iso, text};

pub fn to_row(record: &WorkflowRecord) -> Row {
    let mut row = Row::new();
    row.insert(
        "WorkflowId".into(),
        Value::String(record.workflow_id.to_string()),
    );
    row.insert("JobName".into(), Value::String(record.job_name.clone()));
    row.insert("Name".into(), Value::String(record.name.clone()));
    row.insert("Status".into(), Value::String(record.status.as_str().into()));
    row.insert("StartedAt".into(), iso(&record.started_at));
    row.insert("EndedAt".into(), opt_iso(&record.ended_at));
    row.insert("RuntimeMs".into(), opt_int(&record.runtime_ms));
    row.insert(
        "TriggerType".into(),
        Value::String(record.trigger_type.label()),
    );
    row
}

pub fn from_row(row: &Row) -> WorkflowRecord {
    WorkflowRecord {
        workflow_id: text(row, "WorkflowId")
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .unwrap_or(Uuid::nil()),
        job_name: text(row, "JobName").unwrap_or_default(),
        name: text(row, "Name").unwrap_or_default(),
        status: ExecutionStatus::parse(&text(row, "Status").unwrap_or_default()),
        started_at: instant(row, "StartedAt").unwrap_or_else(Utc::now),
        ended_at: instant(row, "EndedAt"),
        runtime_ms: int(row, "RuntimeMs"),
        trigger_type: TriggerType::parse(&text(row, "TriggerType").unwrap_or_default()),
    }
}

pub async fn insert(store: &dyn Store, record: &WorkflowRecord) -> Result<()> {
    store.insert(Table::Workflows, to_row(record)).await
}

/// Terminal update written by the workflow scheduler on exit.
pub async fn finish(
    store: &dyn Store,
    workflow_id: Uuid,
    name: &str,
    status: ExecutionStatus,
    ended_at: DateTime<Utc>,
    runtime_ms: i64,
) -> Result<()> {
    let mut set = Row::new();
    set.insert("Status".into(), Value::String(status.as_str().into()));
    set.insert("EndedAt".into(), iso(&ended_at));
    set.insert("RuntimeMs".into(), Value::from(runtime_ms));

    store
        .update(
            Table::Workflows,
            &Filter::new()
                .eq("WorkflowId", workflow_id.to_string())
                .eq("Name", name),
            set,
        )
        .await?;
    Ok(())
}

pub async fn by_execution(store: &dyn Store, execution_id: Uuid) -> Result<Vec<WorkflowRecord>> {
    let rows = store
        .query(
            Table::Workflows,
            &Filter::new().eq("WorkflowId", execution_id.to_string()),
            None,
        )
        .await?;
    Ok(rows.iter().map(from_row).collect())
}

pub async fn all(store: &dyn Store) -> Result<Vec<WorkflowRecord>> {
    let rows = store.query(Table::Workflows, &Filter::new(), None).await?;
    Ok(rows.iter().map(from_row).collect())
}
