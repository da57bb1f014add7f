//! Jobs repository

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use maestro_core::domain::{ExecutionStatus, JobRecord, TriggerType};
use maestro_core::params::Params;

use crate::contract::{Filter, Row, Store, Table};
use crate::error::Result;

use super::{instant, int, iso, json_map, opt_int, opt_iso, opt_text, text};

pub fn to_row(record: &JobRecord) -> Result<Row> {
    let mut row = Row::new();
    row.insert("JobId".into(), Value::String(record.job_id.to_string()));
    row.insert("Name".into(), Value::String(record.name.clone()));
    row.insert(
        "TriggerType".into(),
        Value::String(record.trigger_type.label()),
    );
    row.insert("Cron".into(), opt_text(&record.cron));
    row.insert("Status".into(), Value::String(record.status.as_str().into()));
    row.insert("CreatedAt".into(), iso(&record.created_at));
    row.insert("StartedAt".into(), iso(&record.started_at));
    row.insert("EndedAt".into(), opt_iso(&record.ended_at));
    row.insert("RuntimeMs".into(), opt_int(&record.runtime_ms));
    row.insert("CreatedBy".into(), Value::String(record.created_by.clone()));
    row.insert(
        "InputParams".into(),
        Value::String(serde_json::to_string(&record.input_params)?),
    );
    Ok(row)
}

pub fn from_row(row: &Row) -> JobRecord {
    JobRecord {
        job_id: text(row, "JobId")
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .unwrap_or(Uuid::nil()),
        name: text(row, "Name").unwrap_or_default(),
        trigger_type: TriggerType::parse(&text(row, "TriggerType").unwrap_or_default()),
        cron: text(row, "Cron"),
        status: ExecutionStatus::parse(&text(row, "Status").unwrap_or_default()),
        created_at: instant(row, "CreatedAt").unwrap_or_else(Utc::now),
        started_at: instant(row, "StartedAt").unwrap_or_else(Utc::now),
        ended_at: instant(row, "EndedAt"),
        runtime_ms: int(row, "RuntimeMs"),
        created_by: text(row, "CreatedBy").unwrap_or_default(),
        input_params: json_map(row, "InputParams").unwrap_or_default(),
    }
}

pub async fn insert(store: &dyn Store, record: &JobRecord) -> Result<()> {
    store.insert(Table::Jobs, to_row(record)?).await
}

/// Terminal update written by the job driver on exit.
pub async fn finish(
    store: &dyn Store,
    job_id: Uuid,
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
            Table::Jobs,
            &Filter::new()
                .eq("JobId", job_id.to_string())
                .eq("Name", name),
            set,
        )
        .await?;
    Ok(())
}

pub async fn by_execution(store: &dyn Store, execution_id: Uuid) -> Result<Vec<JobRecord>> {
    let rows = store
        .query(
            Table::Jobs,
            &Filter::new().eq("JobId", execution_id.to_string()),
            None,
        )
        .await?;
    Ok(rows.iter().map(from_row).collect())
}

pub async fn all(store: &dyn Store) -> Result<Vec<JobRecord>> {
    let rows = store.query(Table::Jobs, &Filter::new(), None).await?;
    Ok(rows.iter().map(from_row).collect())
}
