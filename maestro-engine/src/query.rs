//! Query service
//!
//! Read-only reconstruction of the recorded history: flat filtered lists over
//! the union of jobs, workflows, and task executions, and per-execution trees
//! joined on the shared correlation id.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use maestro_core::domain::{JobRecord, TaskExecutionRecord, WorkflowRecord};
use maestro_store::repository::{jobs, tasks, workflows};

use crate::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    Job,
    Workflow,
    Task,
}

impl ExecutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionKind::Job => "job",
            ExecutionKind::Workflow => "workflow",
            ExecutionKind::Task => "task",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    StartedAt,
    EndedAt,
    Status,
    RuntimeMs,
}

/// One row of the flattened history
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub execution_id: Uuid,
    pub name: String,
    pub kind: ExecutionKind,
    pub status: String,
    pub state: Option<String>,
    pub trigger_type: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub runtime_ms: Option<i64>,
}

impl ExecutionSummary {
    fn from_job(record: &JobRecord) -> ExecutionSummary {
        ExecutionSummary {
            execution_id: record.job_id,
            name: record.name.clone(),
            kind: ExecutionKind::Job,
            status: record.status.as_str().to_string(),
            state: None,
            trigger_type: record.trigger_type.label(),
            started_at: Some(record.started_at),
            ended_at: record.ended_at,
            runtime_ms: record.runtime_ms,
        }
    }

    fn from_workflow(record: &WorkflowRecord) -> ExecutionSummary {
        ExecutionSummary {
            execution_id: record.workflow_id,
            name: record.name.clone(),
            kind: ExecutionKind::Workflow,
            status: record.status.as_str().to_string(),
            state: None,
            trigger_type: record.trigger_type.label(),
            started_at: Some(record.started_at),
            ended_at: record.ended_at,
            runtime_ms: record.runtime_ms,
        }
    }

    fn from_task(record: &TaskExecutionRecord) -> ExecutionSummary {
        ExecutionSummary {
            execution_id: record.execution_id,
            name: record.task_id.clone(),
            kind: ExecutionKind::Task,
            status: record.status.as_str().to_string(),
            state: Some(record.state.clone()),
            trigger_type: record.trigger_type.label(),
            started_at: record.started_at,
            ended_at: record.ended_at,
            runtime_ms: record.runtime_ms,
        }
    }
}

/// List filter; all predicates are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub status: Option<String>,
    pub kind: Option<ExecutionKind>,
    /// Case-insensitive substring match on the record name.
    pub name: Option<String>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    pub sort: SortKey,
    pub descending: bool,
    pub top: Option<usize>,
}

impl Engine {
    /// Flattened, filtered, sorted view over the whole history.
    pub async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<ExecutionSummary>> {
        let mut rows: Vec<ExecutionSummary> = Vec::new();
        rows.extend(jobs::all(self.store()).await?.iter().map(ExecutionSummary::from_job));
        rows.extend(
            workflows::all(self.store())
                .await?
                .iter()
                .map(ExecutionSummary::from_workflow),
        );
        rows.extend(tasks::all(self.store()).await?.iter().map(ExecutionSummary::from_task));

        rows.retain(|row| matches(row, filter));
        sort(&mut rows, filter.sort, filter.descending);

        if let Some(top) = filter.top {
            rows.truncate(top);
        }
        Ok(rows)
    }

    /// The execution tree behind one correlation id, chronological by start
    /// time. When no job row exists for the id, only the task rows are
    /// returned.
    pub async fn get_execution(&self, execution_id: Uuid) -> Result<Vec<ExecutionSummary>> {
        let job_rows = jobs::by_execution(self.store(), execution_id).await?;
        let task_rows = tasks::by_execution(self.store(), execution_id).await?;

        let mut rows: Vec<ExecutionSummary> = if job_rows.is_empty() {
            task_rows.iter().map(ExecutionSummary::from_task).collect()
        } else {
            let workflow_rows = workflows::by_execution(self.store(), execution_id).await?;
            job_rows
                .iter()
                .map(ExecutionSummary::from_job)
                .chain(workflow_rows.iter().map(ExecutionSummary::from_workflow))
                .chain(task_rows.iter().map(ExecutionSummary::from_task))
                .collect()
        };

        sort(&mut rows, SortKey::StartedAt, false);
        Ok(rows)
    }
}

fn matches(row: &ExecutionSummary, filter: &ExecutionFilter) -> bool {
    if let Some(status) = &filter.status {
        if !row.status.eq_ignore_ascii_case(status) {
            return false;
        }
    }
    if let Some(kind) = filter.kind {
        if row.kind != kind {
            return false;
        }
    }
    if let Some(name) = &filter.name {
        if !row.name.to_lowercase().contains(&name.to_lowercase()) {
            return false;
        }
    }
    if let Some(after) = filter.started_after {
        match row.started_at {
            Some(started) if started >= after => {}
            _ => return false,
        }
    }
    if let Some(before) = filter.started_before {
        match row.started_at {
            Some(started) if started <= before => {}
            _ => return false,
        }
    }
    true
}

fn sort(rows: &mut [ExecutionSummary], key: SortKey, descending: bool) {
    rows.sort_by(|a, b| {
        let ordering = match key {
            SortKey::StartedAt => cmp_option(&a.started_at, &b.started_at),
            SortKey::EndedAt => cmp_option(&a.ended_at, &b.ended_at),
            SortKey::Status => a.status.cmp(&b.status),
            SortKey::RuntimeMs => cmp_option(&a.runtime_ms, &b.runtime_ms),
        };
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

/// `None` sorts after every `Some`: rows that never started or ended trail
/// the chronological view.
fn cmp_option<T: Ord>(a: &Option<T>, b: &Option<T>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}
