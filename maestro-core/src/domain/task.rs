//! Task execution domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::params::Params;

use super::job::TriggerType;

/// Lifecycle status of a single task step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Waiting,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Waiting => "Waiting",
            TaskStatus::Running => "Running",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> TaskStatus {
        match s {
            "Running" => TaskStatus::Running,
            "Completed" => TaskStatus::Completed,
            "Failed" => TaskStatus::Failed,
            _ => TaskStatus::Waiting,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task execution record
///
/// Keyed by `(execution_id, task_id)` where `task_id` is the step's name
/// within its container, not the name of the underlying task definition.
///
/// `status` is the coarse lifecycle enum; `state` is a free-form live-progress
/// string ("Waiting for: a, b", "Retrying (2/5)", a script-supplied label via
/// the STATE channel, or the terminal status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    pub execution_id: Uuid,
    pub task_id: String,
    pub job_name: String,
    pub workflow_name: Option<String>,
    pub trigger_type: TriggerType,
    pub input_data: Option<Params>,
    pub output_data: Option<Params>,
    pub execution_log: Option<String>,
    pub error_log: Option<String>,
    pub status: TaskStatus,
    pub state: String,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub runtime_ms: Option<i64>,
    pub exit_code: Option<i64>,
    pub attempt: i64,
    pub max_retries: i64,
}

impl TaskExecutionRecord {
    /// Fresh row in the pre-registered `Waiting` state.
    pub fn waiting(
        execution_id: Uuid,
        task_id: impl Into<String>,
        job_name: impl Into<String>,
        workflow_name: Option<String>,
        trigger_type: TriggerType,
    ) -> Self {
        Self {
            execution_id,
            task_id: task_id.into(),
            job_name: job_name.into(),
            workflow_name,
            trigger_type,
            input_data: None,
            output_data: None,
            execution_log: None,
            error_log: None,
            status: TaskStatus::Waiting,
            state: TaskStatus::Waiting.as_str().to_string(),
            started_at: None,
            ended_at: None,
            runtime_ms: None,
            exit_code: None,
            attempt: 0,
            max_retries: 0,
        }
    }
}
