//! Job domain types
//!
//! A job is the outermost execution unit. Its `job_id` is the correlation
//! identifier (`ExecutionId`) shared by every record the execution tree
//! produces, so `(job_id, name)` is the composite identity of the record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::params::Params;

/// Lifecycle status for jobs and workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> ExecutionStatus {
        match s {
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "Failed" => ExecutionStatus::Failed,
            _ => ExecutionStatus::Pending,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribution label propagated through nested invocations
///
/// The root invocation is `Manual` or `Scheduled`; every descendant carries
/// `Invoked by <parent name>` so the tree stays attributable to its root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerType {
    Manual,
    Scheduled,
    InvokedBy(String),
}

impl TriggerType {
    /// Label handed to child steps: an `Invoked by` label is reused unchanged,
    /// anything else becomes `Invoked by <parent>`.
    pub fn derive_child(&self, parent: &str) -> TriggerType {
        match self {
            TriggerType::InvokedBy(_) => self.clone(),
            _ => TriggerType::InvokedBy(parent.to_string()),
        }
    }

    pub fn label(&self) -> String {
        match self {
            TriggerType::Manual => "Manual".to_string(),
            TriggerType::Scheduled => "Scheduled".to_string(),
            TriggerType::InvokedBy(parent) => format!("Invoked by {}", parent),
        }
    }

    pub fn parse(s: &str) -> TriggerType {
        match s {
            "Scheduled" => TriggerType::Scheduled,
            other => match other.strip_prefix("Invoked by ") {
                Some(parent) => TriggerType::InvokedBy(parent.to_string()),
                None => TriggerType::Manual,
            },
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Job execution record
///
/// Created by the job driver on entry (status `Running`) and updated once on
/// exit. Never deleted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub name: String,
    pub trigger_type: TriggerType,
    pub cron: Option<String>,
    pub status: ExecutionStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub runtime_ms: Option<i64>,
    pub created_by: String,
    pub input_params: Params,
}
