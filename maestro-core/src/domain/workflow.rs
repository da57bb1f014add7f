//! Workflow domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{ExecutionStatus, TriggerType};

/// Workflow execution record
///
/// `workflow_id` is the correlation id of the enclosing execution tree, not a
/// fresh identity: a workflow row joins to its job through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub workflow_id: Uuid,
    pub job_name: String,
    pub name: String,
    pub status: ExecutionStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub runtime_ms: Option<i64>,
    pub trigger_type: TriggerType,
}
