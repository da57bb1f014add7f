//! Static table schema
//!
//! Both backends share one schema declaration: the file backend uses it to
//! reject unknown columns, the Postgres backend derives its DDL and bind
//! types from it. Timestamps are stored as ISO-8601 text to round-trip
//! sub-second precision portably; every column is nullable.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    BigInt,
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [(&'static str, ColumnKind)],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<ColumnKind> {
        self.columns
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, kind)| *kind)
    }
}

use ColumnKind::{BigInt, Text};

pub(crate) static JOBS: TableSchema = TableSchema {
    name: "Jobs",
    columns: &[
        ("JobId", Text),
        ("Name", Text),
        ("TriggerType", Text),
        ("Cron", Text),
        ("Status", Text),
        ("CreatedAt", Text),
        ("StartedAt", Text),
        ("EndedAt", Text),
        ("RuntimeMs", BigInt),
        ("CreatedBy", Text),
        ("InputParams", Text),
    ],
};

pub(crate) static WORKFLOWS: TableSchema = TableSchema {
    name: "Workflows",
    columns: &[
        ("WorkflowId", Text),
        ("JobName", Text),
        ("Name", Text),
        ("Status", Text),
        ("StartedAt", Text),
        ("EndedAt", Text),
        ("RuntimeMs", BigInt),
        ("TriggerType", Text),
    ],
};

pub(crate) static TASKS: TableSchema = TableSchema {
    name: "Tasks",
    columns: &[
        ("Name", Text),
        ("File", Text),
        ("Runtime", Text),
        ("RuntimeEnv", Text),
        ("Description", Text),
    ],
};

pub(crate) static TASK_EXECUTIONS: TableSchema = TableSchema {
    name: "TaskExecutions",
    columns: &[
        ("ExecutionId", Text),
        ("TaskId", Text),
        ("JobName", Text),
        ("WorkflowName", Text),
        ("TriggerType", Text),
        ("InputData", Text),
        ("OutputData", Text),
        ("ExecutionLog", Text),
        ("ErrorLog", Text),
        ("Status", Text),
        ("State", Text),
        ("StartedAt", Text),
        ("EndedAt", Text),
        ("RuntimeMs", BigInt),
        ("ExitCode", BigInt),
        ("Attempt", BigInt),
        ("MaxRetries", BigInt),
    ],
};

pub(crate) static NODES: TableSchema = TableSchema {
    name: "Nodes",
    columns: &[
        ("NodeId", Text),
        ("Name", Text),
        ("OS", Text),
        ("Capabilities", Text),
        ("LastHeartbeat", Text),
        ("Status", Text),
    ],
};

pub(crate) static INTEGRATIONS: TableSchema = TableSchema {
    name: "Integrations",
    columns: &[
        ("Name", Text),
        ("File", Text),
        ("Description", Text),
        ("Config", Text),
    ],
};
