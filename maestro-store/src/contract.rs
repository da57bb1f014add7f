//! The store operation contract
//!
//! The only persistence interface the engine depends on. Rows are opaque
//! column→value maps; filters are conjunctions of column equalities. Primary
//! key uniqueness is the caller's responsibility, and the contract offers no
//! cross-row transactions: every record is owned by the driver that created
//! it and only that driver mutates it afterward.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::schema::{self, TableSchema};

/// One persisted row: column name to JSON value. Null is a valid value.
pub type Row = BTreeMap<String, Value>;

/// The fixed table set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Jobs,
    Workflows,
    Tasks,
    TaskExecutions,
    Nodes,
    Integrations,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Jobs,
        Table::Workflows,
        Table::Tasks,
        Table::TaskExecutions,
        Table::Nodes,
        Table::Integrations,
    ];

    pub fn schema(&self) -> &'static TableSchema {
        match self {
            Table::Jobs => &schema::JOBS,
            Table::Workflows => &schema::WORKFLOWS,
            Table::Tasks => &schema::TASKS,
            Table::TaskExecutions => &schema::TASK_EXECUTIONS,
            Table::Nodes => &schema::NODES,
            Table::Integrations => &schema::INTEGRATIONS,
        }
    }

    pub fn name(&self) -> &'static str {
        self.schema().name
    }
}

/// Conjunction of column equalities
#[derive(Debug, Clone, Default)]
pub struct Filter {
    predicates: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Filter {
        Filter::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Filter {
        self.predicates.push((column.into(), value.into()));
        self
    }

    pub fn predicates(&self) -> &[(String, Value)] {
        &self.predicates
    }

    /// In-memory evaluation, used by the file backend. A missing column is
    /// treated as null.
    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|(column, expected)| {
            row.get(column).unwrap_or(&Value::Null) == expected
        })
    }
}

/// Persistence operations required by the engine
///
/// Implementations must apply each call atomically with respect to other
/// calls on the same handle. Concurrent writers are only ever directed at
/// disjoint primary keys, so no backend needs row locking beyond that.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a row. Key uniqueness is the caller's responsibility.
    async fn insert(&self, table: Table, row: Row) -> Result<()>;

    /// Update all rows matching `filter`, merging `set` over them.
    /// Returns the number of rows touched.
    async fn update(&self, table: Table, filter: &Filter, set: Row) -> Result<u64>;

    /// Fetch rows matching `filter`, optionally projected to a column subset.
    async fn query(&self, table: Table, filter: &Filter, projection: Option<&[&str]>)
        -> Result<Vec<Row>>;

    /// True when at least one row matches `filter`.
    async fn exists(&self, table: Table, filter: &Filter) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_conjunction() {
        let mut row = Row::new();
        row.insert("Name".into(), json!("etl"));
        row.insert("Status".into(), json!("Running"));

        assert!(Filter::new().eq("Name", "etl").matches(&row));
        assert!(Filter::new()
            .eq("Name", "etl")
            .eq("Status", "Running")
            .matches(&row));
        assert!(!Filter::new()
            .eq("Name", "etl")
            .eq("Status", "Failed")
            .matches(&row));
    }

    #[test]
    fn test_filter_missing_column_is_null() {
        let row = Row::new();
        assert!(Filter::new().eq("EndedAt", Value::Null).matches(&row));
        assert!(!Filter::new().eq("EndedAt", "x").matches(&row));
    }
}
