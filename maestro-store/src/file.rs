//! File-backed store
//!
//! Serializes the whole schema as one JSON document:
//! `{ "Nodes": [], "Jobs": [], "Workflows": [], "Tasks": [],
//!    "TaskExecutions": [], "Integrations": [] }`.
//!
//! Every write is a load-modify-save cycle under a single async mutex, so the
//! backend supports exactly one writer per process and is not safe for
//! cross-process sharing. That is the intended envelope: this backend is the
//! automatic choice when no database is configured.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::contract::{Filter, Row, Store, Table};
use crate::error::{Result, StoreError};

pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) the document at `path`.
    pub fn open(path: impl AsRef<Path>) -> FileStore {
        FileStore {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Self::empty_document()),
            Ok(raw) => match serde_json::from_str::<Value>(&raw)? {
                Value::Object(document) => Ok(document),
                _ => Err(StoreError::Corrupt(format!(
                    "{} does not contain a JSON object",
                    self.path.display()
                ))),
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::empty_document())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_string_pretty(&Value::Object(document.clone()))?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }

    fn empty_document() -> Map<String, Value> {
        let mut document = Map::new();
        for table in Table::ALL {
            document.insert(table.name().to_string(), Value::Array(Vec::new()));
        }
        document
    }

    fn rows_mut<'doc>(
        document: &'doc mut Map<String, Value>,
        table: Table,
    ) -> Result<&'doc mut Vec<Value>> {
        document
            .entry(table.name().to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| {
                StoreError::Corrupt(format!("table {} is not an array", table.name()))
            })
    }

    fn validate_columns(table: Table, row: &Row) -> Result<()> {
        let schema = table.schema();
        for column in row.keys() {
            if schema.column(column).is_none() {
                return Err(StoreError::UnknownColumn {
                    table: schema.name,
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    fn as_row(value: &Value) -> Row {
        match value {
            Value::Object(map) => map.clone().into_iter().collect(),
            _ => Row::new(),
        }
    }
}

#[async_trait]
impl Store for FileStore {
    async fn insert(&self, table: Table, row: Row) -> Result<()> {
        Self::validate_columns(table, &row)?;
        let _guard = self.write_lock.lock().await;

        let mut document = self.load().await?;
        let rows = Self::rows_mut(&mut document, table)?;
        rows.push(Value::Object(row.into_iter().collect()));
        self.save(&document).await
    }

    async fn update(&self, table: Table, filter: &Filter, set: Row) -> Result<u64> {
        Self::validate_columns(table, &set)?;
        let _guard = self.write_lock.lock().await;

        let mut document = self.load().await?;
        let rows = Self::rows_mut(&mut document, table)?;

        let mut touched = 0u64;
        for value in rows.iter_mut() {
            if filter.matches(&Self::as_row(value)) {
                if let Value::Object(map) = value {
                    for (column, new_value) in &set {
                        map.insert(column.clone(), new_value.clone());
                    }
                    touched += 1;
                }
            }
        }

        if touched > 0 {
            self.save(&document).await?;
        }
        Ok(touched)
    }

    async fn query(
        &self,
        table: Table,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Row>> {
        let mut document = self.load().await?;
        let rows = Self::rows_mut(&mut document, table)?;

        let mut matched = Vec::new();
        for value in rows.iter() {
            let row = Self::as_row(value);
            if filter.matches(&row) {
                match projection {
                    Some(columns) => {
                        let projected = row
                            .into_iter()
                            .filter(|(column, _)| columns.contains(&column.as_str()))
                            .collect();
                        matched.push(projected);
                    }
                    None => matched.push(row),
                }
            }
        }
        Ok(matched)
    }

    async fn exists(&self, table: Table, filter: &Filter) -> Result<bool> {
        let mut document = self.load().await?;
        let rows = Self::rows_mut(&mut document, table)?;
        Ok(rows
            .iter()
            .any(|value| filter.matches(&Self::as_row(value))))
    }
}
