//! PostgreSQL-backed store
//!
//! Tables are created idempotently at connect time; the four contract
//! operations are translated into parameterized SQL built from the static
//! schema. Values bind as TEXT or BIGINT per the column declaration, which
//! keeps the wire format identical to the file backend (timestamps and JSON
//! payloads travel as strings).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row as _};

use crate::contract::{Filter, Row, Store, Table};
use crate::error::{Result, StoreError};
use crate::schema::ColumnKind;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run the idempotent migrations.
    pub async fn connect(connection_string: &str) -> Result<PgStore> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(connection_string)
            .await?;

        for table in Table::ALL {
            sqlx::query(&create_table_sql(table)).execute(&pool).await?;
        }
        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_task_executions_execution_id
               ON "TaskExecutions" ("ExecutionId")"#,
        )
        .execute(&pool)
        .await?;

        tracing::info!("Store migrations completed");
        Ok(PgStore { pool })
    }

    fn column_kind(table: Table, column: &str) -> Result<ColumnKind> {
        table
            .schema()
            .column(column)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: table.name(),
                column: column.to_string(),
            })
    }

    /// Append `WHERE …` for the filter. Null predicates compile to `IS NULL`;
    /// everything else becomes a numbered placeholder starting at `offset`.
    fn where_clause(table: Table, filter: &Filter, offset: usize) -> Result<(String, Vec<(ColumnKind, Value)>)> {
        let mut fragments = Vec::new();
        let mut binds = Vec::new();

        for (column, value) in filter.predicates() {
            let kind = Self::column_kind(table, column)?;
            if value.is_null() {
                fragments.push(format!("\"{}\" IS NULL", column));
            } else {
                fragments.push(format!("\"{}\" = ${}", column, offset + binds.len()));
                binds.push((kind, value.clone()));
            }
        }

        let clause = if fragments.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", fragments.join(" AND "))
        };
        Ok((clause, binds))
    }
}

fn create_table_sql(table: Table) -> String {
    let schema = table.schema();
    let columns = schema
        .columns
        .iter()
        .map(|(name, kind)| {
            let sql_type = match kind {
                ColumnKind::Text => "TEXT",
                ColumnKind::BigInt => "BIGINT",
            };
            format!("\"{}\" {}", name, sql_type)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS \"{}\" ({})", schema.name, columns)
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    kind: ColumnKind,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match kind {
        ColumnKind::Text => query.bind(text_of(value)),
        ColumnKind::BigInt => query.bind(value.as_i64()),
    }
}

/// Text representation of a value. Strings bind as-is; any other non-null
/// value binds as its JSON serialization so callers may pass structured
/// payloads without pre-serializing.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn read_column(row: &PgRow, column: &str, kind: ColumnKind) -> Result<Value> {
    let value = match kind {
        ColumnKind::Text => row
            .try_get::<Option<String>, _>(column)?
            .map(Value::String)
            .unwrap_or(Value::Null),
        ColumnKind::BigInt => row
            .try_get::<Option<i64>, _>(column)?
            .map(Value::from)
            .unwrap_or(Value::Null),
    };
    Ok(value)
}

#[async_trait]
impl Store for PgStore {
    async fn insert(&self, table: Table, row: Row) -> Result<()> {
        let mut columns = Vec::new();
        let mut kinds = Vec::new();
        for column in row.keys() {
            kinds.push(Self::column_kind(table, column)?);
            columns.push(format!("\"{}\"", column));
        }

        let placeholders = (1..=columns.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            table.name(),
            columns.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for (kind, value) in kinds.iter().zip(row.values()) {
            query = bind_value(query, *kind, value);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn update(&self, table: Table, filter: &Filter, set: Row) -> Result<u64> {
        if set.is_empty() {
            return Ok(0);
        }

        let mut assignments = Vec::new();
        let mut set_binds = Vec::new();
        for (column, value) in &set {
            let kind = Self::column_kind(table, column)?;
            assignments.push(format!("\"{}\" = ${}", column, set_binds.len() + 1));
            set_binds.push((kind, value.clone()));
        }

        let (clause, where_binds) = Self::where_clause(table, filter, set_binds.len() + 1)?;
        let sql = format!(
            "UPDATE \"{}\" SET {}{}",
            table.name(),
            assignments.join(", "),
            clause
        );

        let mut query = sqlx::query(&sql);
        for (kind, value) in set_binds.iter().chain(where_binds.iter()) {
            query = bind_value(query, *kind, value);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn query(
        &self,
        table: Table,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Row>> {
        let schema = table.schema();
        let selected: Vec<(&str, ColumnKind)> = match projection {
            Some(columns) => {
                let mut selected = Vec::with_capacity(columns.len());
                for column in columns {
                    selected.push((*column, Self::column_kind(table, column)?));
                }
                selected
            }
            None => schema
                .columns
                .iter()
                .map(|(name, kind)| (*name, *kind))
                .collect(),
        };

        let column_list = selected
            .iter()
            .map(|(name, _)| format!("\"{}\"", name))
            .collect::<Vec<_>>()
            .join(", ");
        let (clause, binds) = Self::where_clause(table, filter, 1)?;
        let sql = format!("SELECT {} FROM \"{}\"{}", column_list, table.name(), clause);

        let mut query = sqlx::query(&sql);
        for (kind, value) in &binds {
            query = bind_value(query, *kind, value);
        }

        let pg_rows = query.fetch_all(&self.pool).await?;
        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let mut row = Row::new();
            for (name, kind) in &selected {
                row.insert((*name).to_string(), read_column(pg_row, name, *kind)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }

    async fn exists(&self, table: Table, filter: &Filter) -> Result<bool> {
        let (clause, binds) = Self::where_clause(table, filter, 1)?;
        let sql = format!("SELECT 1 FROM \"{}\"{} LIMIT 1", table.name(), clause);

        let mut query = sqlx::query(&sql);
        for (kind, value) in &binds {
            query = bind_value(query, *kind, value);
        }
        Ok(query.fetch_optional(&self.pool).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_table_sql_quotes_identifiers() {
        let sql = create_table_sql(Table::Jobs);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"Jobs\""));
        assert!(sql.contains("\"RuntimeMs\" BIGINT"));
        assert!(sql.contains("\"InputParams\" TEXT"));
    }

    #[test]
    fn test_where_clause_null_uses_is_null() {
        let filter = Filter::new().eq("EndedAt", Value::Null).eq("Name", "etl");
        let (clause, binds) = PgStore::where_clause(Table::Jobs, &filter, 1).unwrap();
        assert_eq!(clause, " WHERE \"EndedAt\" IS NULL AND \"Name\" = $1");
        assert_eq!(binds.len(), 1);
    }

    #[test]
    fn test_where_clause_rejects_unknown_column() {
        let filter = Filter::new().eq("Nope", 1);
        assert!(PgStore::where_clause(Table::Jobs, &filter, 1).is_err());
    }

    #[test]
    fn test_text_of_serializes_structured_values() {
        assert_eq!(text_of(&json!("plain")), Some("plain".to_string()));
        assert_eq!(text_of(&json!({"a": 1})), Some("{\"a\":1}".to_string()));
        assert_eq!(text_of(&Value::Null), None);
    }
}
