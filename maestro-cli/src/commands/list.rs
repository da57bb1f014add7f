//! List command handler

use anyhow::{bail, Result};
use colored::Colorize as _;

use maestro_engine::{Engine, ExecutionFilter, ExecutionKind, ExecutionSummary, SortKey};

#[allow(clippy::too_many_arguments)]
pub async fn list_executions(
    engine: &Engine,
    status: Option<String>,
    kind: Option<String>,
    name: Option<String>,
    sort: &str,
    desc: bool,
    top: Option<usize>,
) -> Result<()> {
    let filter = ExecutionFilter {
        status,
        kind: kind.as_deref().map(parse_kind).transpose()?,
        name,
        started_after: None,
        started_before: None,
        sort: parse_sort(sort)?,
        descending: desc,
        top,
    };

    let rows = engine.list_executions(&filter).await?;
    if rows.is_empty() {
        println!("{}", "No executions found.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} execution(s):", rows.len()).bold());
    println!();
    for row in &rows {
        print_summary(row);
    }
    Ok(())
}

fn parse_kind(raw: &str) -> Result<ExecutionKind> {
    match raw.to_ascii_lowercase().as_str() {
        "job" => Ok(ExecutionKind::Job),
        "workflow" => Ok(ExecutionKind::Workflow),
        "task" => Ok(ExecutionKind::Task),
        other => bail!("unknown kind '{}', expected job, workflow, or task", other),
    }
}

fn parse_sort(raw: &str) -> Result<SortKey> {
    match raw.to_ascii_lowercase().as_str() {
        "started" => Ok(SortKey::StartedAt),
        "ended" => Ok(SortKey::EndedAt),
        "status" => Ok(SortKey::Status),
        "runtime" => Ok(SortKey::RuntimeMs),
        other => bail!(
            "unknown sort key '{}', expected started, ended, status, or runtime",
            other
        ),
    }
}

fn print_summary(row: &ExecutionSummary) {
    let status = match row.status.as_str() {
        "Completed" => row.status.green(),
        "Failed" => row.status.red(),
        "Running" => row.status.cyan(),
        _ => row.status.yellow(),
    };

    let started = row
        .started_at
        .map(|at| at.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "-".to_string());
    let runtime = row
        .runtime_ms
        .map(|ms| format!("{} ms", ms))
        .unwrap_or_else(|| "-".to_string());

    println!(
        "{}  {:<8}  {:<10}  {:<24}  started {}  ({})",
        row.execution_id.to_string().dimmed(),
        row.kind.as_str(),
        status,
        row.name,
        started,
        runtime
    );
    if let Some(state) = &row.state {
        if state != &row.status {
            println!("    state: {}", state.dimmed());
        }
    }
}
