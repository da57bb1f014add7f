//! Get command handler

use anyhow::{Context, Result};
use colored::Colorize as _;
use uuid::Uuid;

use maestro_engine::{Engine, ExecutionKind};

pub async fn get_execution(engine: &Engine, execution_id: &str) -> Result<()> {
    let execution_id = Uuid::parse_str(execution_id)
        .with_context(|| format!("'{}' is not a valid execution id", execution_id))?;

    let rows = engine.get_execution(execution_id).await?;
    if rows.is_empty() {
        println!("{}", "No records for that execution id.".yellow());
        return Ok(());
    }

    println!("{}", format!("Execution {}", execution_id).bold());
    println!();
    for row in &rows {
        let indent = match row.kind {
            ExecutionKind::Job => "",
            ExecutionKind::Workflow => "  ",
            ExecutionKind::Task => "    ",
        };
        let status = match row.status.as_str() {
            "Completed" => row.status.green(),
            "Failed" => row.status.red(),
            "Running" => row.status.cyan(),
            _ => row.status.yellow(),
        };
        let started = row
            .started_at
            .map(|at| at.format("%H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| "-".to_string());
        let runtime = row
            .runtime_ms
            .map(|ms| format!("{} ms", ms))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{}{} {:<10} {:<24} started {}  ({})  trigger: {}",
            indent,
            row.kind.as_str(),
            status,
            row.name,
            started,
            runtime,
            row.trigger_type.dimmed()
        );
        if let Some(state) = &row.state {
            if state != &row.status {
                println!("{}    state: {}", indent, state.dimmed());
            }
        }
    }
    Ok(())
}
