//! Run command handlers
//!
//! Invoke a job, workflow, or task from the manifest and print the execution
//! id so the run can be inspected later with `maestro get`.

use anyhow::{bail, Result};
use colored::Colorize as _;
use serde_json::Value;
use uuid::Uuid;

use maestro_core::domain::TriggerType;
use maestro_core::params::Params;
use maestro_engine::{Engine, TaskRun};

use super::collect_params;

pub async fn run_job(
    engine: &Engine,
    job: &str,
    params: Vec<(String, Value)>,
    trigger: Option<String>,
) -> Result<()> {
    let trigger = resolve_trigger(engine, job, trigger)?;
    let execution_id = Uuid::new_v4();

    println!(
        "Running job {} (execution {})",
        job.bold(),
        execution_id.to_string().dimmed()
    );

    let context = engine
        .run_job(
            job,
            collect_params(params),
            trigger,
            Some(execution_id),
            false,
        )
        .await?;

    println!("{}", "Job completed.".green().bold());
    print_context(&context);
    println!("Execution id: {}", execution_id);
    Ok(())
}

pub async fn run_workflow(
    engine: &Engine,
    name: &str,
    params: Vec<(String, Value)>,
) -> Result<()> {
    let execution_id = Uuid::new_v4();

    println!(
        "Running workflow {} (execution {})",
        name.bold(),
        execution_id.to_string().dimmed()
    );

    let context = engine
        .run_workflow(
            name,
            collect_params(params),
            execution_id,
            name,
            &TriggerType::Manual,
        )
        .await?;

    println!("{}", "Workflow completed.".green().bold());
    print_context(&context);
    println!("Execution id: {}", execution_id);
    Ok(())
}

pub async fn run_task(engine: &Engine, name: &str, params: Vec<(String, Value)>) -> Result<()> {
    let execution_id = Uuid::new_v4();
    let params = collect_params(params);
    let context = Params::new();

    println!(
        "Running task {} (execution {})",
        name.bold(),
        execution_id.to_string().dimmed()
    );

    let output = engine
        .run_task(TaskRun {
            task_ref: name,
            step_name: name,
            input_params: &params,
            input_context: &context,
            execution_id,
            job_name: name,
            workflow_name: None,
            trigger: &TriggerType::Manual,
            max_retries: 0,
            retry_delay_secs: 5,
        })
        .await?;

    println!("{}", "Task completed.".green().bold());
    print_context(&output);
    println!("Execution id: {}", execution_id);
    Ok(())
}

/// An explicit `--trigger` wins; otherwise the definition's own label, and
/// `Manual` as the last resort.
fn resolve_trigger(engine: &Engine, job: &str, trigger: Option<String>) -> Result<TriggerType> {
    match trigger {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "manual" => Ok(TriggerType::Manual),
            "scheduled" => Ok(TriggerType::Scheduled),
            other => bail!("unknown trigger '{}', expected manual or scheduled", other),
        },
        None => {
            let definition = engine.registry().job_def(job)?;
            Ok(definition
                .trigger_type
                .as_deref()
                .map(TriggerType::parse)
                .unwrap_or(TriggerType::Manual))
        }
    }
}

fn print_context(context: &Params) {
    if context.is_empty() {
        return;
    }
    match serde_json::to_string_pretty(context) {
        Ok(rendered) => println!("{}", rendered),
        Err(_) => println!("{:?}", context),
    }
}
