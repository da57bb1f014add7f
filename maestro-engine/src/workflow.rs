//! Workflow scheduler
//!
//! Topologically executes a workflow's steps. Dependencies are declared per
//! step; the scheduler repeatedly dispatches every step whose dependencies
//! are satisfied, surfacing "Waiting for: …" on blocked task rows and
//! failing with a "Stuck waiting" error when nothing can run. Detection of
//! circular dependencies is the combination of that check and a hard pass
//! bound.

use std::collections::HashSet;

use anyhow::{bail, Result};
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use maestro_core::domain::{ExecutionStatus, TaskExecutionRecord, TriggerType, WorkflowRecord};
use maestro_core::params::{self, Params};
use maestro_manifest::{Step, WorkflowDefinition};
use maestro_store::repository::{tasks, workflows};

use crate::task_runner::TaskRun;
use crate::Engine;

/// Upper bound on scheduler passes; a well-formed DAG finishes in one pass
/// per dependency level.
const MAX_SCHEDULER_PASSES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Task,
    Workflow,
}

impl Engine {
    /// Execute the workflow `name` and return the accumulated context.
    ///
    /// The workflow row is inserted on entry and finalized on every exit
    /// path. On failure, steps that never started keep their `Waiting` rows;
    /// only the workflow row reports the failure.
    pub fn run_workflow<'a>(
        &'a self,
        name: &'a str,
        input_params: Params,
        execution_id: Uuid,
        job_name: &'a str,
        trigger: &'a TriggerType,
    ) -> BoxFuture<'a, Result<Params>> {
        Box::pin(async move {
            let definition = self.registry().workflow_def(name)?;
            let child_trigger = trigger.derive_child(&definition.name);

            let started_at = Utc::now();
            let record = WorkflowRecord {
                workflow_id: execution_id,
                job_name: job_name.to_string(),
                name: definition.name.clone(),
                status: ExecutionStatus::Running,
                started_at,
                ended_at: None,
                runtime_ms: None,
                trigger_type: trigger.clone(),
            };
            workflows::insert(self.store(), &record).await?;

            // Pre-register every task-kind step so the tree is visible as
            // Waiting rows before anything runs. Workflow-kind steps get
            // their own Workflows row when they start.
            for step in &definition.tasks {
                let waiting = TaskExecutionRecord::waiting(
                    execution_id,
                    &step.name,
                    job_name,
                    Some(definition.name.clone()),
                    child_trigger.clone(),
                );
                tasks::insert_waiting(self.store(), &waiting).await?;
            }

            info!(
                "Starting workflow '{}' ({} task step(s), {} nested workflow(s))",
                definition.name,
                definition.tasks.len(),
                definition.workflows.len()
            );

            let result = self
                .schedule_steps(&definition, input_params, execution_id, job_name, &child_trigger)
                .await;

            let ended_at = Utc::now();
            let runtime_ms = (ended_at - started_at).num_milliseconds();
            let status = match &result {
                Ok(_) => ExecutionStatus::Completed,
                Err(_) => ExecutionStatus::Failed,
            };
            workflows::finish(
                self.store(),
                execution_id,
                &definition.name,
                status,
                ended_at,
                runtime_ms,
            )
            .await?;

            match &result {
                Ok(_) => info!("Workflow '{}' completed in {} ms", definition.name, runtime_ms),
                Err(err) => warn!("Workflow '{}' failed: {:#}", definition.name, err),
            }
            result
        })
    }

    async fn schedule_steps(
        &self,
        definition: &WorkflowDefinition,
        input_params: Params,
        execution_id: Uuid,
        job_name: &str,
        child_trigger: &TriggerType,
    ) -> Result<Params> {
        let mut pending: Vec<(StepKind, Step)> = definition
            .tasks
            .iter()
            .map(|step| (StepKind::Task, step.clone()))
            .chain(
                definition
                    .workflows
                    .iter()
                    .map(|step| (StepKind::Workflow, step.clone())),
            )
            .collect();

        let mut completed: HashSet<String> = HashSet::new();
        let mut context = input_params;
        let mut passes = 0usize;

        while !pending.is_empty() {
            passes += 1;
            if passes > MAX_SCHEDULER_PASSES {
                bail!(
                    "workflow '{}' exceeded {} scheduler passes; circular dependency suspected",
                    definition.name,
                    MAX_SCHEDULER_PASSES
                );
            }

            let runnable: Vec<usize> = pending
                .iter()
                .enumerate()
                .filter(|(_, (_, step))| {
                    step.depends_on.iter().all(|dep| completed.contains(dep))
                })
                .map(|(index, _)| index)
                .collect();

            // Surface what each blocked task step is waiting on. These are
            // live-state writes: store errors are swallowed.
            for (kind, step) in pending.iter() {
                if *kind != StepKind::Task
                    || step.depends_on.iter().all(|dep| completed.contains(dep))
                {
                    continue;
                }
                let blockers: Vec<&str> = step
                    .depends_on
                    .iter()
                    .filter(|dep| !completed.contains(*dep))
                    .map(String::as_str)
                    .collect();
                let state = format!("Waiting for: {}", blockers.join(", "));
                if let Err(err) =
                    tasks::update_state(self.store(), execution_id, &step.name, &state).await
                {
                    warn!(
                        "failed to record waiting state for step '{}': {}",
                        step.name, err
                    );
                }
            }

            if runnable.is_empty() {
                let remaining: Vec<&str> = pending
                    .iter()
                    .map(|(_, step)| step.name.as_str())
                    .collect();
                bail!(
                    "Stuck waiting for dependencies. Remaining: {}",
                    remaining.join(", ")
                );
            }

            // Dispatch in definition order. Sequential execution keeps
            // context publication and row ownership trivially serialized.
            // Indices were collected ascending; removing from the back keeps
            // the remaining ones valid.
            let mut dispatched: Vec<(StepKind, Step)> = Vec::with_capacity(runnable.len());
            for index in runnable.into_iter().rev() {
                dispatched.push(pending.remove(index));
            }
            dispatched.reverse();

            for (kind, step) in dispatched {
                match kind {
                    StepKind::Task => {
                        let output = self
                            .run_task(TaskRun {
                                task_ref: &step.reference,
                                step_name: &step.name,
                                input_params: &step.params,
                                input_context: &context,
                                execution_id,
                                job_name,
                                workflow_name: Some(&definition.name),
                                trigger: child_trigger,
                                max_retries: step.retries,
                                retry_delay_secs: step.retry_delay,
                            })
                            .await?;
                        context.insert(step.name.clone(), Value::Object(output));
                    }
                    StepKind::Workflow => {
                        let child_input = params::merge(&context, &step.params);
                        let returned = self
                            .run_workflow(
                                &step.reference,
                                child_input,
                                execution_id,
                                job_name,
                                child_trigger,
                            )
                            .await?;
                        // Nested workflows publish their whole context back
                        // into ours.
                        for (key, value) in returned {
                            context.insert(key, value);
                        }
                    }
                }
                completed.insert(step.name);
            }
        }

        Ok(context)
    }
}
