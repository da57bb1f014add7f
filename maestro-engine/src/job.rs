//! Job driver
//!
//! Drives the outermost execution unit: inline tasks first (unconditional,
//! in declaration order), then workflows (which may depend on completed step
//! names), then child jobs. The correlation id allocated here — or inherited
//! when this job is itself a child — keys every record in the tree.

use anyhow::{bail, Result};
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use maestro_core::domain::{ExecutionStatus, JobRecord, TaskExecutionRecord, TriggerType};
use maestro_core::params::{self, Params};
use maestro_manifest::Step;
use maestro_store::repository::{jobs, tasks};

use crate::task_runner::TaskRun;
use crate::{hostname, Engine};

impl Engine {
    /// Execute the job `name` and return the accumulated context.
    ///
    /// `execution_id` is allocated fresh for a root invocation and inherited
    /// by child jobs; `trigger` likewise propagates unchanged into children
    /// so the whole tree stays attributed to its root.
    pub fn run_job<'a>(
        &'a self,
        name: &'a str,
        input_params: Params,
        trigger: TriggerType,
        execution_id: Option<Uuid>,
        is_child: bool,
    ) -> BoxFuture<'a, Result<Params>> {
        Box::pin(async move {
            let definition = self.registry().job_def(name)?;
            let execution_id = execution_id.unwrap_or_else(Uuid::new_v4);

            let started_at = Utc::now();
            let record = JobRecord {
                job_id: execution_id,
                name: definition.name.clone(),
                trigger_type: trigger.clone(),
                cron: definition.cron.clone(),
                status: ExecutionStatus::Running,
                created_at: started_at,
                started_at,
                ended_at: None,
                runtime_ms: None,
                created_by: hostname(),
                input_params: input_params.clone(),
            };
            jobs::insert(self.store(), &record).await?;

            let child_trigger = trigger.derive_child(&definition.name);

            for step in &definition.tasks {
                let waiting = TaskExecutionRecord::waiting(
                    execution_id,
                    &step.name,
                    &definition.name,
                    None,
                    child_trigger.clone(),
                );
                tasks::insert_waiting(self.store(), &waiting).await?;
            }

            info!(
                "Starting job '{}' (execution {}, trigger '{}'{})",
                definition.name,
                execution_id,
                trigger,
                if is_child { ", child" } else { "" }
            );

            let result = self
                .drive_steps(&definition, input_params, execution_id, &trigger, &child_trigger)
                .await;

            let ended_at = Utc::now();
            let runtime_ms = (ended_at - started_at).num_milliseconds();
            let status = match &result {
                Ok(_) => ExecutionStatus::Completed,
                Err(_) => ExecutionStatus::Failed,
            };
            jobs::finish(
                self.store(),
                execution_id,
                &definition.name,
                status,
                ended_at,
                runtime_ms,
            )
            .await?;

            match &result {
                Ok(_) => info!("Job '{}' completed in {} ms", definition.name, runtime_ms),
                Err(err) => warn!("Job '{}' failed: {:#}", definition.name, err),
            }
            result
        })
    }

    async fn drive_steps(
        &self,
        definition: &maestro_manifest::JobDefinition,
        input_params: Params,
        execution_id: Uuid,
        trigger: &TriggerType,
        child_trigger: &TriggerType,
    ) -> Result<Params> {
        let mut context = input_params;
        let mut completed: std::collections::HashSet<String> = std::collections::HashSet::new();

        for step in &definition.tasks {
            let output = self
                .run_task(TaskRun {
                    task_ref: &step.reference,
                    step_name: &step.name,
                    input_params: &step.params,
                    input_context: &context,
                    execution_id,
                    job_name: &definition.name,
                    workflow_name: None,
                    trigger: child_trigger,
                    max_retries: step.retries,
                    retry_delay_secs: step.retry_delay,
                })
                .await?;
            context.insert(step.name.clone(), Value::Object(output));
            completed.insert(step.name.clone());
        }

        for step in &definition.workflows {
            require_dependencies(&definition.name, step, &completed)?;
            let child_input = params::merge(&context, &step.params);
            let returned = self
                .run_workflow(
                    &step.reference,
                    child_input,
                    execution_id,
                    &definition.name,
                    child_trigger,
                )
                .await?;
            context.insert(step.name.clone(), Value::Object(returned));
            completed.insert(step.name.clone());
        }

        for step in &definition.jobs {
            require_dependencies(&definition.name, step, &completed)?;
            let child_input = params::merge(&context, &step.params);
            // Child jobs inherit the execution id and the *incoming* trigger
            // label, keeping the tree attributed to its root.
            let returned = self
                .run_job(
                    &step.reference,
                    child_input,
                    trigger.clone(),
                    Some(execution_id),
                    true,
                )
                .await?;
            context.insert(step.name.clone(), Value::Object(returned));
            completed.insert(step.name.clone());
        }

        Ok(context)
    }
}

fn require_dependencies(
    job_name: &str,
    step: &Step,
    completed: &std::collections::HashSet<String>,
) -> Result<()> {
    let unmet: Vec<&str> = step
        .depends_on
        .iter()
        .filter(|dep| !completed.contains(*dep))
        .map(String::as_str)
        .collect();

    if unmet.is_empty() {
        Ok(())
    } else {
        bail!(
            "job '{}' step '{}' has unsatisfied dependencies: {}",
            job_name,
            step.name,
            unmet.join(", ")
        )
    }
}
