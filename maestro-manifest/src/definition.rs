//! Workflow and job definition files
//!
//! Definitions are read on demand when a driver resolves a name; the manifest
//! itself only records where they live.

use serde::Deserialize;

use maestro_core::params::Params;

use crate::error::ManifestError;

fn default_retry_delay() -> u64 {
    5
}

/// One named entry inside a workflow or job.
///
/// `name` identifies the step (and keys its persisted execution row);
/// `reference` names the task, workflow, or job it invokes. The two must
/// differ so the recorded step is distinguishable from its target.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub name: String,
    pub reference: String,
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

/// A workflow: task steps plus nested workflow steps, scheduled as one DAG.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Step>,
    #[serde(default)]
    pub workflows: Vec<Step>,
}

/// A job: inline tasks, workflows, and child jobs, driven in that order.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Step>,
    #[serde(default)]
    pub workflows: Vec<Step>,
    #[serde(default)]
    pub jobs: Vec<Step>,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default, rename = "triggerType")]
    pub trigger_type: Option<String>,
}

/// Validate the step lists of one container, aggregating every offense.
///
/// Checks: step names unique across all lists, and `name != reference` for
/// each step.
pub(crate) fn validate_steps(
    definition_name: &str,
    groups: &[&[Step]],
) -> Result<(), ManifestError> {
    let mut offenses = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for group in groups {
        for step in *group {
            if step.name == step.reference {
                offenses.push(format!(
                    "step '{}' must not share its name with its reference",
                    step.name
                ));
            }
            if !seen.insert(step.name.clone()) {
                offenses.push(format!("step name '{}' declared more than once", step.name));
            }
        }
    }

    if offenses.is_empty() {
        Ok(())
    } else {
        Err(ManifestError::InvalidDefinition {
            name: definition_name.to_string(),
            offenses,
        })
    }
}
