//! Task runner
//!
//! Executes one task step in an isolated child process:
//! - Composes the input map (step params override inherited context) and
//!   writes it to a per-execution temp file
//! - Upserts the `TaskExecutions` row to `Running` before the child spawns
//! - Streams child stdout: every line is echoed, and `STATE: <text>` lines
//!   update the row's live `State` column best-effort
//! - Retries non-zero exits (spawn failures count the same) up to
//!   `max_retries` with a fixed delay between attempts
//! - Ingests the output JSON and writes the terminal row update after stdout
//!   is fully drained, so the final write always wins over late STATE lines

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use maestro_core::domain::{TaskExecutionRecord, TaskStatus, TriggerType};
use maestro_core::params::{self, Params};
use maestro_store::repository::tasks;

use crate::Engine;

static STATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^STATE:\s*(.+)$").expect("valid state regex"));

/// PowerShell-family runtimes go through the splatting wrapper.
const WRAPPER_RUNTIMES: [&str; 2] = ["pwsh", "powershell"];

const TASK_WRAPPER: &str = include_str!("../assets/task_wrapper.ps1");

/// One task invocation
pub struct TaskRun<'a> {
    /// Name of the task definition in the manifest
    pub task_ref: &'a str,
    /// Step name; keys the persisted execution row
    pub step_name: &'a str,
    /// Step parameters (override context on collision)
    pub input_params: &'a Params,
    /// Accumulated context inherited from the enclosing driver
    pub input_context: &'a Params,
    pub execution_id: Uuid,
    pub job_name: &'a str,
    pub workflow_name: Option<&'a str>,
    pub trigger: &'a TriggerType,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

struct AttemptOutcome {
    stdout: String,
    stderr: String,
    exit_code: i64,
}

impl Engine {
    /// Run one task step to completion and return its output map.
    ///
    /// The caller decides what the step's failure means; this function has
    /// already persisted the `Failed` row when it returns an error.
    pub async fn run_task(&self, run: TaskRun<'_>) -> Result<Params> {
        let task = self.registry().task(run.task_ref)?;
        let script = self.registry().resolve_file(&task.file);

        let merged_input = params::merge(run.input_context, run.input_params);

        let temp_dir = std::env::temp_dir();
        let input_path = temp_dir.join(format!("{}-{}-in.json", run.execution_id, run.step_name));
        let output_path = temp_dir.join(format!("{}-{}-out.json", run.execution_id, run.step_name));
        tokio::fs::write(&input_path, serde_json::to_vec_pretty(&merged_input)?)
            .await
            .with_context(|| format!("failed to write task input {}", input_path.display()))?;

        let uses_wrapper = WRAPPER_RUNTIMES.contains(&task.runtime.as_str());
        let wrapper_path = if uses_wrapper {
            let path = temp_dir.join(format!("{}-{}-wrapper.ps1", run.execution_id, run.step_name));
            tokio::fs::write(&path, TASK_WRAPPER)
                .await
                .with_context(|| format!("failed to write task wrapper {}", path.display()))?;
            Some(path)
        } else {
            None
        };

        let started_at = Utc::now();
        let record = TaskExecutionRecord {
            execution_id: run.execution_id,
            task_id: run.step_name.to_string(),
            job_name: run.job_name.to_string(),
            workflow_name: run.workflow_name.map(str::to_string),
            trigger_type: run.trigger.clone(),
            input_data: Some(merged_input.clone()),
            output_data: None,
            execution_log: None,
            error_log: None,
            status: TaskStatus::Running,
            state: TaskStatus::Running.as_str().to_string(),
            started_at: Some(started_at),
            ended_at: None,
            runtime_ms: None,
            exit_code: None,
            attempt: 1,
            max_retries: i64::from(run.max_retries),
        };
        tasks::upsert_dispatch(self.store(), &record).await?;

        info!(
            "Dispatching task step '{}' (task '{}', execution {})",
            run.step_name, run.task_ref, run.execution_id
        );

        let max_attempts = i64::from(run.max_retries) + 1;
        let mut stdout_log = String::new();
        let mut error_log = String::new();
        let mut exit_code: i64 = -1;
        let mut succeeded = false;

        for attempt in 1..=max_attempts {
            let runtime_path = self
                .runtimes
                .resolve(&task.runtime, task.runtime_env.as_deref());

            let outcome = self
                .spawn_attempt(
                    &runtime_path,
                    wrapper_path.as_deref(),
                    &script,
                    &input_path,
                    &output_path,
                    run.execution_id,
                    run.step_name,
                )
                .await;

            match outcome {
                Ok(outcome) => {
                    stdout_log = outcome.stdout;
                    error_log = outcome.stderr;
                    exit_code = outcome.exit_code;
                    if exit_code == 0 {
                        succeeded = true;
                        break;
                    }
                    debug!(
                        "Task step '{}' attempt {}/{} exited with {}",
                        run.step_name, attempt, max_attempts, exit_code
                    );
                }
                Err(err) => {
                    // A spawn failure consumes an attempt exactly like a
                    // non-zero exit.
                    stdout_log.clear();
                    error_log = format!("{:#}", err);
                    exit_code = -1;
                    debug!(
                        "Task step '{}' attempt {}/{} failed to spawn: {:#}",
                        run.step_name, attempt, max_attempts, err
                    );
                }
            }

            if attempt < max_attempts {
                tasks::mark_retrying(
                    self.store(),
                    run.execution_id,
                    run.step_name,
                    attempt + 1,
                    max_attempts,
                )
                .await?;
                tokio::time::sleep(std::time::Duration::from_secs(run.retry_delay_secs)).await;
            }
        }

        let output = read_output(&output_path).await;
        let ended_at = Utc::now();
        let runtime_ms = (ended_at - started_at).num_milliseconds();

        remove_quietly(&input_path).await;
        remove_quietly(&output_path).await;
        if let Some(path) = &wrapper_path {
            remove_quietly(path).await;
        }

        if succeeded {
            let state = output
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or(TaskStatus::Completed.as_str());
            tasks::finish_success(
                self.store(),
                run.execution_id,
                run.step_name,
                state,
                ended_at,
                runtime_ms,
                &stdout_log,
                &output,
            )
            .await?;
            info!("Task step '{}' completed in {} ms", run.step_name, runtime_ms);
            Ok(output)
        } else {
            tasks::finish_failure(
                self.store(),
                run.execution_id,
                run.step_name,
                &error_log,
                ended_at,
                runtime_ms,
                exit_code,
            )
            .await?;
            bail!(
                "task step '{}' failed with exit code {} after {} attempt(s)",
                run.step_name,
                exit_code,
                max_attempts
            );
        }
    }

    /// Spawn one attempt and drain its output.
    ///
    /// Stdout is consumed line-by-line in emission order; the terminal row
    /// update happens only after this returns, so STATE writes can never
    /// outlive the final status.
    #[allow(clippy::too_many_arguments)]
    async fn spawn_attempt(
        &self,
        runtime_path: &str,
        wrapper: Option<&Path>,
        script: &Path,
        input_path: &Path,
        output_path: &Path,
        execution_id: Uuid,
        step_name: &str,
    ) -> Result<AttemptOutcome> {
        let mut command = Command::new(runtime_path);
        match wrapper {
            Some(wrapper) => {
                command
                    .arg("-NoProfile")
                    .arg("-File")
                    .arg(wrapper)
                    .arg("-ScriptPath")
                    .arg(script)
                    .arg("-InputFile")
                    .arg(input_path)
                    .arg("-OutputFile")
                    .arg(output_path);
            }
            None => {
                command
                    .arg(script)
                    .arg("-InputFile")
                    .arg(input_path)
                    .arg("-OutputFile")
                    .arg(output_path);
            }
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn runtime '{}'", runtime_path))?;

        let stdout = child
            .stdout
            .take()
            .context("child stdout was not captured")?;
        let stderr = child
            .stderr
            .take()
            .context("child stderr was not captured")?;

        let stderr_task = tokio::spawn(async move {
            let mut buffer = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut buffer).await;
            buffer
        });

        let mut log = String::new();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            println!("{}", line);
            if let Some(captures) = STATE_RE.captures(&line) {
                let state = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                if let Err(err) =
                    tasks::update_state(self.store(), execution_id, step_name, state).await
                {
                    warn!(
                        "failed to record live state for step '{}': {}",
                        step_name, err
                    );
                }
            }
            log.push_str(&line);
            log.push('\n');
        }

        let status = child.wait().await.context("failed to await child process")?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        Ok(AttemptOutcome {
            stdout: log,
            stderr: stderr_text,
            exit_code: status.code().map(i64::from).unwrap_or(-1),
        })
    }
}

/// Read the task's output file; missing, empty, or unparsable output is an
/// empty map.
async fn read_output(path: &PathBuf) -> Params {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => match params::from_json_str(&raw) {
            Ok(map) => map,
            Err(err) => {
                warn!("ignoring unparsable task output {}: {}", path.display(), err);
                Params::new()
            }
        },
        Err(_) => Params::new(),
    }
}

async fn remove_quietly(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_line_matching() {
        let captures = STATE_RE.captures("STATE: halfway there").unwrap();
        assert_eq!(captures.get(1).unwrap().as_str(), "halfway there");

        assert!(STATE_RE.captures("STATE:compact").is_some());
        assert!(STATE_RE.captures("  STATE: indented").is_none());
        assert!(STATE_RE.captures("NOSTATE: x").is_none());
        assert!(STATE_RE.captures("STATE:").is_none());
    }

    #[test]
    fn test_wrapper_runtime_detection() {
        assert!(WRAPPER_RUNTIMES.contains(&"pwsh"));
        assert!(WRAPPER_RUNTIMES.contains(&"powershell"));
        assert!(!WRAPPER_RUNTIMES.contains(&"python"));
    }

    #[tokio::test]
    async fn test_read_output_missing_file_is_empty() {
        let path = std::env::temp_dir().join("maestro-definitely-missing-out.json");
        assert!(read_output(&path).await.is_empty());
    }
}
