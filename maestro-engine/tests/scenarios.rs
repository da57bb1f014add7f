//! End-to-end scenarios against the file-backed store
//!
//! Task scripts are plain `/bin/sh` scripts using the engine's argument
//! convention: `<runtime> <script> -InputFile <in> -OutputFile <out>`, so
//! `$2` is the input path and `$4` the output path.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use maestro_core::domain::{ExecutionStatus, TaskStatus, TriggerType};
use maestro_core::params::Params;
use maestro_engine::{Engine, ExecutionFilter, ExecutionKind, TaskRun};
use maestro_manifest::{ManifestRegistry, RuntimeResolver};
use maestro_store::repository::{jobs, tasks, workflows};
use maestro_store::{FileStore, Store};

/// Copies the merged input JSON to the output file: output ≡ input ∪ context.
const COPY_INPUT_SH: &str = "cat \"$2\" > \"$4\"\n";

struct Harness {
    _dir: tempfile::TempDir,
    engine: Engine,
    store: Arc<dyn Store>,
}

impl Harness {
    fn new(manifest: &str, files: &[(&str, &str)]) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let manifest_path = dir.path().join("manifest.json");
        std::fs::write(&manifest_path, manifest).unwrap();

        let registry = Arc::new(ManifestRegistry::load(&manifest_path).unwrap());
        let runtimes = Arc::new(RuntimeResolver::default());
        let store: Arc<dyn Store> = Arc::new(FileStore::open(dir.path().join("data.json")));
        let engine = Engine::new(registry, runtimes, store.clone());

        Harness {
            _dir: dir,
            engine,
            store,
        }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}

fn params(value: serde_json::Value) -> Params {
    value.as_object().unwrap().clone()
}

#[tokio::test]
async fn linear_workflow_runs_in_dependency_order() {
    let harness = Harness::new(
        r#"{
            "tasks": {"copy_input": {"file": "copy.sh", "runtime": "sh"}},
            "workflows": {"pipeline": {"file": "pipeline.json"}},
            "jobs": {"linear_job": {"file": "linear_job.json"}}
        }"#,
        &[
            ("copy.sh", COPY_INPUT_SH),
            (
                "pipeline.json",
                r#"{
                    "name": "pipeline",
                    "tasks": [
                        {"name": "Extract", "reference": "copy_input"},
                        {"name": "Transform", "reference": "copy_input", "dependsOn": ["Extract"]},
                        {"name": "Load", "reference": "copy_input", "dependsOn": ["Transform"]}
                    ]
                }"#,
            ),
            (
                "linear_job.json",
                r#"{
                    "name": "linear_job",
                    "workflows": [{"name": "run_pipeline", "reference": "pipeline"}]
                }"#,
            ),
        ],
    );

    let context = harness
        .engine
        .run_job("linear_job", Params::new(), TriggerType::Manual, None, false)
        .await
        .unwrap();
    assert!(context.contains_key("run_pipeline"));

    let job_rows = jobs::all(harness.store()).await.unwrap();
    assert_eq!(job_rows.len(), 1);
    let job = &job_rows[0];
    assert_eq!(job.status, ExecutionStatus::Completed);

    let task_rows = tasks::by_execution(harness.store(), job.job_id).await.unwrap();
    assert_eq!(task_rows.len(), 3);
    for row in &task_rows {
        assert_eq!(row.execution_id, job.job_id);
        assert_eq!(row.status, TaskStatus::Completed);
        assert!(row.started_at.unwrap() <= row.ended_at.unwrap());
    }

    let by_name = |name: &str| task_rows.iter().find(|r| r.task_id == name).unwrap();
    let extract = by_name("Extract");
    let transform = by_name("Transform");
    let load = by_name("Load");

    // A dependent step starts only after its dependency ended.
    assert!(transform.started_at.unwrap() >= extract.ended_at.unwrap());
    assert!(load.started_at.unwrap() >= transform.ended_at.unwrap());

    // The context grows step by step: Load saw both upstream outputs.
    let load_input = load.input_data.clone().unwrap();
    assert!(load_input.contains_key("Extract"));
    assert!(load_input.contains_key("Transform"));
}

#[tokio::test]
async fn diamond_merges_both_branches() {
    let harness = Harness::new(
        r#"{
            "tasks": {"copy_input": {"file": "copy.sh", "runtime": "sh"}},
            "workflows": {"diamond": {"file": "diamond.json"}},
            "jobs": {"diamond_job": {"file": "diamond_job.json"}}
        }"#,
        &[
            ("copy.sh", COPY_INPUT_SH),
            (
                "diamond.json",
                r#"{
                    "name": "diamond",
                    "tasks": [
                        {"name": "A", "reference": "copy_input", "params": {"seed": 7}},
                        {"name": "B", "reference": "copy_input", "dependsOn": ["A"]},
                        {"name": "C", "reference": "copy_input", "dependsOn": ["A"]},
                        {"name": "D", "reference": "copy_input", "dependsOn": ["B", "C"]}
                    ]
                }"#,
            ),
            (
                "diamond_job.json",
                r#"{
                    "name": "diamond_job",
                    "workflows": [{"name": "run_diamond", "reference": "diamond"}]
                }"#,
            ),
        ],
    );

    harness
        .engine
        .run_job("diamond_job", Params::new(), TriggerType::Manual, None, false)
        .await
        .unwrap();

    let job = jobs::all(harness.store()).await.unwrap().remove(0);
    let task_rows = tasks::by_execution(harness.store(), job.job_id).await.unwrap();
    assert_eq!(task_rows.len(), 4);

    let input_of = |name: &str| {
        task_rows
            .iter()
            .find(|r| r.task_id == name)
            .unwrap()
            .input_data
            .clone()
            .unwrap()
    };

    // B and C both observed A's output; A's output echoed its own params.
    assert_eq!(input_of("B")["A"]["seed"], json!(7));
    assert!(input_of("C").contains_key("A"));

    // D observed both branches merged.
    let d_input = input_of("D");
    assert!(d_input.contains_key("B"));
    assert!(d_input.contains_key("C"));

    let tree = harness.engine.get_execution(job.job_id).await.unwrap();
    let count = |kind: ExecutionKind| tree.iter().filter(|row| row.kind == kind).count();
    assert_eq!(count(ExecutionKind::Job), 1);
    assert_eq!(count(ExecutionKind::Workflow), 1);
    assert_eq!(count(ExecutionKind::Task), 4);
}

#[tokio::test]
async fn retry_succeeds_on_third_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let flaky = format!(
        "count_file=\"{}\"\n\
         n=$(cat \"$count_file\" 2>/dev/null || echo 0)\n\
         n=$((n + 1))\n\
         echo \"$n\" > \"$count_file\"\n\
         if [ \"$n\" -lt 3 ]; then\n\
           echo \"attempt $n failed\" >&2\n\
           exit 1\n\
         fi\n\
         echo '{{}}' > \"$4\"\n",
        counter.display()
    );

    let harness = Harness::new(
        r#"{
            "tasks": {"flaky": {"file": "flaky.sh", "runtime": "sh"}},
            "workflows": {"retry_wf": {"file": "retry_wf.json"}}
        }"#,
        &[
            ("flaky.sh", &flaky),
            (
                "retry_wf.json",
                r#"{
                    "name": "retry_wf",
                    "tasks": [
                        {"name": "persist", "reference": "flaky", "retries": 4, "retry_delay": 0}
                    ]
                }"#,
            ),
        ],
    );

    let execution_id = Uuid::new_v4();
    harness
        .engine
        .run_workflow(
            "retry_wf",
            Params::new(),
            execution_id,
            "adhoc",
            &TriggerType::Manual,
        )
        .await
        .unwrap();

    let record = tasks::get(harness.store(), execution_id, "persist")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.attempt, 3);
    assert_eq!(record.exit_code, Some(0));
    assert_eq!(record.max_retries, 4);
    assert!(record.attempt >= 1 && record.attempt <= record.max_retries + 1);
}

#[tokio::test]
async fn circular_dependency_fails_workflow_and_leaves_tasks_waiting() {
    let harness = Harness::new(
        r#"{
            "tasks": {"copy_input": {"file": "copy.sh", "runtime": "sh"}},
            "workflows": {"cycle": {"file": "cycle.json"}}
        }"#,
        &[
            ("copy.sh", COPY_INPUT_SH),
            (
                "cycle.json",
                r#"{
                    "name": "cycle",
                    "tasks": [
                        {"name": "X", "reference": "copy_input", "dependsOn": ["Y"]},
                        {"name": "Y", "reference": "copy_input", "dependsOn": ["X"]}
                    ]
                }"#,
            ),
        ],
    );

    let execution_id = Uuid::new_v4();
    let err = harness
        .engine
        .run_workflow(
            "cycle",
            Params::new(),
            execution_id,
            "adhoc",
            &TriggerType::Manual,
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Stuck waiting for dependencies"));
    assert!(err.to_string().contains("X"));
    assert!(err.to_string().contains("Y"));

    let workflow_rows = workflows::by_execution(harness.store(), execution_id)
        .await
        .unwrap();
    assert_eq!(workflow_rows.len(), 1);
    assert_eq!(workflow_rows[0].status, ExecutionStatus::Failed);

    // Unstarted steps keep their Waiting rows; only the workflow reports
    // the failure.
    let task_rows = tasks::by_execution(harness.store(), execution_id).await.unwrap();
    assert_eq!(task_rows.len(), 2);
    for row in &task_rows {
        assert_eq!(row.status, TaskStatus::Waiting);
        assert!(row.state.starts_with("Waiting for: "));
    }
}

#[test]
fn duplicate_manifest_key_fails_before_anything_runs() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join("manifest.json");
    std::fs::write(
        &manifest_path,
        r#"{"tasks": {"a": {"file": "a.sh", "runtime": "sh"}}, "tasks": {}}"#,
    )
    .unwrap();

    assert!(ManifestRegistry::load(&manifest_path).is_err());
}

#[tokio::test]
async fn child_job_shares_the_execution_id() {
    let harness = Harness::new(
        r#"{
            "tasks": {"copy_input": {"file": "copy.sh", "runtime": "sh"}},
            "jobs": {
                "parent_job": {"file": "parent_job.json"},
                "leaf_job": {"file": "leaf_job.json"}
            }
        }"#,
        &[
            ("copy.sh", COPY_INPUT_SH),
            (
                "parent_job.json",
                r#"{
                    "name": "parent_job",
                    "jobs": [{"name": "run_leaf", "reference": "leaf_job"}]
                }"#,
            ),
            (
                "leaf_job.json",
                r#"{
                    "name": "leaf_job",
                    "tasks": [{"name": "T", "reference": "copy_input"}]
                }"#,
            ),
        ],
    );

    harness
        .engine
        .run_job("parent_job", Params::new(), TriggerType::Manual, None, false)
        .await
        .unwrap();

    let job_rows = jobs::all(harness.store()).await.unwrap();
    assert_eq!(job_rows.len(), 2);
    let parent = job_rows.iter().find(|j| j.name == "parent_job").unwrap();
    let leaf = job_rows.iter().find(|j| j.name == "leaf_job").unwrap();

    // Composite key (JobId, Name): both rows share the correlation id.
    assert_eq!(parent.job_id, leaf.job_id);
    // The child inherits the incoming trigger label unchanged.
    assert_eq!(leaf.trigger_type, TriggerType::Manual);

    let task = tasks::get(harness.store(), parent.job_id, "T")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.execution_id, parent.job_id);
    assert_eq!(task.status, TaskStatus::Completed);
    // T runs under leaf_job, so its own trigger is attributed to it.
    assert_eq!(
        task.trigger_type,
        TriggerType::InvokedBy("leaf_job".to_string())
    );
}

#[tokio::test]
async fn state_lines_update_live_progress() {
    // The script reports progress, then fails; the failure path leaves State
    // untouched, so the last STATE line remains visible.
    let harness = Harness::new(
        r#"{
            "tasks": {"reporter": {"file": "reporter.sh", "runtime": "sh"}},
            "workflows": {"report_wf": {"file": "report_wf.json"}}
        }"#,
        &[
            (
                "reporter.sh",
                "echo \"STATE: halfway\"\necho \"plain log line\"\nexit 1\n",
            ),
            (
                "report_wf.json",
                r#"{
                    "name": "report_wf",
                    "tasks": [{"name": "report", "reference": "reporter"}]
                }"#,
            ),
        ],
    );

    let execution_id = Uuid::new_v4();
    let err = harness
        .engine
        .run_workflow(
            "report_wf",
            Params::new(),
            execution_id,
            "adhoc",
            &TriggerType::Manual,
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("report"));

    let record = tasks::get(harness.store(), execution_id, "report")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.state, "halfway");
    assert_eq!(record.exit_code, Some(1));
    assert!(record.error_log.is_some());
}

#[tokio::test]
async fn script_supplied_state_overrides_completed_label() {
    let harness = Harness::new(
        r#"{
            "tasks": {"labeler": {"file": "labeler.sh", "runtime": "sh"}},
            "workflows": {"label_wf": {"file": "label_wf.json"}}
        }"#,
        &[
            (
                "labeler.sh",
                "printf '{\"state\": \"synced 42 rows\", \"rows\": 42}' > \"$4\"\n",
            ),
            (
                "label_wf.json",
                r#"{
                    "name": "label_wf",
                    "tasks": [{"name": "sync", "reference": "labeler"}]
                }"#,
            ),
        ],
    );

    let execution_id = Uuid::new_v4();
    let context = harness
        .engine
        .run_workflow(
            "label_wf",
            Params::new(),
            execution_id,
            "adhoc",
            &TriggerType::Manual,
        )
        .await
        .unwrap();
    assert_eq!(context["sync"]["rows"], json!(42));

    let record = tasks::get(harness.store(), execution_id, "sync")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.state, "synced 42 rows");
    assert_eq!(record.output_data.unwrap()["rows"], json!(42));
}

#[tokio::test]
async fn failing_step_fails_workflow_and_job() {
    let harness = Harness::new(
        r#"{
            "tasks": {"boom": {"file": "boom.sh", "runtime": "sh"}},
            "workflows": {"fragile": {"file": "fragile.json"}},
            "jobs": {"fragile_job": {"file": "fragile_job.json"}}
        }"#,
        &[
            ("boom.sh", "echo \"going down\" >&2\nexit 3\n"),
            (
                "fragile.json",
                r#"{
                    "name": "fragile",
                    "tasks": [{"name": "explode", "reference": "boom"}]
                }"#,
            ),
            (
                "fragile_job.json",
                r#"{
                    "name": "fragile_job",
                    "workflows": [{"name": "run_fragile", "reference": "fragile"}]
                }"#,
            ),
        ],
    );

    let err = harness
        .engine
        .run_job("fragile_job", Params::new(), TriggerType::Manual, None, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("explode"));

    let job = jobs::all(harness.store()).await.unwrap().remove(0);
    assert_eq!(job.status, ExecutionStatus::Failed);

    let workflow_rows = workflows::by_execution(harness.store(), job.job_id)
        .await
        .unwrap();
    assert_eq!(workflow_rows[0].status, ExecutionStatus::Failed);

    let task = tasks::get(harness.store(), job.job_id, "explode")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.exit_code, Some(3));
    assert!(task.error_log.unwrap().contains("going down"));
}

#[tokio::test]
async fn standalone_task_invocation_round_trips_its_input() {
    let harness = Harness::new(
        r#"{"tasks": {"copy_input": {"file": "copy.sh", "runtime": "sh"}}}"#,
        &[("copy.sh", COPY_INPUT_SH)],
    );

    let execution_id = Uuid::new_v4();
    let context = params(json!({"upstream": {"rows": 3}}));
    let step_params = params(json!({"region": "eu", "upstream": "override"}));

    let output = harness
        .engine
        .run_task(TaskRun {
            task_ref: "copy_input",
            step_name: "adhoc_copy",
            input_params: &step_params,
            input_context: &context,
            execution_id,
            job_name: "adhoc_copy_run",
            workflow_name: None,
            trigger: &TriggerType::Manual,
            max_retries: 0,
            retry_delay_secs: 0,
        })
        .await
        .unwrap();

    // Round-trip: output ≡ input ∪ context, params winning collisions.
    assert_eq!(output["region"], json!("eu"));
    assert_eq!(output["upstream"], json!("override"));

    // No pre-registered row existed; the runner inserted one itself.
    let record = tasks::get(harness.store(), execution_id, "adhoc_copy")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.attempt, 1);
}

#[tokio::test]
async fn query_service_lists_and_reconstructs_trees() {
    let harness = Harness::new(
        r#"{
            "tasks": {"copy_input": {"file": "copy.sh", "runtime": "sh"}},
            "workflows": {"solo": {"file": "solo.json"}},
            "jobs": {"query_job": {"file": "query_job.json"}}
        }"#,
        &[
            ("copy.sh", COPY_INPUT_SH),
            (
                "solo.json",
                r#"{
                    "name": "solo",
                    "tasks": [{"name": "only", "reference": "copy_input"}]
                }"#,
            ),
            (
                "query_job.json",
                r#"{
                    "name": "query_job",
                    "tasks": [{"name": "inline", "reference": "copy_input"}]
                }"#,
            ),
        ],
    );

    harness
        .engine
        .run_job("query_job", Params::new(), TriggerType::Manual, None, false)
        .await
        .unwrap();

    let workflow_execution = Uuid::new_v4();
    harness
        .engine
        .run_workflow(
            "solo",
            Params::new(),
            workflow_execution,
            "adhoc",
            &TriggerType::Manual,
        )
        .await
        .unwrap();

    let all = harness
        .engine
        .list_executions(&ExecutionFilter::default())
        .await
        .unwrap();
    // 1 job + 1 workflow + 2 tasks.
    assert_eq!(all.len(), 4);

    let completed_tasks = harness
        .engine
        .list_executions(&ExecutionFilter {
            status: Some("Completed".into()),
            kind: Some(ExecutionKind::Task),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(completed_tasks.len(), 2);

    let top_one = harness
        .engine
        .list_executions(&ExecutionFilter {
            top: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(top_one.len(), 1);

    // No Jobs row behind a direct workflow invocation: the tree falls back
    // to the task rows alone.
    let fallback = harness.engine.get_execution(workflow_execution).await.unwrap();
    assert_eq!(fallback.len(), 1);
    assert_eq!(fallback[0].kind, ExecutionKind::Task);
    assert_eq!(fallback[0].name, "only");
}
