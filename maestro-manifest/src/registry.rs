//! Manifest registry
//!
//! Loads `manifest.json`, validates it, and resolves names to on-disk
//! definition files. Load order:
//!
//! 1. Duplicate-key pre-scan of the raw text (fatal)
//! 2. JSON parse into the typed registry (fatal)
//! 3. Name validity, `^[A-Za-z0-9_]+$` (fatal, aggregated)
//! 4. Cross-type uniqueness across tasks/workflows/jobs (fatal, aggregated)
//! 5. File-existence check on every pointer (warning only)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::definition::{validate_steps, JobDefinition, WorkflowDefinition};
use crate::error::ManifestError;
use crate::scan::find_duplicate_keys;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid name regex"));

/// Registry pointer to a task script
#[derive(Debug, Clone, Deserialize)]
pub struct TaskPointer {
    pub file: String,
    pub runtime: String,
    #[serde(default, rename = "runtimeEnv")]
    pub runtime_env: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Registry pointer to a workflow or job definition file
#[derive(Debug, Clone, Deserialize)]
pub struct DefinitionPointer {
    pub file: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    tasks: BTreeMap<String, TaskPointer>,
    #[serde(default)]
    workflows: BTreeMap<String, DefinitionPointer>,
    #[serde(default)]
    jobs: BTreeMap<String, DefinitionPointer>,
    #[serde(default)]
    integrations: BTreeMap<String, serde_json::Value>,
}

/// The loaded, validated manifest
///
/// An explicit handle passed to the drivers; nothing is cached at module
/// scope, so independent engines can hold independent manifests.
#[derive(Debug)]
pub struct ManifestRegistry {
    base_dir: PathBuf,
    tasks: BTreeMap<String, TaskPointer>,
    workflows: BTreeMap<String, DefinitionPointer>,
    jobs: BTreeMap<String, DefinitionPointer>,
    integrations: BTreeMap<String, serde_json::Value>,
}

impl ManifestRegistry {
    /// Load and validate the manifest at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<ManifestRegistry, ManifestError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let duplicates = find_duplicate_keys(&raw);
        if !duplicates.is_empty() {
            return Err(ManifestError::DuplicateKeys {
                path: path.to_path_buf(),
                duplicates,
            });
        }

        let manifest: RawManifest =
            serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut invalid: Vec<String> = Vec::new();
        for name in manifest
            .tasks
            .keys()
            .chain(manifest.workflows.keys())
            .chain(manifest.jobs.keys())
        {
            if !NAME_RE.is_match(name) {
                invalid.push(name.clone());
            }
        }
        if !invalid.is_empty() {
            return Err(ManifestError::InvalidNames(invalid));
        }

        let mut seen = std::collections::HashSet::new();
        let mut collisions: Vec<String> = Vec::new();
        for name in manifest
            .tasks
            .keys()
            .chain(manifest.workflows.keys())
            .chain(manifest.jobs.keys())
        {
            if !seen.insert(name.clone()) && !collisions.contains(name) {
                collisions.push(name.clone());
            }
        }
        if !collisions.is_empty() {
            return Err(ManifestError::DuplicateNames(collisions));
        }

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let registry = ManifestRegistry {
            base_dir,
            tasks: manifest.tasks,
            workflows: manifest.workflows,
            jobs: manifest.jobs,
            integrations: manifest.integrations,
        };
        registry.warn_missing_files();

        Ok(registry)
    }

    /// Missing definition files are reported but tolerated: a manifest may
    /// legitimately point at scripts that only exist on the node that runs
    /// them.
    fn warn_missing_files(&self) {
        let pointers = self
            .tasks
            .iter()
            .map(|(name, p)| (name, p.file.as_str()))
            .chain(self.workflows.iter().map(|(name, p)| (name, p.file.as_str())))
            .chain(self.jobs.iter().map(|(name, p)| (name, p.file.as_str())));

        for (name, file) in pointers {
            let resolved = self.resolve_file(file);
            if !resolved.exists() {
                warn!(
                    "manifest entry '{}' references missing file {}",
                    name,
                    resolved.display()
                );
            }
        }
    }

    /// Resolve a manifest-relative file reference.
    pub fn resolve_file(&self, file: &str) -> PathBuf {
        let candidate = Path::new(file);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        }
    }

    pub fn task(&self, name: &str) -> Result<&TaskPointer, ManifestError> {
        self.tasks
            .get(name)
            .ok_or_else(|| ManifestError::UnknownTask(name.to_string()))
    }

    /// Read and validate the workflow definition behind `name`.
    pub fn workflow_def(&self, name: &str) -> Result<WorkflowDefinition, ManifestError> {
        let pointer = self
            .workflows
            .get(name)
            .ok_or_else(|| ManifestError::UnknownWorkflow(name.to_string()))?;

        let definition: WorkflowDefinition = self.read_definition(&pointer.file)?;
        validate_steps(name, &[&definition.tasks, &definition.workflows])?;
        Ok(definition)
    }

    /// Read and validate the job definition behind `name`.
    pub fn job_def(&self, name: &str) -> Result<JobDefinition, ManifestError> {
        let pointer = self
            .jobs
            .get(name)
            .ok_or_else(|| ManifestError::UnknownJob(name.to_string()))?;

        let definition: JobDefinition = self.read_definition(&pointer.file)?;
        validate_steps(
            name,
            &[&definition.tasks, &definition.workflows, &definition.jobs],
        )?;
        Ok(definition)
    }

    fn read_definition<T: serde::de::DeserializeOwned>(
        &self,
        file: &str,
    ) -> Result<T, ManifestError> {
        let path = self.resolve_file(file);
        let raw = std::fs::read_to_string(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ManifestError::Parse { path, source })
    }

    pub fn list_tasks(&self) -> impl Iterator<Item = (&String, &TaskPointer)> {
        self.tasks.iter()
    }

    pub fn list_workflows(&self) -> impl Iterator<Item = (&String, &DefinitionPointer)> {
        self.workflows.iter()
    }

    pub fn list_jobs(&self) -> impl Iterator<Item = (&String, &DefinitionPointer)> {
        self.jobs.iter()
    }

    pub fn list_integrations(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.integrations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_manifest(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("manifest.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_valid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("echo.sh"), "#!/bin/sh\n").unwrap();
        let path = write_manifest(
            &dir,
            r#"{
                "tasks": {"echo": {"file": "echo.sh", "runtime": "sh"}},
                "workflows": {},
                "jobs": {}
            }"#,
        );

        let registry = ManifestRegistry::load(&path).unwrap();
        assert_eq!(registry.list_tasks().count(), 1);
        assert_eq!(registry.task("echo").unwrap().runtime, "sh");
        assert!(registry.task("missing").is_err());
    }

    #[test]
    fn test_duplicate_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(&dir, r#"{"tasks": {}, "tasks": {}}"#);

        match ManifestRegistry::load(&path) {
            Err(ManifestError::DuplicateKeys { duplicates, .. }) => {
                assert_eq!(duplicates[0].key, "tasks");
            }
            other => panic!("expected DuplicateKeys, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_names_all_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            r#"{
                "tasks": {"bad name": {"file": "a.sh", "runtime": "sh"}},
                "jobs": {"worse-name": {"file": "j.json"}}
            }"#,
        );

        match ManifestRegistry::load(&path) {
            Err(ManifestError::InvalidNames(names)) => {
                assert!(names.contains(&"bad name".to_string()));
                assert!(names.contains(&"worse-name".to_string()));
            }
            other => panic!("expected InvalidNames, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_cross_type_name_collision_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            r#"{
                "tasks": {"sync": {"file": "sync.sh", "runtime": "sh"}},
                "workflows": {"sync": {"file": "sync.json"}}
            }"#,
        );

        match ManifestRegistry::load(&path) {
            Err(ManifestError::DuplicateNames(names)) => {
                assert_eq!(names, vec!["sync".to_string()]);
            }
            other => panic!("expected DuplicateNames, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_files_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            r#"{"tasks": {"ghost": {"file": "nowhere.sh", "runtime": "sh"}}}"#,
        );

        assert!(ManifestRegistry::load(&path).is_ok());
    }

    #[test]
    fn test_workflow_def_rejects_step_named_like_reference() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wf.json"),
            r#"{"name": "wf", "tasks": [{"name": "echo", "reference": "echo"}]}"#,
        )
        .unwrap();
        let path = write_manifest(&dir, r#"{"workflows": {"wf": {"file": "wf.json"}}}"#);

        let registry = ManifestRegistry::load(&path).unwrap();
        assert!(matches!(
            registry.workflow_def("wf"),
            Err(ManifestError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_reload_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            &dir,
            r#"{"tasks": {"echo": {"file": "echo.sh", "runtime": "sh"}}}"#,
        );

        let first = ManifestRegistry::load(&path).unwrap();
        let second = ManifestRegistry::load(&path).unwrap();
        let names_first: Vec<_> = first.list_tasks().map(|(n, _)| n.clone()).collect();
        let names_second: Vec<_> = second.list_tasks().map(|(n, _)| n.clone()).collect();
        assert_eq!(names_first, names_second);
    }
}
