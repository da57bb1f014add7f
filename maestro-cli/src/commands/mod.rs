//! Command handlers
//!
//! Each subcommand builds the engine from the configuration (manifest,
//! runtime registry, store backend) and delegates to its handler module.

mod get;
mod list;
mod run;
mod validate;

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Subcommand;
use serde_json::Value;

use maestro_engine::Engine;
use maestro_manifest::{ManifestRegistry, RuntimeResolver};
use maestro_store::{FileStore, PgStore, Store};

use crate::config::EngineConfig;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a job from the manifest
    Run {
        /// Job name
        job: String,

        /// Input parameter as key=value (value parsed as JSON when possible)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Trigger label: manual or scheduled (defaults to the definition's)
        #[arg(long)]
        trigger: Option<String>,
    },
    /// Run a single workflow
    Workflow {
        /// Workflow name
        name: String,

        /// Input parameter as key=value
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Run a single task
    Task {
        /// Task name
        name: String,

        /// Input parameter as key=value
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// List recorded executions
    List {
        /// Filter by status (Pending/Waiting/Running/Completed/Failed)
        #[arg(long)]
        status: Option<String>,

        /// Filter by kind: job, workflow, or task
        #[arg(long)]
        kind: Option<String>,

        /// Filter by name (case-insensitive substring)
        #[arg(long)]
        name: Option<String>,

        /// Sort key: started, ended, status, or runtime
        #[arg(long, default_value = "started")]
        sort: String,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Keep only the first N rows after sorting
        #[arg(long)]
        top: Option<usize>,
    },
    /// Show the execution tree behind one execution id
    Get {
        /// Execution id (UUID)
        execution_id: String,
    },
    /// Load and validate the manifest and every definition it references
    Validate,
}

/// Handle a CLI command
pub async fn handle_command(command: Commands, config: &EngineConfig) -> Result<()> {
    let registry = Arc::new(ManifestRegistry::load(config.manifest_path())?);
    let runtimes = Arc::new(RuntimeResolver::load(config.runtimes_path())?);
    let store = build_store(config).await?;
    let engine = Engine::new(registry, runtimes, store);

    match command {
        Commands::Run {
            job,
            params,
            trigger,
        } => run::run_job(&engine, &job, params, trigger).await,
        Commands::Workflow { name, params } => run::run_workflow(&engine, &name, params).await,
        Commands::Task { name, params } => run::run_task(&engine, &name, params).await,
        Commands::List {
            status,
            kind,
            name,
            sort,
            desc,
            top,
        } => list::list_executions(&engine, status, kind, name, &sort, desc, top).await,
        Commands::Get { execution_id } => get::get_execution(&engine, &execution_id).await,
        Commands::Validate => validate::validate(&engine),
    }
}

/// Select the store backend: an explicit database when configured, the
/// file-backed document otherwise.
async fn build_store(config: &EngineConfig) -> Result<Arc<dyn Store>> {
    match &config.database {
        Some(database) if database.provider.eq_ignore_ascii_case("postgres") => {
            Ok(Arc::new(PgStore::connect(&database.connection_string).await?))
        }
        Some(database) if database.provider.eq_ignore_ascii_case("file") => {
            Ok(Arc::new(FileStore::open(&database.connection_string)))
        }
        Some(database) => bail!("unsupported database provider '{}'", database.provider),
        None => Ok(Arc::new(FileStore::open(config.data_file()))),
    }
}

/// Parse `key=value`; the value is taken as JSON when it parses, as a plain
/// string otherwise, so `--param retries=3` and `--param region=eu` both work.
fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }
    let value = serde_json::from_str::<Value>(value)
        .unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub(crate) fn collect_params(pairs: Vec<(String, Value)>) -> maestro_core::params::Params {
    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_param_json_values() {
        assert_eq!(parse_param("retries=3").unwrap().1, json!(3));
        assert_eq!(parse_param("deep=true").unwrap().1, json!(true));
        assert_eq!(
            parse_param("window={\"days\": 7}").unwrap().1,
            json!({"days": 7})
        );
    }

    #[test]
    fn test_parse_param_plain_strings() {
        assert_eq!(parse_param("region=eu-west-1").unwrap().1, json!("eu-west-1"));
        // '=' in the value is kept.
        assert_eq!(parse_param("expr=a=b").unwrap().1, json!("a=b"));
    }

    #[test]
    fn test_parse_param_rejects_missing_separator() {
        assert!(parse_param("no_separator").is_err());
        assert!(parse_param("=value").is_err());
    }
}
