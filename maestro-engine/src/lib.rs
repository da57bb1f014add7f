//! Maestro Engine
//!
//! The execution core:
//! - Task runner: one task in one child process, typed file I/O, retry
//! - Workflow scheduler: dependency-ordered step execution with live state
//! - Job driver: inline tasks, workflows, and child jobs under one execution id
//! - Query service: execution trees and filtered lists over the recorded history
//!
//! The engine drives one execution tree at a time on a single logical thread
//! of control; steps run sequentially in dependency order. Every record the
//! tree produces shares the correlation id allocated at the top-level job
//! invocation.

mod job;
mod query;
mod task_runner;
mod workflow;

use std::sync::Arc;

use maestro_manifest::{ManifestRegistry, RuntimeResolver};
use maestro_store::Store;

pub use query::{ExecutionFilter, ExecutionKind, ExecutionSummary, SortKey};
pub use task_runner::TaskRun;

/// One engine instance: a manifest, a runtime registry, and a store.
///
/// Engines are cheap handles over shared state; several may coexist in one
/// process with independent manifests.
pub struct Engine {
    registry: Arc<ManifestRegistry>,
    runtimes: Arc<RuntimeResolver>,
    store: Arc<dyn Store>,
}

impl Engine {
    pub fn new(
        registry: Arc<ManifestRegistry>,
        runtimes: Arc<RuntimeResolver>,
        store: Arc<dyn Store>,
    ) -> Engine {
        Engine {
            registry,
            runtimes,
            store,
        }
    }

    pub fn registry(&self) -> &ManifestRegistry {
        &self.registry
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}

/// Host identity recorded in `CreatedBy`.
pub(crate) fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}
