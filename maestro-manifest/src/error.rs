//! Error types for manifest loading and validation
//!
//! Validation failures are aggregated: a load reports every offending name or
//! key it found, not just the first one.

use std::path::PathBuf;

use thiserror::Error;

/// A re-declared JSON object key, located by line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey {
    pub line: usize,
    pub key: String,
}

impl std::fmt::Display for DuplicateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: \"{}\"", self.line, self.key)
    }
}

/// Errors raised while loading the manifest or resolving definitions
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Duplicate keys would be silently collapsed by a lenient parser, so
    /// they are rejected before parsing.
    #[error("duplicate JSON keys in {}: {}", .path.display(), join_keys(.duplicates))]
    DuplicateKeys {
        path: PathBuf,
        duplicates: Vec<DuplicateKey>,
    },

    #[error("invalid names (must match ^[A-Za-z0-9_]+$): {}", .0.join(", "))]
    InvalidNames(Vec<String>),

    #[error("names declared more than once across tasks/workflows/jobs: {}", .0.join(", "))]
    DuplicateNames(Vec<String>),

    #[error("invalid definition '{name}': {}", .offenses.join("; "))]
    InvalidDefinition { name: String, offenses: Vec<String> },

    #[error("unknown task '{0}'")]
    UnknownTask(String),

    #[error("unknown workflow '{0}'")]
    UnknownWorkflow(String),

    #[error("unknown job '{0}'")]
    UnknownJob(String),
}

fn join_keys(duplicates: &[DuplicateKey]) -> String {
    duplicates
        .iter()
        .map(DuplicateKey::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
