//! Runtime resolution
//!
//! Maps a task's declared `(runtime, env)` pair to an executable path via the
//! runtime registry file. Resolution never fails: an unknown runtime degrades
//! to the runtime name itself, interpreted as a command on PATH.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::ManifestError;

const DEFAULT_ENV: &str = "default";

/// Runtime registry: `runtime -> env -> executable path`
#[derive(Debug, Default, Deserialize)]
pub struct RuntimeResolver {
    #[serde(flatten)]
    runtimes: BTreeMap<String, BTreeMap<String, String>>,
}

impl RuntimeResolver {
    /// Load the registry file; an absent file yields an empty registry so
    /// every runtime resolves through the PATH fallback.
    pub fn load(path: impl AsRef<Path>) -> Result<RuntimeResolver, ManifestError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "runtime registry {} not found, resolving via PATH only",
                path.display()
            );
            return Ok(RuntimeResolver::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve in order: exact `(runtime, env)`, then `(runtime, "default")`,
    /// then the literal runtime name.
    pub fn resolve(&self, runtime: &str, env: Option<&str>) -> String {
        let env = env.unwrap_or(DEFAULT_ENV);

        if let Some(envs) = self.runtimes.get(runtime) {
            if let Some(path) = envs.get(env) {
                return path.clone();
            }
            if let Some(path) = envs.get(DEFAULT_ENV) {
                return path.clone();
            }
        }

        runtime.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> RuntimeResolver {
        serde_json::from_str(
            r#"{
                "pwsh": {"default": "/usr/bin/pwsh", "lts": "/opt/pwsh7/pwsh"},
                "python": {"default": "/usr/bin/python3"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_exact_env_match() {
        assert_eq!(resolver().resolve("pwsh", Some("lts")), "/opt/pwsh7/pwsh");
    }

    #[test]
    fn test_falls_back_to_default_env() {
        assert_eq!(resolver().resolve("pwsh", Some("beta")), "/usr/bin/pwsh");
        assert_eq!(resolver().resolve("python", None), "/usr/bin/python3");
    }

    #[test]
    fn test_unknown_runtime_degrades_to_path_lookup() {
        assert_eq!(resolver().resolve("ruby", None), "ruby");
        assert_eq!(RuntimeResolver::default().resolve("sh", Some("x")), "sh");
    }
}
