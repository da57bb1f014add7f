//! Engine configuration
//!
//! One JSON file configures the engine's surroundings: which store backend to
//! use, where logs go, and where the manifest and runtime registry live.
//! Every path is resolved relative to the configuration file, and a missing
//! configuration file simply yields the defaults (file-backed store next to
//! the manifest).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

fn default_poll_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub provider: String,
    pub connection_string: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Poll cadence of the daemon mode; unused by one-shot CLI runs.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(default)]
    pub runtimes: Option<String>,
    #[serde(default)]
    pub integrations: Option<serde_json::Value>,
    #[serde(default)]
    pub documentation: Option<serde_json::Value>,

    #[serde(skip)]
    base_dir: PathBuf,
}

impl EngineConfig {
    /// Read the configuration at `path`; an absent file yields defaults
    /// anchored at the file's directory.
    pub fn load(path: &Path) -> Result<EngineConfig> {
        let base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<EngineConfig>(&raw)
                .with_context(|| format!("invalid config {}", path.display()))?
        } else {
            EngineConfig::default()
        };
        config.base_dir = base_dir;
        Ok(config)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(self.manifest.as_deref().unwrap_or("manifest.json"))
    }

    pub fn runtimes_path(&self) -> PathBuf {
        self.resolve(self.runtimes.as_deref().unwrap_or("runtimes.json"))
    }

    /// Document path of the file-backed store.
    pub fn data_file(&self) -> PathBuf {
        self.resolve("maestro-data.json")
    }

    pub fn log_directory(&self) -> Option<PathBuf> {
        self.logging
            .directory
            .as_deref()
            .map(|directory| self.resolve(directory))
    }

    fn resolve(&self, value: &str) -> PathBuf {
        let candidate = Path::new(value);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = EngineConfig::load(Path::new("/nonexistent/maestro.json")).unwrap();
        assert!(config.database.is_none());
        assert_eq!(config.service.poll_interval_seconds, 30);
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("/nonexistent/manifest.json")
        );
    }

    #[test]
    fn test_paths_resolve_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maestro.json");
        std::fs::write(
            &path,
            r#"{
                "database": {"provider": "postgres", "connectionString": "postgres://localhost/maestro"},
                "logging": {"directory": "logs"},
                "service": {"pollIntervalSeconds": 5},
                "manifest": "conf/manifest.json"
            }"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.database.as_ref().unwrap().provider, "postgres");
        assert_eq!(config.service.poll_interval_seconds, 5);
        assert_eq!(config.manifest_path(), dir.path().join("conf/manifest.json"));
        assert_eq!(config.log_directory(), Some(dir.path().join("logs")));
    }
}
