//! # Runtime Configuration
//!
//! Loaded from a TOML file, then overridden from the environment.
//!
//! ```toml
//! [runtime]
//! jobs_file = "jobs.toml"
//! reload_interval_secs = 60
//! admin_port = 9180
//!
//! [reconciler]
//! activation_timeout_ms = 10000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use trigger_reconciler::ReconcilerConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse runtime config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("reload_interval_secs must be at least 1")]
    ZeroReloadInterval,
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub runtime: RuntimeSection,
    pub reconciler: ReconcilerConfig,
}

/// The `[runtime]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Job definitions file
    pub jobs_file: PathBuf,
    /// Seconds between definition reloads
    pub reload_interval_secs: u64,
    /// Admin HTTP port; 0 disables the admin server
    pub admin_port: u16,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            jobs_file: PathBuf::from("jobs.toml"),
            reload_interval_secs: 60,
            admin_port: 9180,
        }
    }
}

impl RuntimeConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load the file named by `TR_CONFIG` (or `path`), or defaults if neither
    /// is given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os("TR_CONFIG").map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TR_JOBS_FILE`, `TR_ADMIN_PORT` and `TR_RELOAD_INTERVAL_SECS`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(file) = lookup("TR_JOBS_FILE") {
            self.runtime.jobs_file = PathBuf::from(file);
        }
        if let Some(port) = lookup("TR_ADMIN_PORT") {
            self.runtime.admin_port = port.parse().map_err(|_| ConfigError::InvalidValue {
                var: "TR_ADMIN_PORT",
                value: port,
            })?;
        }
        if let Some(secs) = lookup("TR_RELOAD_INTERVAL_SECS") {
            self.runtime.reload_interval_secs = secs.parse().map_err(|_| ConfigError::InvalidValue {
                var: "TR_RELOAD_INTERVAL_SECS",
                value: secs,
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.reload_interval_secs == 0 {
            return Err(ConfigError::ZeroReloadInterval);
        }
        Ok(())
    }

    #[must_use]
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.runtime.reload_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(RuntimeConfig::from_toml("").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_partial_tables() {
        let config = RuntimeConfig::from_toml(
            r#"
            [runtime]
            jobs_file = "/etc/triggers/jobs.toml"

            [reconciler]
            activation_timeout_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.runtime.jobs_file, PathBuf::from("/etc/triggers/jobs.toml"));
        assert_eq!(config.runtime.reload_interval_secs, 60);
        assert_eq!(config.reconciler.activation_timeout_ms, 500);
        assert_eq!(config.reconciler.deactivation_timeout_ms, 10_000);
    }

    #[test]
    fn test_unknown_type_is_parse_error() {
        let err = RuntimeConfig::from_toml("[runtime]\nadmin_port = \"high\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RuntimeConfig::default();
        config
            .apply_overrides(lookup(&[
                ("TR_JOBS_FILE", "other.toml"),
                ("TR_ADMIN_PORT", "0"),
                ("TR_RELOAD_INTERVAL_SECS", "5"),
            ]))
            .unwrap();

        assert_eq!(config.runtime.jobs_file, PathBuf::from("other.toml"));
        assert_eq!(config.runtime.admin_port, 0);
        assert_eq!(config.reload_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = RuntimeConfig::default();
        let err = config.apply_overrides(lookup(&[("TR_ADMIN_PORT", "99999")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "TR_ADMIN_PORT", .. }));
    }

    #[test]
    fn test_zero_interval_is_invalid() {
        let mut config = RuntimeConfig::default();
        config.runtime.reload_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroReloadInterval)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.toml");
        std::fs::write(&path, "[runtime]\nadmin_port = 9999\n").unwrap();

        let config = RuntimeConfig::from_file(&path).unwrap();
        assert_eq!(config.runtime.admin_port, 9999);

        let err = RuntimeConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
