//! Engine configuration
//!
//! Read from a JSON file or built from defaults. Every field is optional in
//! the file; missing fields take their default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use warden_api::{RoleName, DEFAULT_SUPER_ROLE};

use crate::store::default_roles_path;

/// Default application name, used for config-directory paths
pub const DEFAULT_APP_NAME: &str = "warden";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Application name for default paths under the config directory
    pub app_name: String,
    /// Role that bypasses every check and can never be deleted
    pub super_role: String,
    /// Roles file; defaults to `<config_dir>/<app_name>/roles.json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles_file: Option<PathBuf>,
    /// JSONL audit log; no audit trail when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_file: Option<PathBuf>,
    /// Also audit individual access checks
    pub audit_checks: bool,
    /// Reject every role mutation
    pub read_only: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            super_role: DEFAULT_SUPER_ROLE.to_string(),
            roles_file: None,
            audit_file: None,
            audit_checks: false,
            read_only: false,
        }
    }
}

impl EngineConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "Loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::Invalid("app_name must not be empty".into()));
        }
        RoleName::new(self.super_role.as_str())
            .map_err(|e| ConfigError::Invalid(format!("super_role: {}", e)))?;
        Ok(())
    }

    /// The effective roles file path
    pub fn roles_path(&self) -> PathBuf {
        self.roles_file
            .clone()
            .unwrap_or_else(|| default_roles_path(&self.app_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.super_role, DEFAULT_SUPER_ROLE);
        assert!(config.validate().is_ok());
        assert!(config.roles_path().ends_with("warden/roles.json"));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.json");
        std::fs::write(&path, r#"{"super_role": "root", "audit_checks": true}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.super_role, "root");
        assert!(config.audit_checks);
        assert_eq!(config.app_name, DEFAULT_APP_NAME);
        assert!(!config.read_only);
    }

    #[test]
    fn test_rejects_invalid_super_role() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.json");
        std::fs::write(&path, r#"{"super_role": "Chief Of Police"}"#).unwrap();

        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.json");
        std::fs::write(&path, r#"{"superRole": "root"}"#).unwrap();

        assert!(matches!(EngineConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_explicit_roles_file() {
        let config = EngineConfig {
            roles_file: Some(PathBuf::from("/srv/warden/roles.json")),
            ..Default::default()
        };
        assert_eq!(config.roles_path(), PathBuf::from("/srv/warden/roles.json"));
    }
}
