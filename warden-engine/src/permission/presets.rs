//! Pre-configured service setups for common use cases
//!
//! Provides ready-to-use builders that applications can use directly or as
//! starting points for customization.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::evaluator::Evaluator;
use crate::audit::{AuditSink, FileAuditSink, MemoryAuditSink, NullAuditSink};
use crate::auth::{AuthProvider, SessionAuth};
use crate::config::{ConfigError, EngineConfig};
use crate::registry::RoleRegistry;
use crate::service::PermissionService;
use crate::store::{FileRoleStore, MemoryRoleStore, ReadOnlyRoleStore, RoleStore};

/// Builder for a [`PermissionService`]
///
/// Anything not set explicitly is derived from the [`EngineConfig`]: a file
/// store at the configured roles path, a file audit sink when an audit file
/// is configured, and a fresh [`SessionAuth`].
pub struct PermissionServiceBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn RoleStore>>,
    auth: Option<Arc<dyn AuthProvider>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl PermissionServiceBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            store: None,
            auth: None,
            audit: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the application name (used for default paths)
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    /// Set the distinguished super-role
    pub fn super_role(mut self, name: impl Into<String>) -> Self {
        self.config.super_role = name.into();
        self
    }

    /// Reject role mutations
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Audit every access check
    pub fn audit_checks(mut self, enabled: bool) -> Self {
        self.config.audit_checks = enabled;
        self
    }

    /// Set the role store
    pub fn store(mut self, store: impl RoleStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set the auth provider
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the audit sink
    pub fn audit(mut self, audit: impl AuditSink + 'static) -> Self {
        self.audit = Some(Arc::new(audit));
        self
    }

    /// The configuration the service will be built with
    pub fn engine_config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build the service
    pub fn build(self) -> Result<PermissionService, PresetError> {
        self.config.validate()?;

        let store: Arc<dyn RoleStore> = match self.store {
            Some(s) => s,
            None => {
                let store = FileRoleStore::new(self.config.roles_path())
                    .map_err(|e| PresetError::StoreInit(e.to_string()))?;
                Arc::new(store)
            }
        };
        let store: Arc<dyn RoleStore> = if self.config.read_only {
            Arc::new(ReadOnlyRoleStore::new(store))
        } else {
            store
        };

        let audit: Arc<dyn AuditSink> = match (self.audit, &self.config.audit_file) {
            (Some(audit), _) => audit,
            (None, Some(path)) => Arc::new(
                FileAuditSink::new(path).map_err(|e| PresetError::AuditInit(e.to_string()))?,
            ),
            (None, None) => Arc::new(NullAuditSink),
        };

        let auth = self
            .auth
            .unwrap_or_else(|| Arc::new(SessionAuth::new()));

        let registry = RoleRegistry::with_protected_role(store, &self.config.super_role);
        let evaluator = Evaluator::new(self.config.super_role.as_str());

        tracing::debug!(
            app = %self.config.app_name,
            super_role = %self.config.super_role,
            read_only = self.config.read_only,
            "Permission service configured"
        );

        Ok(PermissionService::new(registry, evaluator, auth, audit)
            .with_check_auditing(self.config.audit_checks))
    }
}

impl Default for PermissionServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for preset initialization
#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("Failed to initialize store: {0}")]
    StoreInit(String),

    #[error("Failed to initialize audit: {0}")]
    AuditInit(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ConfigError> for PresetError {
    fn from(e: ConfigError) -> Self {
        PresetError::InvalidConfig(e.to_string())
    }
}

// ============================================================================
// Preset Configurations
// ============================================================================

/// Preset configurations for common use cases
pub struct Presets;

impl Presets {
    /// Testing mode (in-memory, no persistence)
    ///
    /// - Seeded in-memory role store
    /// - Memory-based audit
    pub fn testing() -> PermissionServiceBuilder {
        PermissionServiceBuilder::new()
            .store(MemoryRoleStore::seeded())
            .audit(MemoryAuditSink::new())
    }

    /// File-backed mode for an application
    ///
    /// - Roles at `<config_dir>/<app>/roles.json`
    /// - JSONL audit log at `<config_dir>/<app>/audit.jsonl`
    pub fn file_backed(app_name: &str) -> Result<PermissionServiceBuilder, PresetError> {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(app_name);

        let store = FileRoleStore::new(config_dir.join("roles.json"))
            .map_err(|e| PresetError::StoreInit(e.to_string()))?;

        let audit = FileAuditSink::new(config_dir.join("audit.jsonl"))
            .map_err(|e| PresetError::AuditInit(e.to_string()))?;

        Ok(PermissionServiceBuilder::new()
            .app_name(app_name)
            .store(store)
            .audit(audit))
    }

    /// Read-only mode over a provisioned roles file
    ///
    /// - Read-only file store
    /// - No audit trail
    pub fn read_only(roles_file: impl AsRef<Path>) -> Result<PermissionServiceBuilder, PresetError> {
        let store = FileRoleStore::new(roles_file)
            .map_err(|e| PresetError::StoreInit(e.to_string()))?;

        Ok(PermissionServiceBuilder::new()
            .store(ReadOnlyRoleStore::new(store))
            .audit(NullAuditSink)
            .read_only(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryError;
    use crate::store::{RoleDocument, StoreError};
    use warden_api::{RoleDraft, RoleId};

    #[tokio::test]
    async fn test_builder() {
        let service = PermissionServiceBuilder::new()
            .app_name("test-app")
            .super_role("root")
            .store(MemoryRoleStore::new())
            .audit(NullAuditSink)
            .build()
            .unwrap();

        assert_eq!(service.super_role(), "root");
        assert_eq!(service.registry().protected_role(), "root");
        assert!(service.list_roles().await.unwrap().is_empty());
    }

    #[test]
    fn test_builder_rejects_invalid_super_role() {
        let result = PermissionServiceBuilder::new()
            .super_role("Root User")
            .store(MemoryRoleStore::new())
            .build();
        assert!(matches!(result, Err(PresetError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_testing_preset() {
        let service = Presets::testing().build().unwrap();
        assert_eq!(service.list_roles().await.unwrap().len(), 5);
        assert!(!service.is_loaded());
    }

    #[tokio::test]
    async fn test_read_only_flag_wraps_store() {
        let service = Presets::testing().read_only(true).build().unwrap();
        let draft = RoleDraft::new("clerk", "Clerk").unwrap();

        assert!(matches!(
            service.create_role(draft).await,
            Err(RegistryError::Store(StoreError::ReadOnly))
        ));
    }

    #[tokio::test]
    async fn test_read_only_preset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roles.json");
        FileRoleStore::initialize(&path, RoleDocument::seeded()).unwrap();

        let service = Presets::read_only(&path).unwrap().build().unwrap();
        assert_eq!(service.list_roles().await.unwrap().len(), 5);
        assert!(service.delete_role(RoleId(5)).await.is_err());
        assert!(service.find_role("admin_staff").await.unwrap().is_some());
    }

    #[test]
    fn test_default_store_uses_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let audit_path = dir.path().join("audit.jsonl");
        let config = EngineConfig {
            roles_file: Some(dir.path().join("roles.json")),
            audit_file: Some(audit_path.clone()),
            ..Default::default()
        };

        let service = PermissionServiceBuilder::new().config(config).build();
        assert!(service.is_ok());
        assert!(audit_path.exists());
    }
}
