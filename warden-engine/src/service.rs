//! Permission service
//!
//! The one object consumers talk to. It owns the role registry and the
//! permission cache, asks the auth provider who is logged in, and keeps the
//! cache in step with session events.
//!
//! Build it once at startup and share it behind an `Arc`:
//!
//! ```rust,ignore
//! let auth = Arc::new(SessionAuth::new());
//! let service = Arc::new(Presets::testing().auth(auth.clone()).build()?);
//! let _listener = service.spawn_auth_listener();
//!
//! auth.login(CurrentUser::authenticated(UserId(3), "station_commander"));
//! ```

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use warden_api::{CurrentUser, PermissionSet, Role, RoleDraft, RoleId, RoleUpdate, UserId};

use crate::audit::{self, AuditEvent, AuditSink};
use crate::auth::{AuthEvent, AuthProvider};
use crate::permission::cache::{CacheState, PermissionCache, ResolvedPermissions};
use crate::permission::evaluator::{candidate_for, Decision, Evaluator};
use crate::registry::{RegistryError, RoleRegistry};

/// Errors from resolving a user's permissions
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("User {0} is not the authenticated user or has no role")]
    UserNotFound(UserId),

    #[error("Role '{role}' of user {user} does not exist")]
    RoleNotFound { user: UserId, role: String },

    #[error("Permission load for user {0} was superseded by a session change")]
    Superseded(UserId),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Shared entry point for permission checks and role administration
pub struct PermissionService {
    registry: RoleRegistry,
    cache: PermissionCache,
    evaluator: Evaluator,
    auth: Arc<dyn AuthProvider>,
    audit: Arc<dyn AuditSink>,
    audit_checks: bool,
}

impl PermissionService {
    pub fn new(
        registry: RoleRegistry,
        evaluator: Evaluator,
        auth: Arc<dyn AuthProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            cache: PermissionCache::new(),
            evaluator,
            auth,
            audit,
            audit_checks: false,
        }
    }

    /// Also audit every access check
    pub fn with_check_auditing(mut self, enabled: bool) -> Self {
        self.audit_checks = enabled;
        self
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn super_role(&self) -> &str {
        self.evaluator.super_role()
    }

    /// The authenticated principal, if any
    pub fn current_user(&self) -> Option<CurrentUser> {
        self.auth.current_user().filter(|u| u.is_authenticated)
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Resolve the permissions of `user_id` into the cache
    ///
    /// `user_id` must be the authenticated user. On failure the cache is
    /// left empty, so every check denies until a later load succeeds.
    pub async fn load_user_permissions(
        &self,
        user_id: UserId,
    ) -> Result<Arc<ResolvedPermissions>, LoadError> {
        let ticket = self.cache.begin_load(user_id);

        match self.resolve(user_id).await {
            Ok(role) => {
                let resolved =
                    ResolvedPermissions::new(user_id, role.name.clone(), role.permissions.clone());
                if !ticket.complete(resolved.clone()) {
                    tracing::debug!(user = %user_id, "Discarding stale permission load");
                    return Err(LoadError::Superseded(user_id));
                }
                tracing::info!(
                    user = %user_id,
                    role = %role.name,
                    permissions = role.permissions.len(),
                    "Permissions loaded"
                );
                self.record(audit::permissions_loaded(user_id, &role));
                Ok(Arc::new(resolved))
            }
            Err(e) => {
                let role = match &e {
                    LoadError::RoleNotFound { role, .. } => {
                        tracing::warn!(user = %user_id, role = %role, "User references a missing role");
                        Some(role.clone())
                    }
                    other => {
                        tracing::debug!(user = %user_id, error = %other, "Permission load failed");
                        None
                    }
                };
                if ticket.fail() {
                    self.record(audit::permissions_load_failed(
                        user_id,
                        role.as_deref(),
                        &e.to_string(),
                    ));
                }
                Err(e)
            }
        }
    }

    async fn resolve(&self, user_id: UserId) -> Result<Role, LoadError> {
        let user = self
            .current_user()
            .filter(|u| u.id == user_id)
            .ok_or(LoadError::UserNotFound(user_id))?;
        let role_name = user.role.ok_or(LoadError::UserNotFound(user_id))?;

        self.registry
            .find_role(&role_name)
            .await?
            .ok_or(LoadError::RoleNotFound {
                user: user_id,
                role: role_name,
            })
    }

    /// Reload the permissions of whoever is logged in
    ///
    /// Clears the cache when nobody is.
    pub async fn reload_current(&self) -> Result<Option<Arc<ResolvedPermissions>>, LoadError> {
        match self.current_user() {
            Some(user) => self.load_user_permissions(user.id).await.map(Some),
            None => {
                self.invalidate("no authenticated user");
                Ok(None)
            }
        }
    }

    /// Clear the permission cache
    pub fn invalidate(&self, reason: &str) {
        self.cache.invalidate();
        tracing::debug!(reason, "Permission cache invalidated");
        self.record(audit::cache_invalidated(reason));
    }

    pub fn is_loading(&self) -> bool {
        self.cache_state() == CacheState::Loading
    }

    /// Whether the current user's permissions are cached
    pub fn is_loaded(&self) -> bool {
        self.cache_state() == CacheState::Loaded
    }

    /// Cache state as seen by the current user
    ///
    /// Contents loaded for a previous session read as `Unloaded`.
    pub fn cache_state(&self) -> CacheState {
        self.cache.state_for(self.current_user().as_ref())
    }

    /// The current user's cached permission set, empty when nothing of
    /// theirs is loaded
    pub fn permissions(&self) -> PermissionSet {
        self.current_user()
            .map(|user| self.cache.permissions_for(&user))
            .unwrap_or_default()
    }

    fn session_permissions(&self) -> Option<(CurrentUser, Option<Arc<ResolvedPermissions>>)> {
        let user = self.current_user()?;
        let resolved = self.cache.snapshot_for(&user);
        Some((user, resolved))
    }

    // ------------------------------------------------------------------
    // Checks
    // ------------------------------------------------------------------

    /// Check a full permission string against the current user's cached set
    ///
    /// Denies when nobody is logged in, when the cache holds nothing for
    /// the current user and role, or when the candidate is malformed.
    pub fn has_permission(&self, candidate: &str) -> bool {
        let Some((user, resolved)) = self.session_permissions() else {
            if self.audit_checks {
                let decision = self.evaluator.decide_candidate(&PermissionSet::new(), candidate);
                self.record_check(candidate, &decision);
            }
            return false;
        };
        let allowed = self.cache.has_permission(&user, candidate);
        if self.audit_checks {
            let decision = match resolved {
                Some(resolved) => self
                    .evaluator
                    .decide_candidate(&resolved.permissions, candidate),
                None => self.evaluator.decide_candidate(&PermissionSet::new(), candidate),
            };
            self.record_check(candidate, &decision);
        }
        allowed
    }

    /// String-form check; same as [`PermissionService::has_permission`]
    pub fn can_do(&self, permission: &str) -> bool {
        self.has_permission(permission)
    }

    /// Check `module[:submodule][:action]` for the current user
    ///
    /// With neither qualifier this checks `module:read`. The super-role is
    /// allowed whatever its stored permissions.
    pub fn can(&self, module: &str, submodule: Option<&str>, action: Option<&str>) -> bool {
        let Some((user, resolved)) = self.session_permissions() else {
            return false;
        };
        let empty = PermissionSet::new();
        let set = resolved.as_ref().map(|r| &r.permissions).unwrap_or(&empty);

        let decision = self
            .evaluator
            .decide(user.role.as_deref(), set, module, submodule, action);
        if !decision.is_allowed() {
            tracing::debug!(user = %user.id, module, ?submodule, ?action, ?decision, "Access denied");
        }
        if self.audit_checks {
            self.record_check(&candidate_for(module, submodule, action), &decision);
        }
        decision.is_allowed()
    }

    /// Whether the current user holds exactly this role
    pub fn has_role(&self, role: &str) -> bool {
        self.current_user()
            .and_then(|u| u.role)
            .is_some_and(|r| r == role)
    }

    /// Whether the current user holds any of these roles
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        self.current_user()
            .and_then(|u| u.role)
            .is_some_and(|r| roles.contains(&r.as_str()))
    }

    /// Whether the current user is the distinguished super-role
    pub fn is_super_role(&self) -> bool {
        self.has_role(self.evaluator.super_role())
    }

    // ------------------------------------------------------------------
    // Session events
    // ------------------------------------------------------------------

    /// React to a session event
    pub async fn handle_auth_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::LoggedOut => self.invalidate("logout"),
            AuthEvent::LoggedIn(user) => {
                self.invalidate("login");
                let _ = self.load_user_permissions(user.id).await;
            }
            AuthEvent::RoleChanged { user_id, .. } => {
                self.invalidate("role change");
                if self.current_user().is_some_and(|u| u.id == user_id) {
                    let _ = self.load_user_permissions(user_id).await;
                }
            }
        }
    }

    /// Follow the auth provider's events on a background task
    ///
    /// The task stops when the event channel closes or the service is
    /// dropped. A lagged subscriber resynchronizes by reloading.
    pub fn spawn_auth_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.auth.subscribe();
        let service = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                let received = events.recv().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                match received {
                    Ok(event) => service.handle_auth_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth listener lagged; reloading permissions");
                        service.invalidate("auth events lagged");
                        let _ = service.reload_current().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Auth listener stopped");
        })
    }

    // ------------------------------------------------------------------
    // Role administration
    // ------------------------------------------------------------------

    pub async fn list_roles(&self) -> Result<Vec<Role>, RegistryError> {
        self.registry.list_roles().await
    }

    pub async fn find_role(&self, name: &str) -> Result<Option<Role>, RegistryError> {
        self.registry.find_role(name).await
    }

    pub async fn create_role(&self, draft: RoleDraft) -> Result<Role, RegistryError> {
        let role = self.registry.create_role(draft).await?;
        self.record(audit::role_created(&role));
        Ok(role)
    }

    /// Update a role; reloads the cache when it is the active user's role
    pub async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role, RegistryError> {
        let role = self.registry.update_role(id, update).await?;
        self.record(audit::role_updated(&role));
        if self.is_active_role(role.name.as_str()) {
            let _ = self.reload_current().await;
        }
        Ok(role)
    }

    /// Delete a role; reloads the cache when it was the active user's role
    pub async fn delete_role(&self, id: RoleId) -> Result<Role, RegistryError> {
        match self.registry.delete_role(id).await {
            Ok(role) => {
                self.record(audit::role_deleted(&role));
                if self.is_active_role(role.name.as_str()) {
                    let _ = self.reload_current().await;
                }
                Ok(role)
            }
            Err(e @ (RegistryError::RoleInUse { .. } | RegistryError::ProtectedRole(_))) => {
                if let Ok(Some(role)) = self.registry.find_role_by_id(id).await {
                    self.record(audit::role_delete_rejected(&role, &e.to_string()));
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn is_active_role(&self, role: &str) -> bool {
        let cached = self
            .cache
            .snapshot()
            .is_some_and(|r| r.role.as_str() == role);
        cached || self.has_role(role)
    }

    fn record_check(&self, candidate: &str, decision: &Decision) {
        let user = self.current_user().map(|u| u.id);
        self.record(audit::access_decision(user, candidate, decision));
    }

    fn record(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event) {
            tracing::warn!(error = %e, "Failed to record audit event");
        }
    }
}

impl std::fmt::Debug for PermissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionService")
            .field("registry", &self.registry)
            .field("cache", &self.cache.state())
            .field("super_role", &self.evaluator.super_role())
            .field("audit_checks", &self.audit_checks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEventType, MemoryAuditSink};
    use crate::auth::SessionAuth;
    use crate::store::MemoryRoleStore;

    struct Fixture {
        auth: Arc<SessionAuth>,
        audit: Arc<MemoryAuditSink>,
        service: PermissionService,
    }

    fn fixture() -> Fixture {
        let auth = Arc::new(SessionAuth::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let registry = RoleRegistry::new(Arc::new(MemoryRoleStore::seeded()));
        let service =
            PermissionService::new(registry, Evaluator::default(), auth.clone(), audit.clone());
        Fixture {
            auth,
            audit,
            service,
        }
    }

    fn login(fx: &Fixture, id: u64, role: &str) {
        fx.auth
            .login(CurrentUser::authenticated(UserId(id), role));
    }

    #[tokio::test]
    async fn test_deny_before_load() {
        let fx = fixture();
        login(&fx, 2, "provincial_commissioner");

        assert!(!fx.service.has_permission("cases:read"));
        assert!(!fx.service.can("cases", None, None));
        assert!(!fx.service.is_loaded());
        assert_eq!(fx.service.cache_state(), CacheState::Unloaded);
    }

    #[tokio::test]
    async fn test_provincial_commissioner_scenario() {
        let fx = fixture();
        login(&fx, 2, "provincial_commissioner");

        fx.service.load_user_permissions(UserId(2)).await.unwrap();

        assert!(fx.service.can_do("resources:approve"));
        assert!(!fx.service.can_do("resources:request"));
        assert!(fx.service.can("cases", Some("delete"), None));
        assert!(fx.service.can("cases", None, None));
        assert_eq!(
            fx.audit.find_by_type(AuditEventType::PermissionsLoaded).len(),
            1
        );
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let fx = fixture();
        login(&fx, 3, "station_commander");

        let first = fx.service.load_user_permissions(UserId(3)).await.unwrap();
        let second = fx.service.load_user_permissions(UserId(3)).await.unwrap();

        assert_eq!(first.permissions, second.permissions);
        assert_eq!(fx.service.permissions(), second.permissions);
    }

    #[tokio::test]
    async fn test_load_without_user_fails() {
        let fx = fixture();

        assert!(matches!(
            fx.service.load_user_permissions(UserId(1)).await,
            Err(LoadError::UserNotFound(UserId(1)))
        ));
        assert_eq!(fx.service.cache().state(), CacheState::Failed);
        assert_eq!(fx.service.cache_state(), CacheState::Unloaded);

        login(&fx, 4, "officer");
        assert!(matches!(
            fx.service.load_user_permissions(UserId(1)).await,
            Err(LoadError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_role_denies() {
        let fx = fixture();
        login(&fx, 9, "ghost");

        match fx.service.load_user_permissions(UserId(9)).await {
            Err(LoadError::RoleNotFound { role, .. }) => assert_eq!(role, "ghost"),
            other => panic!("Expected RoleNotFound, got {:?}", other),
        }
        assert!(!fx.service.can_do("cases:read"));
        assert_eq!(
            fx.audit
                .find_by_type(AuditEventType::PermissionsLoadFailed)
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_super_role_bypass_uses_session_role() {
        let fx = fixture();
        login(&fx, 1, "national_commissioner");
        fx.service.load_user_permissions(UserId(1)).await.unwrap();

        assert!(fx.service.is_super_role());
        assert!(fx.service.can("admin", Some("roles"), None));

        // The bypass holds even with nothing cached.
        fx.service.invalidate("test");
        assert!(fx.service.can("anything", None, None));
        assert!(!fx.service.can_do("anything:read"));
    }

    #[tokio::test]
    async fn test_roles() {
        let fx = fixture();
        assert!(!fx.service.has_role("officer"));

        login(&fx, 4, "officer");
        assert!(fx.service.has_role("officer"));
        assert!(!fx.service.has_role("Officer"));
        assert!(fx.service.has_any_role(&["admin_staff", "officer"]));
        assert!(!fx.service.has_any_role(&[]));
    }

    #[tokio::test]
    async fn test_auth_events() {
        let fx = fixture();
        let user = CurrentUser::authenticated(UserId(4), "officer");
        fx.auth.login(user.clone());

        fx.service.handle_auth_event(AuthEvent::LoggedIn(user)).await;
        assert!(fx.service.can_do("cases:create"));

        fx.auth.change_role(UserId(4), Some("admin_staff".into()));
        fx.service
            .handle_auth_event(AuthEvent::RoleChanged {
                user_id: UserId(4),
                role: Some("admin_staff".into()),
            })
            .await;
        assert!(!fx.service.can_do("cases:create"));
        assert!(fx.service.can_do("resources:update"));

        fx.auth.logout();
        fx.service.handle_auth_event(AuthEvent::LoggedOut).await;
        assert!(!fx.service.is_loaded());
        assert!(!fx.service.can_do("resources:read"));
    }

    #[tokio::test]
    async fn test_delete_rejections_are_audited() {
        let fx = fixture();

        assert!(matches!(
            fx.service.delete_role(RoleId(4)).await,
            Err(RegistryError::RoleInUse { .. })
        ));
        assert!(matches!(
            fx.service.delete_role(RoleId(1)).await,
            Err(RegistryError::ProtectedRole(_))
        ));
        assert_eq!(
            fx.audit
                .find_by_type(AuditEventType::RoleDeleteRejected)
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_updating_active_role_reloads() {
        let fx = fixture();
        login(&fx, 3, "station_commander");
        fx.service.load_user_permissions(UserId(3)).await.unwrap();
        assert!(!fx.service.can_do("cases:delete"));

        fx.service
            .update_role(
                RoleId(3),
                RoleUpdate::new().permissions(PermissionSet::parse(["cases:*"]).unwrap()),
            )
            .await
            .unwrap();

        assert!(fx.service.can_do("cases:delete"));
        assert!(!fx.service.can_do("reports:read"));
    }

    #[tokio::test]
    async fn test_check_auditing() {
        let fx = fixture();
        let service = fx.service.with_check_auditing(true);
        fx.auth
            .login(CurrentUser::authenticated(UserId(4), "officer"));
        service.load_user_permissions(UserId(4)).await.unwrap();

        assert!(service.can("cases", None, None));
        assert!(!service.can_do("cases:delete"));

        assert_eq!(fx.audit.find_by_type(AuditEventType::AccessGranted).len(), 1);
        assert_eq!(fx.audit.find_by_type(AuditEventType::AccessDenied).len(), 1);
    }

    #[tokio::test]
    async fn test_logout_denies_before_event_is_handled() {
        let fx = fixture();
        login(&fx, 2, "provincial_commissioner");
        fx.service.load_user_permissions(UserId(2)).await.unwrap();
        assert!(fx.service.can_do("cases:delete"));

        fx.auth.logout();

        assert!(!fx.service.can_do("cases:delete"));
        assert!(!fx.service.has_permission("cases:read"));
        assert!(!fx.service.can("cases", Some("delete"), None));
        assert!(!fx.service.is_loaded());
        assert!(fx.service.permissions().is_empty());
        assert_eq!(fx.service.cache_state(), CacheState::Unloaded);
    }

    #[tokio::test]
    async fn test_switched_user_does_not_inherit_permissions() {
        let fx = fixture();
        login(&fx, 2, "provincial_commissioner");
        fx.service.load_user_permissions(UserId(2)).await.unwrap();

        login(&fx, 4, "officer");

        assert!(!fx.service.can("cases", Some("delete"), None));
        assert!(!fx.service.can_do("personnel:update"));
        assert!(!fx.service.can_do("cases:read"));
        assert_eq!(fx.service.cache_state(), CacheState::Unloaded);

        fx.service.load_user_permissions(UserId(4)).await.unwrap();
        assert!(fx.service.can_do("cases:read"));
        assert!(!fx.service.can_do("personnel:update"));
    }

    #[tokio::test]
    async fn test_role_change_denies_old_grants_before_reload() {
        let fx = fixture();
        login(&fx, 3, "station_commander");
        fx.service.load_user_permissions(UserId(3)).await.unwrap();
        assert!(fx.service.can_do("cases:update"));

        fx.auth.change_role(UserId(3), Some("officer".into()));

        assert!(!fx.service.can_do("cases:update"));
        assert!(!fx.service.can_do("cases:read"));
        assert!(!fx.service.is_loaded());
    }
}
