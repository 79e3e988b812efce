//! Role registry
//!
//! The authoritative, process-wide list of roles. Roles are fetched from a
//! [`RoleStore`] on first use and memoized; concurrent first callers share a
//! single fetch. Administrative mutations go through the store and then
//! update the memoized snapshot so the next read sees them.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use warden_api::{ModelError, Role, RoleDraft, RoleId, RoleName, RoleUpdate, DEFAULT_SUPER_ROLE};

use crate::store::{RoleStore, StoreError};

/// Errors that can occur during registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Role store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid role: {0}")]
    Model(#[from] ModelError),

    #[error("Role not found: {0}")]
    RoleNotFound(RoleId),

    #[error("Cannot delete role '{name}': assigned to {users} user(s)")]
    RoleInUse { name: RoleName, users: usize },

    #[error("Role '{0}' is protected and cannot be removed or renamed")]
    ProtectedRole(RoleName),

    #[error("A role named '{0}' already exists")]
    DuplicateRoleName(RoleName),
}

/// A thread-safe, lazily loaded role registry
#[derive(Clone)]
pub struct RoleRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    store: Arc<dyn RoleStore>,
    protected_role: Arc<str>,
    /// Held while fetching, so concurrent first reads share one fetch
    load_lock: Arc<Mutex<()>>,
    /// Serializes administrative mutations
    write_lock: Arc<Mutex<()>>,
}

#[derive(Default)]
struct RegistryInner {
    roles: Option<Arc<Vec<Role>>>,
    /// Bumped on invalidation; a fetch started under an older generation
    /// does not populate the snapshot
    generation: u64,
}

impl RoleRegistry {
    /// Create a registry over a store, protecting the default super-role
    pub fn new(store: Arc<dyn RoleStore>) -> Self {
        Self::with_protected_role(store, DEFAULT_SUPER_ROLE)
    }

    /// Create a registry that protects the named role from removal
    pub fn with_protected_role(store: Arc<dyn RoleStore>, protected_role: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            store,
            protected_role: Arc::from(protected_role),
            load_lock: Arc::new(Mutex::new(())),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Name of the role that can never be deleted or renamed
    pub fn protected_role(&self) -> &str {
        &self.protected_role
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn RoleStore> {
        &self.store
    }

    /// All known roles
    pub async fn list_roles(&self) -> Result<Vec<Role>, RegistryError> {
        Ok(self.snapshot().await?.as_ref().clone())
    }

    /// Look up a role by exact name
    pub async fn find_role(&self, name: &str) -> Result<Option<Role>, RegistryError> {
        let roles = self.snapshot().await?;
        Ok(roles.iter().find(|r| r.name == name).cloned())
    }

    /// Look up a role by id
    pub async fn find_role_by_id(&self, id: RoleId) -> Result<Option<Role>, RegistryError> {
        let roles = self.snapshot().await?;
        Ok(roles.iter().find(|r| r.id == id).cloned())
    }

    /// Whether the roles have been fetched
    pub async fn is_loaded(&self) -> bool {
        self.inner.read().await.roles.is_some()
    }

    /// Drop the memoized roles; the next read fetches again
    pub async fn invalidate(&self) {
        let mut inner = self.inner.write().await;
        inner.roles = None;
        inner.generation += 1;
        tracing::debug!(generation = inner.generation, "Role registry invalidated");
    }

    /// Create a role; names must be unique
    pub async fn create_role(&self, draft: RoleDraft) -> Result<Role, RegistryError> {
        draft.validate()?;
        let _write = self.write_lock.lock().await;

        let roles = self.snapshot().await?;
        if roles.iter().any(|r| r.name == draft.name) {
            return Err(RegistryError::DuplicateRoleName(draft.name));
        }

        let role = self.store.create_role(draft).await?;
        self.edit_snapshot(|roles| roles.push(role.clone())).await;

        tracing::info!(role = %role.name, id = %role.id, "Role created");
        Ok(role)
    }

    /// Update a role
    ///
    /// The protected role cannot be renamed; a role assigned to users cannot
    /// be renamed either, since users reference roles by name.
    pub async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role, RegistryError> {
        update.validate()?;
        let _write = self.write_lock.lock().await;

        let roles = self.snapshot().await?;
        let current = roles
            .iter()
            .find(|r| r.id == id)
            .ok_or(RegistryError::RoleNotFound(id))?;

        if let Some(new_name) = update.name.as_ref().filter(|n| **n != current.name) {
            if current.name == *self.protected_role {
                return Err(RegistryError::ProtectedRole(current.name.clone()));
            }
            if roles.iter().any(|r| r.name == *new_name) {
                return Err(RegistryError::DuplicateRoleName(new_name.clone()));
            }
            let users = self.store.users_with_role(&current.name).await?;
            if !users.is_empty() {
                return Err(RegistryError::RoleInUse {
                    name: current.name.clone(),
                    users: users.len(),
                });
            }
        }

        let role = self.store.update_role(id, update).await.map_err(|e| match e {
            StoreError::NotFound(id) => RegistryError::RoleNotFound(id),
            other => other.into(),
        })?;
        self.edit_snapshot(|roles| {
            if let Some(slot) = roles.iter_mut().find(|r| r.id == id) {
                *slot = role.clone();
            }
        })
        .await;

        tracing::info!(role = %role.name, id = %role.id, "Role updated");
        Ok(role)
    }

    /// Delete a role and return it
    ///
    /// Fails with [`RegistryError::ProtectedRole`] for the protected role and
    /// [`RegistryError::RoleInUse`] while any user references the role; the
    /// registry is left unchanged in both cases.
    pub async fn delete_role(&self, id: RoleId) -> Result<Role, RegistryError> {
        let _write = self.write_lock.lock().await;

        let roles = self.snapshot().await?;
        let role = roles
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(RegistryError::RoleNotFound(id))?;

        if role.name == *self.protected_role {
            tracing::warn!(role = %role.name, "Refusing to delete protected role");
            return Err(RegistryError::ProtectedRole(role.name));
        }

        let users = self.store.users_with_role(&role.name).await?;
        if !users.is_empty() {
            tracing::warn!(role = %role.name, users = users.len(), "Refusing to delete role in use");
            return Err(RegistryError::RoleInUse {
                name: role.name,
                users: users.len(),
            });
        }

        self.store.delete_role(id).await.map_err(|e| match e {
            StoreError::NotFound(id) => RegistryError::RoleNotFound(id),
            other => other.into(),
        })?;
        self.edit_snapshot(|roles| roles.retain(|r| r.id != id)).await;

        tracing::info!(role = %role.name, id = %role.id, "Role deleted");
        Ok(role)
    }

    /// Return the memoized roles, fetching them at most once
    async fn snapshot(&self) -> Result<Arc<Vec<Role>>, RegistryError> {
        if let Some(roles) = self.inner.read().await.roles.clone() {
            return Ok(roles);
        }

        let _load = self.load_lock.lock().await;

        // Another caller may have finished the fetch while we waited.
        let generation = {
            let inner = self.inner.read().await;
            if let Some(roles) = inner.roles.clone() {
                return Ok(roles);
            }
            inner.generation
        };

        let roles = self.store.fetch_roles().await?;
        check_unique_names(&roles)?;
        let roles = Arc::new(roles);

        let mut inner = self.inner.write().await;
        if inner.generation == generation {
            inner.roles = Some(roles.clone());
            tracing::info!(count = roles.len(), "Roles loaded");
        }
        Ok(roles)
    }

    async fn edit_snapshot(&self, f: impl FnOnce(&mut Vec<Role>)) {
        let mut inner = self.inner.write().await;
        if let Some(roles) = inner.roles.as_mut() {
            f(Arc::make_mut(roles));
        }
    }
}

fn check_unique_names(roles: &[Role]) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for role in roles {
        if !seen.insert(role.name.as_str()) {
            return Err(RegistryError::DuplicateRoleName(role.name.clone()));
        }
    }
    Ok(())
}

impl std::fmt::Debug for RoleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleRegistry")
            .field("protected_role", &self.protected_role)
            .finish_non_exhaustive()
    }
}
