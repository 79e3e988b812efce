//! Role storage backends
//!
//! The store is the data-access collaborator behind the role registry: it
//! persists roles and knows which users reference which role. The registry
//! enforces business rules; stores only keep records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use warden_api::{seed, Role, RoleDraft, RoleId, RoleName, RoleUpdate, User, UserId};

/// Error type for role store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read role store: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse role store: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Role not found: {0}")]
    NotFound(RoleId),

    #[error("Store is read-only")]
    ReadOnly,
}

/// Trait for role storage
///
/// Implement this to back the registry with a remote service or database.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Fetch every role
    async fn fetch_roles(&self) -> Result<Vec<Role>, StoreError>;

    /// Persist a new role and return it with its assigned id
    async fn create_role(&self, draft: RoleDraft) -> Result<Role, StoreError>;

    /// Merge an update over an existing role
    async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role, StoreError>;

    /// Remove a role
    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError>;

    /// Ids of users whose role is `role`
    async fn users_with_role(&self, role: &RoleName) -> Result<Vec<UserId>, StoreError>;

    /// Look up a user
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
}

#[async_trait]
impl<T: RoleStore + ?Sized> RoleStore for std::sync::Arc<T> {
    async fn fetch_roles(&self) -> Result<Vec<Role>, StoreError> {
        (**self).fetch_roles().await
    }

    async fn create_role(&self, draft: RoleDraft) -> Result<Role, StoreError> {
        (**self).create_role(draft).await
    }

    async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role, StoreError> {
        (**self).update_role(id, update).await
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        (**self).delete_role(id).await
    }

    async fn users_with_role(&self, role: &RoleName) -> Result<Vec<UserId>, StoreError> {
        (**self).users_with_role(role).await
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).find_user(id).await
    }
}

/// Roles and users held by a store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleDocument {
    pub version: u32,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub users: Vec<User>,
}

impl RoleDocument {
    pub fn new() -> Self {
        Self {
            version: 1,
            roles: Vec::new(),
            users: Vec::new(),
        }
    }

    /// The console's built-in roles and users
    pub fn seeded() -> Self {
        Self {
            version: 1,
            roles: seed::default_roles(),
            users: seed::default_users(),
        }
    }

    fn next_id(&self) -> RoleId {
        RoleId(self.roles.iter().map(|r| r.id.0).max().unwrap_or(0) + 1)
    }

    fn create(&mut self, draft: RoleDraft) -> Role {
        let role = Role::from_draft(self.next_id(), draft);
        self.roles.push(role.clone());
        role
    }

    fn update(&mut self, id: RoleId, update: RoleUpdate) -> Result<Role, StoreError> {
        let role = self
            .roles
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        role.apply(update);
        Ok(role.clone())
    }

    fn delete(&mut self, id: RoleId) -> Result<(), StoreError> {
        let index = self
            .roles
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        self.roles.remove(index);
        Ok(())
    }

    fn users_with_role(&self, role: &RoleName) -> Vec<UserId> {
        self.users
            .iter()
            .filter(|u| u.role.as_deref() == Some(role.as_str()))
            .map(|u| u.id)
            .collect()
    }

    fn find_user(&self, id: UserId) -> Option<User> {
        self.users.iter().find(|u| u.id == id).cloned()
    }
}

// ============================================================================
// File-based Role Store
// ============================================================================

/// File-based role store
///
/// Stores roles and users in a JSON file at a configurable location.
/// Default: `~/.config/<app>/roles.json`
pub struct FileRoleStore {
    path: PathBuf,
    data: RwLock<RoleDocument>,
}

impl FileRoleStore {
    /// Open a store at the specified path; a missing file starts empty
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = Self::read_document(&path)?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Open a store in the default location for an application
    pub fn default_for_app(app_name: &str) -> Result<Self, StoreError> {
        Self::new(default_roles_path(app_name))
    }

    /// Write a document to `path`, replacing any existing file
    pub fn initialize(path: impl AsRef<Path>, document: RoleDocument) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        Self::write_document(&path, &document)?;
        Ok(Self {
            path,
            data: RwLock::new(document),
        })
    }

    /// Get the store file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, replacing the in-memory copy
    pub fn reload(&self) -> Result<(), StoreError> {
        let fresh = Self::read_document(&self.path)?;
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(())
    }

    fn read_document(path: &Path) -> Result<RoleDocument, StoreError> {
        if path.exists() {
            let file = File::open(path)?;
            let reader = BufReader::new(file);
            Ok(serde_json::from_reader(reader)?)
        } else {
            Ok(RoleDocument::new())
        }
    }

    /// Write to a sibling temp file, then rename it over `path`
    ///
    /// Readers of `path` see either the old or the new document, never a
    /// partial one.
    fn write_document(path: &Path, document: &RoleDocument) -> Result<(), StoreError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, document)?;
            writer.flush()?;
        }
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn with_data<T>(&self, f: impl FnOnce(&RoleDocument) -> T) -> T {
        f(&self.data.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut RoleDocument) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        // Held until the file is replaced; mutations persist one at a time.
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = data.clone();
        let value = f(&mut next)?;
        Self::write_document(&self.path, &next)?;
        *data = next;
        Ok(value)
    }
}

/// `<config_dir>/<app>/roles.json`
pub fn default_roles_path(app_name: &str) -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join(app_name)
        .join("roles.json")
}

#[async_trait]
impl RoleStore for FileRoleStore {
    async fn fetch_roles(&self) -> Result<Vec<Role>, StoreError> {
        Ok(self.with_data(|d| d.roles.clone()))
    }

    async fn create_role(&self, draft: RoleDraft) -> Result<Role, StoreError> {
        self.mutate(|d| Ok(d.create(draft)))
    }

    async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role, StoreError> {
        self.mutate(|d| d.update(id, update))
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        self.mutate(|d| d.delete(id))
    }

    async fn users_with_role(&self, role: &RoleName) -> Result<Vec<UserId>, StoreError> {
        Ok(self.with_data(|d| d.users_with_role(role)))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.with_data(|d| d.find_user(id)))
    }
}

impl std::fmt::Debug for FileRoleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRoleStore")
            .field("path", &self.path)
            .finish()
    }
}

// ============================================================================
// In-Memory Role Store
// ============================================================================

/// In-memory role store for tests and single-session use
///
/// Can simulate a slow backend with [`MemoryRoleStore::with_latency`] and
/// counts how often roles were fetched.
pub struct MemoryRoleStore {
    data: RwLock<RoleDocument>,
    latency: Option<Duration>,
    fetches: AtomicUsize,
}

impl MemoryRoleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::from_document(RoleDocument::new())
    }

    /// Create a store holding the console's built-in roles and users
    pub fn seeded() -> Self {
        Self::from_document(RoleDocument::seeded())
    }

    pub fn from_document(document: RoleDocument) -> Self {
        Self {
            data: RwLock::new(document),
            latency: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Delay every fetch by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add or replace a user record
    pub fn upsert_user(&self, user: User) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.users.retain(|u| u.id != user.id);
        data.users.push(user);
    }

    /// Number of completed `fetch_roles` calls
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .roles
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MemoryRoleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn fetch_roles(&self) -> Result<Vec<Role>, StoreError> {
        self.simulate_latency().await;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.roles.clone())
    }

    async fn create_role(&self, draft: RoleDraft) -> Result<Role, StoreError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        Ok(data.create(draft))
    }

    async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role, StoreError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.update(id, update)
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.delete(id)
    }

    async fn users_with_role(&self, role: &RoleName) -> Result<Vec<UserId>, StoreError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.users_with_role(role))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.find_user(id))
    }
}

impl std::fmt::Debug for MemoryRoleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRoleStore")
            .field("roles", &self.len())
            .field("latency", &self.latency)
            .finish()
    }
}

// ============================================================================
// Read-Only Role Store
// ============================================================================

/// Read-only wrapper for any role store
///
/// Useful when role definitions are provisioned out of band and must not
/// be changed from the console.
pub struct ReadOnlyRoleStore<S: RoleStore> {
    inner: S,
}

impl<S: RoleStore> ReadOnlyRoleStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: RoleStore> RoleStore for ReadOnlyRoleStore<S> {
    async fn fetch_roles(&self) -> Result<Vec<Role>, StoreError> {
        self.inner.fetch_roles().await
    }

    async fn create_role(&self, _draft: RoleDraft) -> Result<Role, StoreError> {
        Err(StoreError::ReadOnly)
    }

    async fn update_role(&self, _id: RoleId, _update: RoleUpdate) -> Result<Role, StoreError> {
        Err(StoreError::ReadOnly)
    }

    async fn delete_role(&self, _id: RoleId) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }

    async fn users_with_role(&self, role: &RoleName) -> Result<Vec<UserId>, StoreError> {
        self.inner.users_with_role(role).await
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.inner.find_user(id).await
    }
}

impl<S: RoleStore + std::fmt::Debug> std::fmt::Debug for ReadOnlyRoleStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOnlyRoleStore")
            .field("inner", &self.inner)
            .finish()
    }
}
