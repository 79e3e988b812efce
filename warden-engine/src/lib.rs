//! warden-engine: Role-based permission engine
//!
//! This crate resolves what the logged-in user may do. It provides:
//!
//! - A role registry loaded lazily from a [`RoleStore`]
//! - Pure permission evaluation with wildcard and super-role rules
//! - A session-scoped permission cache that follows login and logout
//! - Route guards and navigation filtering built on top of the checks
//! - An audit trail and hot reload of the roles file

pub mod audit;
pub mod auth;
pub mod config;
pub mod guard;
pub mod navigation;
pub mod permission;
pub mod registry;
pub mod service;
pub mod store;
#[cfg(feature = "watch")]
pub mod watcher;

pub use auth::{AuthEvent, AuthProvider, SessionAuth};
pub use config::{ConfigError, EngineConfig};
pub use guard::{console_routes, Route, RouteAccess, RouteGuard};
pub use navigation::{console_menu, visible_items, NavItem};
pub use permission::{
    CacheState, Decision, Evaluator, PermissionServiceBuilder, PresetError, Presets,
};
pub use registry::{RegistryError, RoleRegistry};
pub use service::{LoadError, PermissionService};
pub use store::{FileRoleStore, MemoryRoleStore, ReadOnlyRoleStore, RoleDocument, RoleStore, StoreError};
#[cfg(feature = "watch")]
pub use watcher::{RoleFileWatcher, WatcherConfig, WatcherError};

pub use warden_api::{
    CurrentUser, ModelError, Permission, PermissionSet, Role, RoleDraft, RoleId, RoleName,
    RoleUpdate, User, UserId,
};
