//! warden-api: Shared types for the warden permission engine
//!
//! This crate defines the role and permission data model shared between the
//! engine, its storage backends and its consumers. It performs no I/O.
//! Records are validated on construction and on deserialization, so a
//! malformed role never reaches the evaluator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod catalog;
pub mod permission;
pub mod seed;

pub use permission::{Permission, PermissionSet, SEPARATOR, WILDCARD};

/// Name of the role that is always authorized and can never be removed
pub const DEFAULT_SUPER_ROLE: &str = "national_commissioner";

/// Errors raised while validating model records
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid permission format '{value}': {reason}")]
    InvalidPermissionFormat { value: String, reason: String },

    #[error("Invalid role name '{0}': lowercase letters, numbers, and underscores only")]
    InvalidRoleName(String),

    #[error("Display name must not be empty")]
    EmptyDisplayName,
}

/// Numeric role identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub u64);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable role key, e.g. `station_commander`
///
/// Role names, not ids, are what users reference: the evaluator and the
/// super-role bypass both compare names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleName(String);

impl RoleName {
    pub fn new(name: impl Into<String>) -> Result<Self, ModelError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if valid {
            Ok(Self(name))
        } else {
            Err(ModelError::InvalidRoleName(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoleName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RoleName {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoleName> for String {
    fn from(name: RoleName) -> Self {
        name.0
    }
}

impl PartialEq<str> for RoleName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RoleName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A role and the permissions it grants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Role {
    pub id: RoleId,
    pub name: RoleName,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: PermissionSet,
}

impl Role {
    /// Materialize a draft under the given id
    pub fn from_draft(id: RoleId, draft: RoleDraft) -> Self {
        Self {
            id,
            name: draft.name,
            display_name: draft.display_name,
            description: draft.description,
            permissions: draft.permissions,
        }
    }

    /// Whether the role's own permissions grant everything (`*`)
    pub fn is_super_role(&self) -> bool {
        self.permissions.contains_wildcard()
    }

    /// Merge a partial update over this role
    pub fn apply(&mut self, update: RoleUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(display_name) = update.display_name {
            self.display_name = display_name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(permissions) = update.permissions {
            self.permissions = permissions;
        }
    }
}

/// Data for creating a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleDraft {
    pub name: RoleName,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: PermissionSet,
}

impl RoleDraft {
    /// Create a draft with no description and no permissions
    pub fn new(name: &str, display_name: impl Into<String>) -> Result<Self, ModelError> {
        Ok(Self {
            name: RoleName::new(name)?,
            display_name: display_name.into(),
            description: String::new(),
            permissions: PermissionSet::new(),
        })
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the permissions
    pub fn permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    /// Check fields that the type system cannot
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.display_name.trim().is_empty() {
            return Err(ModelError::EmptyDisplayName);
        }
        Ok(())
    }
}

/// Partial role update; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<RoleName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionSet>,
}

impl RoleUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: RoleName) -> Self {
        self.name = Some(name);
        self
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.display_name.is_none()
            && self.description.is_none()
            && self.permissions.is_none()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        match &self.display_name {
            Some(name) if name.trim().is_empty() => Err(ModelError::EmptyDisplayName),
            _ => Ok(()),
        }
    }
}

/// A user record as held by the data-access layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Role name; `None` for accounts without an assigned role
    #[serde(default)]
    pub role: Option<String>,
}

/// The authenticated principal as reported by the authentication layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: UserId,
    pub role: Option<String>,
    pub is_authenticated: bool,
}

impl CurrentUser {
    /// An authenticated principal with the given role
    pub fn authenticated(id: UserId, role: impl Into<String>) -> Self {
        Self {
            id,
            role: Some(role.into()),
            is_authenticated: true,
        }
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role.clone(),
            is_authenticated: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_name_validation() {
        assert!(RoleName::new("station_commander").is_ok());
        assert!(RoleName::new("unit_42").is_ok());
        assert!(RoleName::new("").is_err());
        assert!(RoleName::new("Station").is_err());
        assert!(RoleName::new("station commander").is_err());
        assert!(RoleName::new("station-commander").is_err());
    }

    #[test]
    fn test_role_wire_format() {
        let json = r#"{
            "id": 3,
            "name": "station_commander",
            "displayName": "Station Commander",
            "description": "Head of a police station",
            "permissions": ["cases:read", "cases:create"]
        }"#;
        let role: Role = serde_json::from_str(json).unwrap();

        assert_eq!(role.id, RoleId(3));
        assert_eq!(role.name, "station_commander");
        assert_eq!(role.permissions.len(), 2);
        assert!(!role.is_super_role());

        let out = serde_json::to_string(&role).unwrap();
        assert!(out.contains("\"displayName\""));
    }

    #[test]
    fn test_role_rejects_malformed_records() {
        let bad_name = r#"{"id": 1, "name": "Bad Name", "displayName": "x"}"#;
        assert!(serde_json::from_str::<Role>(bad_name).is_err());

        let bad_permission =
            r#"{"id": 1, "name": "ok", "displayName": "x", "permissions": ["a::b"]}"#;
        assert!(serde_json::from_str::<Role>(bad_permission).is_err());

        let unknown_field = r#"{"id": 1, "name": "ok", "displayName": "x", "color": "red"}"#;
        assert!(serde_json::from_str::<Role>(unknown_field).is_err());
    }

    #[test]
    fn test_apply_update_merges() {
        let mut role = Role::from_draft(
            RoleId(7),
            RoleDraft::new("clerk", "Clerk")
                .unwrap()
                .description("Files things")
                .permissions(PermissionSet::parse(["reports:read"]).unwrap()),
        );

        role.apply(RoleUpdate::new().display_name("Senior Clerk"));

        assert_eq!(role.display_name, "Senior Clerk");
        assert_eq!(role.description, "Files things");
        assert!(role.permissions.contains_str("reports:read"));
    }

    #[test]
    fn test_draft_validation() {
        let draft = RoleDraft::new("clerk", "  ").unwrap();
        assert_eq!(draft.validate(), Err(ModelError::EmptyDisplayName));

        let update = RoleUpdate::new().display_name("");
        assert_eq!(update.validate(), Err(ModelError::EmptyDisplayName));
        assert!(RoleUpdate::new().is_empty());
    }
}
