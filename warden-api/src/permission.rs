//! Permission strings and permission sets
//!
//! A permission is a colon-separated capability token:
//!
//! | Form | Example | Meaning |
//! |------|---------|---------|
//! | `*` | `*` | Every capability |
//! | `module` | `cases` | Bare module |
//! | `module:action` | `cases:update` | Action on a module |
//! | `module:submodule:action` | `reports:create:self` | Qualified action |
//! | `module:*` | `cases:*` | Every action under a module |
//!
//! Permissions are case-sensitive and compared verbatim. Anything else
//! (empty strings, empty segments, more than three segments, whitespace,
//! a misplaced `*`) is rejected with [`ModelError::InvalidPermissionFormat`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::ModelError;

/// The universal wildcard
pub const WILDCARD: &str = "*";

/// Separator between permission segments
pub const SEPARATOR: char = ':';

/// Maximum number of segments in a permission string
pub const MAX_SEGMENTS: usize = 3;

/// A validated permission string
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(String);

impl Permission {
    /// Parse and validate a permission string
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        validate(value)?;
        Ok(Self(value.to_string()))
    }

    /// The universal wildcard permission (`*`)
    pub fn wildcard() -> Self {
        Self(WILDCARD.to_string())
    }

    /// Module-level wildcard (`module:*`)
    pub fn module_wildcard(module: &str) -> Result<Self, ModelError> {
        Self::parse(&format!("{}{}{}", module, SEPARATOR, WILDCARD))
    }

    /// Build a permission from its parts
    pub fn from_parts(
        module: &str,
        submodule: Option<&str>,
        action: Option<&str>,
    ) -> Result<Self, ModelError> {
        let mut value = module.to_string();
        for part in [submodule, action].into_iter().flatten() {
            value.push(SEPARATOR);
            value.push_str(part);
        }
        Self::parse(&value)
    }

    /// The raw permission string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First segment (the module)
    pub fn module(&self) -> &str {
        self.segments().next().unwrap_or(&self.0)
    }

    /// Iterate over the colon-separated segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Whether this is the universal wildcard
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD
    }

    /// Whether this is a module-level wildcard (`module:*`)
    pub fn is_module_wildcard(&self) -> bool {
        !self.is_wildcard() && self.0.ends_with(":*")
    }
}

fn validate(value: &str) -> Result<(), ModelError> {
    let invalid = |reason: &str| ModelError::InvalidPermissionFormat {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.is_empty() {
        return Err(invalid("empty permission"));
    }
    if value == WILDCARD {
        return Ok(());
    }
    if value.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }

    let segments: Vec<&str> = value.split(SEPARATOR).collect();
    if segments.len() > MAX_SEGMENTS {
        return Err(invalid("more than three segments"));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid("empty segment"));
    }
    for (index, segment) in segments.iter().enumerate() {
        if segment.contains('*') {
            // Only `module:*` may carry a wildcard segment.
            let module_wildcard = *segment == WILDCARD && index == 1 && segments.len() == 2;
            if !module_wildcard {
                return Err(invalid("wildcard only allowed as `*` or `module:*`"));
            }
        }
    }
    Ok(())
}

impl FromStr for Permission {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Permission {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate(&value)?;
        Ok(Self(value))
    }
}

impl From<Permission> for String {
    fn from(permission: Permission) -> Self {
        permission.0
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An unordered set of permissions held by a role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// A set holding only the universal wildcard
    pub fn all() -> Self {
        Self::from_iter([Permission::wildcard()])
    }

    /// Parse a list of permission strings, rejecting the first malformed entry
    pub fn parse<I, S>(values: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .map(|v| Permission::parse(v.as_ref()))
            .collect()
    }

    /// Add a permission; returns false if it was already present
    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    /// Remove a permission; returns false if it was absent
    pub fn remove(&mut self, permission: &Permission) -> bool {
        self.0.remove(permission)
    }

    /// Keep only the permissions matching the predicate
    pub fn retain(&mut self, f: impl FnMut(&Permission) -> bool) {
        self.0.retain(f)
    }

    /// Exact membership test on a raw string
    pub fn contains_str(&self, value: &str) -> bool {
        self.0.iter().any(|p| p.as_str() == value)
    }

    /// Exact membership test
    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    /// Whether the set grants everything (`*`)
    pub fn contains_wildcard(&self) -> bool {
        self.contains_str(WILDCARD)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Permission strings in sorted order
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|p| p.to_string()).collect()
    }

    /// Stable hash of the set contents
    ///
    /// Independent of insertion order; used to detect that a role's
    /// permissions changed between two loads.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for permission in &self.0 {
            hasher.update(permission.as_str().as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Permission> for PermissionSet {
    fn extend<T: IntoIterator<Item = Permission>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for PermissionSet {
    type Item = Permission;
    type IntoIter = std::collections::btree_set::IntoIter<Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PermissionSet {
    type Item = &'a Permission;
    type IntoIter = std::collections::btree_set::Iter<'a, Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_forms() {
        for value in [
            "*",
            "cases",
            "cases:read",
            "reports:create:self",
            "cases:*",
            "admin_staff:read",
        ] {
            assert!(Permission::parse(value).is_ok(), "{value} should parse");
        }
    }

    #[test]
    fn test_invalid_forms() {
        for value in [
            "",
            "cases::read",
            ":read",
            "cases:",
            "a:b:c:d",
            "cases:re ad",
            "*:read",
            "cases:*:read",
            "cases:sub:*",
            "ca*es",
        ] {
            let err = Permission::parse(value).expect_err(value);
            assert!(matches!(err, ModelError::InvalidPermissionFormat { .. }));
        }
    }

    #[test]
    fn test_module_and_kind() {
        let p = Permission::parse("reports:create:self").unwrap();
        assert_eq!(p.module(), "reports");
        assert!(!p.is_wildcard());
        assert!(!p.is_module_wildcard());

        let w = Permission::module_wildcard("cases").unwrap();
        assert_eq!(w.as_str(), "cases:*");
        assert!(w.is_module_wildcard());
        assert!(Permission::wildcard().is_wildcard());
    }

    #[test]
    fn test_from_parts() {
        let p = Permission::from_parts("cases", Some("evidence"), Some("read")).unwrap();
        assert_eq!(p.as_str(), "cases:evidence:read");

        let p = Permission::from_parts("cases", None, Some("read")).unwrap();
        assert_eq!(p.as_str(), "cases:read");

        assert!(Permission::from_parts("", None, None).is_err());
    }

    #[test]
    fn test_set_deserialize_rejects_malformed() {
        let ok: PermissionSet = serde_json::from_str(r#"["cases:read", "cases:read", "*"]"#).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(ok.contains_wildcard());

        let err = serde_json::from_str::<PermissionSet>(r#"["cases::read"]"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_fingerprint_ignores_order() {
        let a = PermissionSet::parse(["cases:read", "cases:update"]).unwrap();
        let b = PermissionSet::parse(["cases:update", "cases:read"]).unwrap();
        let c = PermissionSet::parse(["cases:read"]).unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
