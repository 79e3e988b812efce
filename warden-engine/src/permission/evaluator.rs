//! Permission evaluation
//!
//! Pure decision functions over a permission set. No I/O, no caching.
//! Every check is a monotonic OR over set membership, so the order in
//! which the rules are tried does not change the outcome.

use warden_api::{ModelError, Permission, PermissionSet, Role, DEFAULT_SUPER_ROLE, WILDCARD};

/// Why a check was granted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// The role is the distinguished super-role
    SuperRole,
    /// The set holds `*`
    GlobalWildcard,
    /// The set holds the candidate verbatim
    Exact,
    /// The set holds `module:*` for the candidate's module
    ModuleWildcard,
}

/// Why a check was denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// No rule matched
    NotGranted,
    /// The candidate was not a valid permission string
    InvalidCandidate(ModelError),
}

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Grant),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// Check a candidate permission against a set
///
/// Fails with [`ModelError::InvalidPermissionFormat`] when the candidate is
/// empty or malformed. Callers on the evaluation path treat that as deny.
pub fn has_permission(set: &PermissionSet, candidate: &str) -> Result<bool, ModelError> {
    Ok(match_grant(set, candidate)?.is_some())
}

/// Like [`has_permission`], reporting which rule granted access
pub fn match_grant(set: &PermissionSet, candidate: &str) -> Result<Option<Grant>, ModelError> {
    let candidate = Permission::parse(candidate)?;

    if set.contains_str(WILDCARD) {
        return Ok(Some(Grant::GlobalWildcard));
    }
    if set.contains(&candidate) {
        return Ok(Some(Grant::Exact));
    }
    let module_wildcard = format!("{}:{}", candidate.module(), WILDCARD);
    if set.contains_str(&module_wildcard) {
        return Ok(Some(Grant::ModuleWildcard));
    }
    Ok(None)
}

/// Build the candidate string for a module-level check
///
/// Omitting both qualifiers asks for `module:read`, not the bare module.
/// `module:submodule` when only a submodule is given, `module:action` when
/// only an action is given, `module:submodule:action` otherwise.
pub fn candidate_for(module: &str, submodule: Option<&str>, action: Option<&str>) -> String {
    match (submodule, action) {
        (None, None) => format!("{}:read", module),
        (Some(sub), None) => format!("{}:{}", module, sub),
        (None, Some(action)) => format!("{}:{}", module, action),
        (Some(sub), Some(action)) => format!("{}:{}:{}", module, sub, action),
    }
}

/// Evaluator configured with the distinguished super-role name
#[derive(Debug, Clone)]
pub struct Evaluator {
    super_role: String,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(DEFAULT_SUPER_ROLE)
    }
}

impl Evaluator {
    pub fn new(super_role: impl Into<String>) -> Self {
        Self {
            super_role: super_role.into(),
        }
    }

    /// Name of the role that bypasses every check
    pub fn super_role(&self) -> &str {
        &self.super_role
    }

    /// Whether a role name is the distinguished super-role
    pub fn is_super_role(&self, role_name: &str) -> bool {
        role_name == self.super_role
    }

    /// Decide a candidate string against a set, failing closed
    pub fn decide_candidate(&self, set: &PermissionSet, candidate: &str) -> Decision {
        match match_grant(set, candidate) {
            Ok(Some(grant)) => Decision::Allow(grant),
            Ok(None) => Decision::Deny(DenyReason::NotGranted),
            Err(e) => Decision::Deny(DenyReason::InvalidCandidate(e)),
        }
    }

    /// Decide a module-level check for a role name and permission set
    pub fn decide(
        &self,
        role_name: Option<&str>,
        set: &PermissionSet,
        module: &str,
        submodule: Option<&str>,
        action: Option<&str>,
    ) -> Decision {
        if role_name.is_some_and(|name| self.is_super_role(name)) {
            return Decision::Allow(Grant::SuperRole);
        }
        self.decide_candidate(set, &candidate_for(module, submodule, action))
    }

    /// Check a role for `module[:submodule][:action]`
    ///
    /// The super-role is allowed regardless of its stored permissions.
    pub fn check_permission(
        &self,
        role: &Role,
        module: &str,
        submodule: Option<&str>,
        action: Option<&str>,
    ) -> bool {
        self.decide(
            Some(role.name.as_str()),
            &role.permissions,
            module,
            submodule,
            action,
        )
        .is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_api::{seed, RoleDraft, RoleId};

    fn role(name: &str, permissions: &[&str]) -> Role {
        Role::from_draft(
            RoleId(99),
            RoleDraft::new(name, name)
                .unwrap()
                .permissions(PermissionSet::parse(permissions).unwrap()),
        )
    }

    #[test]
    fn test_wildcard_grants_everything() {
        let set = PermissionSet::all();
        for candidate in ["cases", "cases:read", "admin:users:delete", "x:*"] {
            assert!(has_permission(&set, candidate).unwrap(), "{candidate}");
        }
    }

    #[test]
    fn test_exact_and_module_wildcard() {
        let set = PermissionSet::parse(["cases:read", "resources:*"]).unwrap();

        assert!(has_permission(&set, "cases:read").unwrap());
        assert!(!has_permission(&set, "cases:update").unwrap());
        for action in ["read", "approve", "request", "anything_else"] {
            let candidate = format!("resources:{action}");
            assert!(has_permission(&set, &candidate).unwrap());
        }
        assert!(has_permission(&set, "resources:fleet:assign").unwrap());
        assert!(has_permission(&set, "resources").unwrap());
    }

    #[test]
    fn test_invalid_candidate_is_an_error() {
        let set = PermissionSet::all();
        assert!(matches!(
            has_permission(&set, ""),
            Err(ModelError::InvalidPermissionFormat { .. })
        ));
        assert!(has_permission(&set, "cases::read").is_err());
        assert!(has_permission(&set, "a:b:c:d").is_err());
    }

    #[test]
    fn test_grant_reasons() {
        let set = PermissionSet::parse(["cases:read", "reports:*"]).unwrap();
        assert_eq!(match_grant(&set, "cases:read").unwrap(), Some(Grant::Exact));
        assert_eq!(
            match_grant(&set, "reports:export").unwrap(),
            Some(Grant::ModuleWildcard)
        );
        assert_eq!(match_grant(&set, "cases:delete").unwrap(), None);
    }

    #[test]
    fn test_candidate_defaults_to_read() {
        assert_eq!(candidate_for("cases", None, None), "cases:read");
        assert_eq!(candidate_for("admin", Some("users"), None), "admin:users");
        assert_eq!(candidate_for("cases", None, Some("update")), "cases:update");
        assert_eq!(
            candidate_for("personnel", Some("read"), Some("self")),
            "personnel:read:self"
        );
    }

    #[test]
    fn test_omitted_qualifiers_equal_read() {
        let evaluator = Evaluator::default();
        for role in seed::default_roles() {
            assert_eq!(
                evaluator.check_permission(&role, "cases", None, None),
                evaluator.check_permission(&role, "cases", Some("read"), None),
                "{}",
                role.name
            );
        }
    }

    #[test]
    fn test_station_commander_scenario() {
        let evaluator = Evaluator::default();
        let commander = role(
            "station_commander",
            &["cases:read", "cases:create", "cases:update"],
        );

        assert!(evaluator.check_permission(&commander, "cases", Some("update"), None));
        assert!(!evaluator.check_permission(&commander, "cases", Some("delete"), None));
        assert!(!evaluator.check_permission(&commander, "admin", Some("users"), None));
    }

    #[test]
    fn test_super_role_bypasses_empty_permissions() {
        let evaluator = Evaluator::default();
        let commissioner = role(DEFAULT_SUPER_ROLE, &[]);

        assert!(evaluator.check_permission(&commissioner, "admin", Some("roles"), None));
        assert!(evaluator.check_permission(&commissioner, "anything", None, None));
        assert_eq!(
            evaluator.decide(Some(DEFAULT_SUPER_ROLE), &PermissionSet::new(), "x", None, None),
            Decision::Allow(Grant::SuperRole)
        );
    }

    #[test]
    fn test_custom_super_role_name() {
        let evaluator = Evaluator::new("root");
        let root = role("root", &[]);
        let commissioner = role(DEFAULT_SUPER_ROLE, &[]);

        assert!(evaluator.check_permission(&root, "cases", None, None));
        assert!(!evaluator.check_permission(&commissioner, "cases", None, None));
    }

    #[test]
    fn test_invalid_qualifier_denies() {
        let evaluator = Evaluator::default();
        let admin = role("auditor", &["*"]);
        match evaluator.decide(Some("auditor"), &admin.permissions, "cases", Some(""), None) {
            Decision::Deny(DenyReason::InvalidCandidate(_)) => {}
            other => panic!("Expected invalid candidate deny, got {:?}", other),
        }
        assert!(!evaluator.check_permission(&admin, "cases", Some("a:b"), Some("c")));
    }
}
