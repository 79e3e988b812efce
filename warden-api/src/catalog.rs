//! Permission catalog for the console's modules
//!
//! Every module exposes the four standard actions; a few carry extras.

use crate::{ModelError, Permission, PermissionSet, SEPARATOR};

/// Actions every module supports
pub const STANDARD_ACTIONS: [&str; 4] = ["read", "create", "update", "delete"];

/// Modules known to the console
pub const CONSOLE_MODULES: [&str; 11] = [
    "personnel",
    "cases",
    "resources",
    "reports",
    "analytics",
    "incidents",
    "intelligence",
    "wanted",
    "communications",
    "approvals",
    "admin",
];

/// Module-specific actions beyond the standard four
pub fn extra_actions(module: &str) -> &'static [&'static str] {
    match module {
        "resources" => &["request", "approve"],
        "reports" => &["export"],
        "admin" => &["users", "roles", "settings"],
        _ => &[],
    }
}

/// All grantable `module:action` permissions for a module
pub fn module_permissions(module: &str) -> Result<Vec<Permission>, ModelError> {
    STANDARD_ACTIONS
        .iter()
        .chain(extra_actions(module))
        .map(|action| Permission::from_parts(module, None, Some(action)))
        .collect()
}

/// Add every catalog permission of a module to the set
pub fn grant_module(set: &mut PermissionSet, module: &str) -> Result<(), ModelError> {
    set.extend(module_permissions(module)?);
    Ok(())
}

/// Remove every permission scoped to a module, including `module:*`
pub fn revoke_module(set: &mut PermissionSet, module: &str) {
    let prefix = format!("{}{}", module, SEPARATOR);
    set.retain(|p| p.as_str() != module && !p.as_str().starts_with(&prefix));
}

/// Whether every catalog permission of a module is present
pub fn has_full_module(set: &PermissionSet, module: &str) -> bool {
    match module_permissions(module) {
        Ok(permissions) => permissions.iter().all(|p| set.contains(p)),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_permissions_include_extras() {
        let resources: Vec<String> = module_permissions("resources")
            .unwrap()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert!(resources.contains(&"resources:approve".to_string()));
        assert!(resources.contains(&"resources:request".to_string()));
        assert_eq!(resources.len(), 6);

        assert_eq!(module_permissions("cases").unwrap().len(), 4);
        assert_eq!(module_permissions("admin").unwrap().len(), 7);
    }

    #[test]
    fn test_grant_and_revoke_module() {
        let mut set = PermissionSet::parse(["reports:read", "cases:*"]).unwrap();

        grant_module(&mut set, "reports").unwrap();
        assert!(has_full_module(&set, "reports"));
        assert!(set.contains_str("reports:export"));

        revoke_module(&mut set, "cases");
        assert!(!set.contains_str("cases:*"));
        assert!(set.contains_str("reports:read"));

        revoke_module(&mut set, "reports");
        assert!(set.is_empty());
    }
}
