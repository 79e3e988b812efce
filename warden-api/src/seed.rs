//! Seed data for the records-management console
//!
//! Five roles from commissioner down to administrative staff, and one user
//! per role. Used to initialize role files and by tests.

use crate::{PermissionSet, Role, RoleId, RoleName, User, UserId, DEFAULT_SUPER_ROLE};

struct SeedRole {
    id: u64,
    name: &'static str,
    display_name: &'static str,
    description: &'static str,
    permissions: &'static [&'static str],
}

const ROLES: &[SeedRole] = &[
    SeedRole {
        id: 1,
        name: DEFAULT_SUPER_ROLE,
        display_name: "National Police Commissioner",
        description: "Highest authority in the national police force",
        permissions: &["*"],
    },
    SeedRole {
        id: 2,
        name: "provincial_commissioner",
        display_name: "Provincial Commissioner",
        description: "Head of police in a province",
        permissions: &[
            "personnel:read",
            "personnel:create",
            "personnel:update",
            "cases:read",
            "cases:create",
            "cases:update",
            "cases:delete",
            "resources:read",
            "resources:create",
            "resources:update",
            "resources:approve",
            "intelligence:read",
            "intelligence:create",
            "reports:read",
            "reports:create",
            "admin:read",
        ],
    },
    SeedRole {
        id: 3,
        name: "station_commander",
        display_name: "Station Commander",
        description: "Head of a police station",
        permissions: &[
            "personnel:read",
            "cases:read",
            "cases:create",
            "cases:update",
            "resources:read",
            "resources:request",
            "intelligence:read",
            "intelligence:create",
            "reports:read",
            "reports:create",
        ],
    },
    SeedRole {
        id: 4,
        name: "officer",
        display_name: "Police Officer",
        description: "Regular police officer",
        permissions: &[
            "personnel:read:self",
            "cases:read",
            "cases:create",
            "resources:read",
            "resources:request",
            "intelligence:read",
            "reports:read",
            "reports:create:self",
        ],
    },
    SeedRole {
        id: 5,
        name: "admin_staff",
        display_name: "Administrative Staff",
        description: "Non-officer administrative personnel",
        permissions: &[
            "personnel:read",
            "resources:read",
            "resources:create",
            "resources:update",
            "reports:read",
            "reports:create",
        ],
    },
];

const USERS: &[(u64, &str, &str, &str)] = &[
    (1, "Jean Kabila", "commissioner@police.cd", DEFAULT_SUPER_ROLE),
    (2, "Marie Tshombe", "province@police.cd", "provincial_commissioner"),
    (3, "Pierre Mulele", "station@police.cd", "station_commander"),
    (4, "Sophie Mobutu", "officer@police.cd", "officer"),
    (5, "Joseph Kasa-Vubu", "admin@police.cd", "admin_staff"),
];

/// The console's built-in roles
pub fn default_roles() -> Vec<Role> {
    ROLES
        .iter()
        .filter_map(|seed| {
            Some(Role {
                id: RoleId(seed.id),
                name: RoleName::new(seed.name).ok()?,
                display_name: seed.display_name.to_string(),
                description: seed.description.to_string(),
                permissions: PermissionSet::parse(seed.permissions).ok()?,
            })
        })
        .collect()
}

/// One user per built-in role
pub fn default_users() -> Vec<User> {
    USERS
        .iter()
        .map(|&(id, name, email, role)| User {
            id: UserId(id),
            name: name.to_string(),
            email: email.to_string(),
            role: Some(role.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_seed_roles_are_valid() {
        let roles = default_roles();
        assert_eq!(roles.len(), ROLES.len());
        assert!(roles[0].is_super_role());
    }

    #[test]
    fn test_every_user_references_a_seed_role() {
        let roles = default_roles();
        for user in default_users() {
            let role = user.role.as_deref().unwrap();
            assert!(roles.iter().any(|r| r.name == role), "{role} missing");
        }
    }
}
