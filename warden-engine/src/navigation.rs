//! Navigation menu filtering

use serde::Serialize;

use crate::service::PermissionService;

/// An entry in the console's navigation menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub id: String,
    pub label: String,
    pub path: String,
    /// Permission needed to see the entry; `None` is always visible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavItem>,
}

impl NavItem {
    pub fn new(id: &str, label: &str, path: &str, permission: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            path: path.to_string(),
            permission: permission.map(str::to_string),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<NavItem>) -> Self {
        self.children = children;
        self
    }
}

/// Items the current user may see
///
/// The super-role sees the whole tree. Everyone else sees entries without a
/// permission plus those whose permission they hold, recursively.
pub fn visible_items(service: &PermissionService, items: &[NavItem]) -> Vec<NavItem> {
    if service.is_super_role() {
        return items.to_vec();
    }
    filter_items(items, &|permission| service.can_do(permission))
}

fn filter_items(items: &[NavItem], allowed: &dyn Fn(&str) -> bool) -> Vec<NavItem> {
    items
        .iter()
        .filter(|item| item.permission.as_deref().map_or(true, allowed))
        .map(|item| NavItem {
            children: filter_items(&item.children, allowed),
            ..item.clone()
        })
        .collect()
}

/// The console's sidebar
pub fn console_menu() -> Vec<NavItem> {
    vec![
        NavItem::new("dashboard", "Dashboard", "/", None),
        NavItem::new("personnel", "Personnel Management", "/personnel", Some("personnel:read")),
        NavItem::new("cases", "Case Management", "/cases", Some("cases:read")),
        NavItem::new("resources", "Resource Management", "/resources", Some("resources:read")),
        NavItem::new("reports", "Reports", "/reports", Some("reports:read")),
        NavItem::new("analytics", "Analytics", "/analytics", Some("analytics:read")),
        NavItem::new("incidents", "Incident Tracking", "/incidents", Some("incidents:read")),
        NavItem::new("intelligence", "Intelligence", "/intelligence", Some("intelligence:read")),
        NavItem::new("wanted", "Wanted Persons", "/wanted", Some("wanted:read")),
        NavItem::new(
            "communications",
            "Communications",
            "/communications",
            Some("communications:read"),
        ),
        NavItem::new("approvals", "Approvals", "/approvals", Some("approvals:read")),
        NavItem::new("admin", "Administration", "/admin", Some("admin:read")).with_children(vec![
            NavItem::new("roles", "Role Management", "/admin/roles", Some("admin:roles")),
            NavItem::new("users", "User Management", "/admin/users", Some("admin:users")),
            NavItem::new("settings", "System Settings", "/admin/settings", Some("admin:settings")),
        ]),
    ]
}
