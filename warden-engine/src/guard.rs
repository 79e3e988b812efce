//! Route guards
//!
//! Decides whether the current user may open a console route. Routes are
//! path patterns (`/cases/:id/edit`) with an optional required permission;
//! routes without one only need an authenticated user.

use std::sync::Arc;

use crate::permission::cache::CacheState;
use crate::service::PermissionService;

/// Where unauthenticated users are sent
pub const LOGIN_PATH: &str = "/auth/login";

/// A guarded route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub pattern: String,
    pub required: Option<String>,
}

impl Route {
    pub fn new(pattern: &str, required: Option<&str>) -> Self {
        Self {
            pattern: pattern.to_string(),
            required: required.map(str::to_string),
        }
    }

    /// Whether `path` matches this route; `:name` segments match any value
    pub fn matches(&self, path: &str) -> bool {
        let mut pattern = split_path(&self.pattern);
        let mut path = split_path(path);
        loop {
            match (pattern.next(), path.next()) {
                (None, None) => return true,
                (Some(p), Some(s)) if p.starts_with(':') || p == s => continue,
                _ => return false,
            }
        }
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Outcome of a route check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    Allow,
    /// Permissions are still resolving; render a loading state
    Loading,
    Unauthenticated { redirect: String },
    Forbidden { required: String },
    NotFound,
}

impl RouteAccess {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RouteAccess::Allow)
    }
}

/// The console's routes and the permission each requires
pub fn console_routes() -> Vec<Route> {
    let mut routes = vec![Route::new("/", None), Route::new("/profile", None)];
    for module in ["personnel", "cases", "resources"] {
        let read = format!("{module}:read");
        let create = format!("{module}:create");
        let update = format!("{module}:update");
        routes.push(Route::new(&format!("/{module}"), Some(&read)));
        routes.push(Route::new(&format!("/{module}/new"), Some(&create)));
        routes.push(Route::new(&format!("/{module}/:id"), Some(&read)));
        routes.push(Route::new(&format!("/{module}/:id/edit"), Some(&update)));
    }
    routes.push(Route::new("/admin", Some("admin:read")));
    for page in ["roles", "users", "settings"] {
        routes.push(Route::new(
            &format!("/admin/{page}"),
            Some(&format!("admin:{page}")),
        ));
    }
    routes
}

/// Route guard over a shared permission service
#[derive(Debug, Clone)]
pub struct RouteGuard {
    service: Arc<PermissionService>,
    routes: Vec<Route>,
    login_path: String,
}

impl RouteGuard {
    /// A guard over the console's routes
    pub fn new(service: Arc<PermissionService>) -> Self {
        Self::with_routes(service, console_routes())
    }

    pub fn with_routes(service: Arc<PermissionService>, routes: Vec<Route>) -> Self {
        Self {
            service,
            routes,
            login_path: LOGIN_PATH.to_string(),
        }
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// First route matching `path`
    pub fn route_for(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(path))
    }

    /// Decide from what is cached, without loading
    pub fn evaluate(&self, path: &str) -> RouteAccess {
        let Some(route) = self.route_for(path) else {
            return RouteAccess::NotFound;
        };
        self.evaluate_route(route)
    }

    /// Decide, loading the user's permissions first if nothing is cached
    pub async fn authorize(&self, path: &str) -> RouteAccess {
        let Some(route) = self.route_for(path) else {
            return RouteAccess::NotFound;
        };
        if route.required.is_some() && !self.service.is_loaded() {
            if let Some(user) = self.service.current_user() {
                if let Err(e) = self.service.load_user_permissions(user.id).await {
                    tracing::debug!(path, error = %e, "Permission load failed during route check");
                }
            }
        }
        self.evaluate_route(route)
    }

    fn evaluate_route(&self, route: &Route) -> RouteAccess {
        if self.service.current_user().is_none() {
            return RouteAccess::Unauthenticated {
                redirect: self.login_path.clone(),
            };
        }
        let Some(required) = route.required.as_deref() else {
            return RouteAccess::Allow;
        };
        if self.service.is_super_role() {
            return RouteAccess::Allow;
        }
        match self.service.cache_state() {
            CacheState::Unloaded | CacheState::Loading => RouteAccess::Loading,
            CacheState::Loaded | CacheState::Failed => {
                if self.service.has_permission(required) {
                    RouteAccess::Allow
                } else {
                    tracing::debug!(route = %route.pattern, required, "Route forbidden");
                    RouteAccess::Forbidden {
                        required: required.to_string(),
                    }
                }
            }
        }
    }
}
