//! Authentication collaborator
//!
//! The engine does not authenticate anyone. It asks an [`AuthProvider`] who
//! the current user is and listens to its events to keep the permission
//! cache in step with logins, logouts and role changes.

use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use warden_api::{CurrentUser, UserId};

/// Buffered events per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 64;

/// Session transitions the permission cache reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn(CurrentUser),
    LoggedOut,
    RoleChanged { user_id: UserId, role: Option<String> },
}

/// Source of the current principal and of session events
pub trait AuthProvider: Send + Sync {
    /// The current principal, `None` when nobody is logged in
    fn current_user(&self) -> Option<CurrentUser>;

    /// Subscribe to session events
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// In-process session holder
#[derive(Debug)]
pub struct SessionAuth {
    current: RwLock<Option<CurrentUser>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SessionAuth {
    /// A session with nobody logged in
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            current: RwLock::new(None),
            events,
        }
    }

    /// A session already logged in as `user`, without emitting an event
    pub fn logged_in(user: CurrentUser) -> Self {
        let session = Self::new();
        *session.write() = Some(user);
        session
    }

    pub fn login(&self, user: CurrentUser) {
        tracing::info!(user = %user.id, role = ?user.role, "User logged in");
        *self.write() = Some(user.clone());
        self.emit(AuthEvent::LoggedIn(user));
    }

    pub fn logout(&self) {
        let previous = self.write().take();
        if let Some(user) = previous {
            tracing::info!(user = %user.id, "User logged out");
        }
        self.emit(AuthEvent::LoggedOut);
    }

    /// Change the role of the logged-in user
    ///
    /// Returns `false` if `user_id` is not the current user.
    pub fn change_role(&self, user_id: UserId, role: Option<String>) -> bool {
        {
            let mut current = self.write();
            match current.as_mut() {
                Some(user) if user.id == user_id => user.role = role.clone(),
                _ => return false,
            }
        }
        tracing::info!(user = %user_id, role = ?role, "User role changed");
        self.emit(AuthEvent::RoleChanged { user_id, role });
        true
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<CurrentUser>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthProvider for SessionAuth {
    fn current_user(&self) -> Option<CurrentUser> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_events() {
        let auth = SessionAuth::new();
        let mut events = auth.subscribe();
        assert!(auth.current_user().is_none());

        let user = CurrentUser::authenticated(UserId(4), "officer");
        auth.login(user.clone());
        assert_eq!(auth.current_user(), Some(user.clone()));
        assert_eq!(events.recv().await.unwrap(), AuthEvent::LoggedIn(user));

        assert!(auth.change_role(UserId(4), Some("station_commander".into())));
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::RoleChanged {
                user_id: UserId(4),
                role: Some("station_commander".into())
            }
        );
        assert_eq!(
            auth.current_user().unwrap().role.as_deref(),
            Some("station_commander")
        );

        auth.logout();
        assert!(auth.current_user().is_none());
        assert_eq!(events.recv().await.unwrap(), AuthEvent::LoggedOut);
    }

    #[test]
    fn test_change_role_requires_current_user() {
        let auth = SessionAuth::logged_in(CurrentUser::authenticated(UserId(1), "officer"));
        assert!(!auth.change_role(UserId(2), None));
        assert_eq!(auth.current_user().unwrap().role.as_deref(), Some("officer"));

        auth.logout();
        assert!(!auth.change_role(UserId(1), None));
    }
}
