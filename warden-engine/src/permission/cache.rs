//! User permission cache
//!
//! Holds the resolved permission set of the active user in a single slot.
//! The slot is replaced wholesale: readers take an `Arc` snapshot and never
//! observe a half-written set.
//!
//! Loads are bracketed by a [`LoadTicket`]. Invalidation bumps the cache
//! epoch, so a ticket issued before a logout settles into nothing.
//!
//! Contents belong to the user they were loaded for. The `*_for` accessors
//! only answer for that user holding that role, so a logout or user switch
//! denies before any session event has been handled.

use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use warden_api::{CurrentUser, PermissionSet, RoleName, UserId};

use super::evaluator;

/// Lifecycle of the cache slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing loaded in this epoch
    Unloaded,
    /// At least one load is in flight
    Loading,
    /// A load completed successfully
    Loaded,
    /// The last load failed; the set is empty until a fresh load succeeds
    Failed,
}

/// A user's permissions as resolved from their role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPermissions {
    pub user_id: UserId,
    pub role: RoleName,
    pub permissions: PermissionSet,
    pub loaded_at: DateTime<Utc>,
}

impl ResolvedPermissions {
    pub fn new(user_id: UserId, role: RoleName, permissions: PermissionSet) -> Self {
        Self {
            user_id,
            role,
            permissions,
            loaded_at: Utc::now(),
        }
    }

    /// Whether these permissions answer for `user` as currently logged in
    pub fn belongs_to(&self, user: &CurrentUser) -> bool {
        user.is_authenticated
            && user.id == self.user_id
            && user.role.as_deref() == Some(self.role.as_str())
    }
}

#[derive(Debug, Default)]
struct Slot {
    epoch: u64,
    in_flight: usize,
    failed: Option<UserId>,
    resolved: Option<Arc<ResolvedPermissions>>,
}

impl Slot {
    fn state(&self) -> CacheState {
        if self.in_flight > 0 {
            CacheState::Loading
        } else if self.resolved.is_some() {
            CacheState::Loaded
        } else if self.failed.is_some() {
            CacheState::Failed
        } else {
            CacheState::Unloaded
        }
    }

    fn state_for(&self, user: Option<&CurrentUser>) -> CacheState {
        let Some(user) = user.filter(|u| u.is_authenticated) else {
            return CacheState::Unloaded;
        };
        if self.in_flight > 0 {
            return CacheState::Loading;
        }
        match &self.resolved {
            Some(resolved) if resolved.belongs_to(user) => CacheState::Loaded,
            Some(_) => CacheState::Unloaded,
            None if self.failed == Some(user.id) => CacheState::Failed,
            None => CacheState::Unloaded,
        }
    }
}

/// Process-wide cache of the active user's permissions
#[derive(Debug, Clone, Default)]
pub struct PermissionCache {
    slot: Arc<RwLock<Slot>>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a load for `user_id` in the current epoch
    pub fn begin_load(&self, user_id: UserId) -> LoadTicket {
        let mut slot = self.write();
        slot.in_flight += 1;
        LoadTicket {
            slot: self.slot.clone(),
            epoch: slot.epoch,
            user_id,
            settled: false,
        }
    }

    /// Clear the slot and orphan every in-flight load
    pub fn invalidate(&self) {
        let mut slot = self.write();
        slot.epoch += 1;
        slot.in_flight = 0;
        slot.failed = None;
        slot.resolved = None;
    }

    /// State of the slot regardless of who is logged in
    pub fn state(&self) -> CacheState {
        self.read().state()
    }

    pub fn is_loading(&self) -> bool {
        self.read().in_flight > 0
    }

    /// Whether a load has completed successfully in the current epoch
    pub fn is_loaded(&self) -> bool {
        self.read().resolved.is_some()
    }

    /// Current epoch; bumped by every invalidation
    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    /// State as seen by `user`; contents loaded for someone else count as
    /// unloaded
    pub fn state_for(&self, user: Option<&CurrentUser>) -> CacheState {
        self.read().state_for(user)
    }

    /// The current resolved permissions, whoever they were loaded for
    pub fn snapshot(&self) -> Option<Arc<ResolvedPermissions>> {
        self.read().resolved.clone()
    }

    /// The resolved permissions if they belong to `user`
    pub fn snapshot_for(&self, user: &CurrentUser) -> Option<Arc<ResolvedPermissions>> {
        self.snapshot().filter(|r| r.belongs_to(user))
    }

    /// The permission set of `user`, empty when nothing of theirs is loaded
    pub fn permissions_for(&self, user: &CurrentUser) -> PermissionSet {
        self.snapshot_for(user)
            .map(|r| r.permissions.clone())
            .unwrap_or_default()
    }

    /// Check a candidate for `user` against the cached set
    ///
    /// Denies when the cache holds nothing of theirs or the candidate is
    /// malformed.
    pub fn has_permission(&self, user: &CurrentUser, candidate: &str) -> bool {
        let Some(resolved) = self.snapshot_for(user) else {
            return false;
        };
        match evaluator::has_permission(&resolved.permissions, candidate) {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::debug!(candidate, error = %e, "Invalid permission candidate");
                false
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An in-flight load
///
/// Settle it with [`LoadTicket::complete`] or [`LoadTicket::fail`]. A ticket
/// dropped unsettled (e.g. a cancelled load) just stops counting as in flight.
#[must_use = "a load ticket must be completed or failed"]
#[derive(Debug)]
pub struct LoadTicket {
    slot: Arc<RwLock<Slot>>,
    epoch: u64,
    user_id: UserId,
    settled: bool,
}

impl LoadTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Whether the cache was invalidated since this load began
    pub fn is_stale(&self) -> bool {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).epoch != self.epoch
    }

    /// Publish a successful load; returns `false` if the ticket went stale
    pub fn complete(mut self, resolved: ResolvedPermissions) -> bool {
        self.settle(|slot| {
            slot.failed = None;
            slot.resolved = Some(Arc::new(resolved));
        })
    }

    /// Record a failed load; the cache is left empty
    pub fn fail(mut self) -> bool {
        let user_id = self.user_id;
        self.settle(|slot| {
            slot.failed = Some(user_id);
            slot.resolved = None;
        })
    }

    fn settle(&mut self, f: impl FnOnce(&mut Slot)) -> bool {
        self.settled = true;
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.epoch != self.epoch {
            return false;
        }
        slot.in_flight = slot.in_flight.saturating_sub(1);
        f(&mut slot);
        true
    }
}

impl Drop for LoadTicket {
    fn drop(&mut self) {
        if !self.settled {
            let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
            if slot.epoch == self.epoch {
                slot.in_flight = slot.in_flight.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commander() -> CurrentUser {
        CurrentUser::authenticated(UserId(3), "station_commander")
    }

    fn resolved(permissions: &[&str]) -> ResolvedPermissions {
        ResolvedPermissions::new(
            UserId(3),
            RoleName::new("station_commander").unwrap(),
            PermissionSet::parse(permissions).unwrap(),
        )
    }

    #[test]
    fn test_empty_cache_denies() {
        let cache = PermissionCache::new();
        assert_eq!(cache.state(), CacheState::Unloaded);
        assert!(!cache.has_permission(&commander(), "cases:read"));
        assert!(!cache.has_permission(&commander(), ""));
        assert!(cache.permissions_for(&commander()).is_empty());
    }

    #[test]
    fn test_load_lifecycle() {
        let cache = PermissionCache::new();

        let ticket = cache.begin_load(UserId(3));
        assert_eq!(cache.state(), CacheState::Loading);
        assert!(cache.is_loading());
        assert!(!cache.is_loaded());

        assert!(ticket.complete(resolved(&["cases:read"])));
        assert_eq!(cache.state(), CacheState::Loaded);
        assert!(cache.has_permission(&commander(), "cases:read"));
        assert!(!cache.has_permission(&commander(), "cases:delete"));

        cache.invalidate();
        assert_eq!(cache.state(), CacheState::Unloaded);
        assert!(!cache.has_permission(&commander(), "cases:read"));
    }

    #[test]
    fn test_failed_load_leaves_cache_empty() {
        let cache = PermissionCache::new();
        let ticket = cache.begin_load(UserId(3));
        ticket.complete(resolved(&["cases:read"]));

        assert!(cache.begin_load(UserId(3)).fail());
        assert_eq!(cache.state(), CacheState::Failed);
        assert!(!cache.has_permission(&commander(), "cases:read"));

        assert!(cache.begin_load(UserId(3)).complete(resolved(&["cases:read"])));
        assert_eq!(cache.state(), CacheState::Loaded);
    }

    #[test]
    fn test_stale_ticket_is_discarded() {
        let cache = PermissionCache::new();
        let ticket = cache.begin_load(UserId(3));

        cache.invalidate();
        assert!(ticket.is_stale());
        assert!(!ticket.complete(resolved(&["*"])));

        assert_eq!(cache.state(), CacheState::Unloaded);
        assert!(!cache.has_permission(&commander(), "cases:read"));
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = PermissionCache::new();
        let first = cache.begin_load(UserId(3));
        let second = cache.begin_load(UserId(3));

        assert!(second.complete(resolved(&["cases:read"])));
        assert!(cache.is_loading());
        assert!(first.complete(resolved(&["reports:read"])));

        assert!(!cache.is_loading());
        assert!(cache.has_permission(&commander(), "reports:read"));
        assert!(!cache.has_permission(&commander(), "cases:read"));
    }

    #[test]
    fn test_dropped_ticket_stops_loading() {
        let cache = PermissionCache::new();
        {
            let _ticket = cache.begin_load(UserId(3));
            assert!(cache.is_loading());
        }
        assert!(!cache.is_loading());
        assert_eq!(cache.state(), CacheState::Unloaded);
    }

    #[test]
    fn test_snapshot_survives_invalidation() {
        let cache = PermissionCache::new();
        cache.begin_load(UserId(3)).complete(resolved(&["cases:read"]));

        let snapshot = cache.snapshot().unwrap();
        cache.invalidate();

        assert!(snapshot.permissions.contains_str("cases:read"));
        assert!(cache.snapshot().is_none());
    }

    #[test]
    fn test_contents_answer_only_for_their_owner() {
        let cache = PermissionCache::new();
        cache.begin_load(UserId(3)).complete(resolved(&["cases:*"]));
        let commander = commander();

        assert_eq!(cache.state_for(Some(&commander)), CacheState::Loaded);
        assert!(cache.has_permission(&commander, "cases:delete"));

        let officer = CurrentUser::authenticated(UserId(4), "officer");
        assert_eq!(cache.state_for(Some(&officer)), CacheState::Unloaded);
        assert!(!cache.has_permission(&officer, "cases:delete"));
        assert!(cache.snapshot_for(&officer).is_none());

        let demoted = CurrentUser::authenticated(UserId(3), "officer");
        assert!(!cache.has_permission(&demoted, "cases:delete"));

        let logged_out = CurrentUser {
            is_authenticated: false,
            ..commander.clone()
        };
        assert!(!cache.has_permission(&logged_out, "cases:delete"));
        assert_eq!(cache.state_for(None), CacheState::Unloaded);
    }

    #[test]
    fn test_failure_reported_to_its_user_only() {
        let cache = PermissionCache::new();
        assert!(cache.begin_load(UserId(3)).fail());

        assert_eq!(cache.state_for(Some(&commander())), CacheState::Failed);
        let officer = CurrentUser::authenticated(UserId(4), "officer");
        assert_eq!(cache.state_for(Some(&officer)), CacheState::Unloaded);
    }
}
