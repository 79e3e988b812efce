//! Audit trail for permission and role events
//!
//! Provides a trait-based audit system so deployments can send permission
//! loads, access decisions and role administration to their preferred
//! destination.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use thiserror::Error;
use warden_api::{Role, UserId};

use crate::permission::evaluator::{Decision, DenyReason, Grant};

/// Audit event representing a permission or role action
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// When the event happened (RFC 3339)
    pub timestamp: DateTime<Utc>,
    /// Type of event
    pub event_type: AuditEventType,
    /// User the event concerns, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserId>,
    /// Additional details
    pub details: AuditDetails,
}

impl AuditEvent {
    /// Create a new audit event stamped with the current time
    pub fn new(event_type: AuditEventType, details: AuditDetails) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            user: None,
            details,
        }
    }

    /// Attach the user the event concerns
    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }
}

/// Type of audit event
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A user's permissions were resolved into the cache
    PermissionsLoaded,
    /// Resolving a user's permissions failed
    PermissionsLoadFailed,
    /// The permission cache was cleared
    CacheInvalidated,
    /// A check was allowed
    AccessGranted,
    /// A check was denied
    AccessDenied,
    RoleCreated,
    RoleUpdated,
    RoleDeleted,
    /// A role deletion was refused
    RoleDeleteRejected,
}

/// Details about the audit event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AuditDetails {
    /// Permission load outcome
    Permissions {
        role: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fingerprint: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Access decision
    Check {
        permission: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        grant: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Role administration
    Role {
        id: u64,
        name: String,
        fingerprint: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Cache invalidation
    Invalidation { reason: String },
}

/// Error type for audit operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to write audit log: {0}")]
    WriteError(#[from] std::io::Error),

    #[error("Failed to serialize audit event: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Audit sink not available: {0}")]
    Unavailable(String),
}

/// Trait for audit event sinks
///
/// Implement this to customize where audit events are sent.
///
/// # Example
///
/// ```rust
/// use warden_engine::audit::{AuditError, AuditEvent, AuditSink};
///
/// struct SyslogSink;
///
/// impl AuditSink for SyslogSink {
///     fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
///         eprintln!("{:?}", event.event_type);
///         Ok(())
///     }
///
///     fn flush(&self) -> Result<(), AuditError> {
///         Ok(())
///     }
/// }
/// ```
pub trait AuditSink: Send + Sync {
    /// Record an audit event
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// Flush any buffered events
    fn flush(&self) -> Result<(), AuditError>;

    /// Check if the sink is healthy/available
    fn is_healthy(&self) -> bool {
        true
    }
}

impl<T: AuditSink + ?Sized> AuditSink for std::sync::Arc<T> {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        (**self).record(event)
    }

    fn flush(&self) -> Result<(), AuditError> {
        (**self).flush()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}

// ============================================================================
// Default Implementations
// ============================================================================

/// File-based audit sink (JSONL format)
///
/// Writes audit events to a file in JSON Lines format (one JSON object per line).
pub struct FileAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditSink {
    /// Create a new file audit sink, appending to an existing file
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Get the log file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(&event)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", json)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.flush()?;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.path.parent().map(|p| p.exists()).unwrap_or(true)
    }
}

impl fmt::Debug for FileAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAuditSink")
            .field("path", &self.path)
            .finish()
    }
}

/// In-memory audit sink for testing
pub struct MemoryAuditSink {
    events: RwLock<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl MemoryAuditSink {
    /// Create a new memory sink with default capacity (1000 events)
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// Create a new memory sink with specified capacity
    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(max_events.min(1000))),
            max_events,
        }
    }

    /// Get all recorded events, oldest first
    pub fn events(&self) -> Vec<AuditEvent> {
        self.read().iter().cloned().collect()
    }

    /// Get event count
    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Clear all events
    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Find events by type
    pub fn find_by_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Find events concerning a user
    pub fn find_by_user(&self, user: UserId) -> Vec<AuditEvent> {
        self.read()
            .iter()
            .filter(|e| e.user == Some(user))
            .cloned()
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, VecDeque<AuditEvent>> {
        self.events.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        if self.max_events == 0 {
            return Ok(());
        }
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if events.len() >= self.max_events {
            events.pop_front(); // FIFO eviction
        }
        events.push_back(event);
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

impl fmt::Debug for MemoryAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAuditSink")
            .field("count", &self.count())
            .field("max_events", &self.max_events)
            .finish()
    }
}

/// Null audit sink (discards all events)
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl NullAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Composite audit sink that writes to multiple sinks
pub struct CompositeAuditSink {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl CompositeAuditSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with_sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Default for CompositeAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for CompositeAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        for sink in &self.sinks {
            sink.record(event.clone())?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        for sink in &self.sinks {
            sink.flush()?;
        }
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.sinks.iter().all(|s| s.is_healthy())
    }
}

impl fmt::Debug for CompositeAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeAuditSink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Permissions were resolved for a user
pub fn permissions_loaded(user: UserId, role: &Role) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::PermissionsLoaded,
        AuditDetails::Permissions {
            role: role.name.to_string(),
            count: Some(role.permissions.len()),
            fingerprint: Some(role.permissions.fingerprint()),
            reason: None,
        },
    )
    .with_user(user)
}

/// Resolving permissions failed
pub fn permissions_load_failed(user: UserId, role: Option<&str>, reason: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::PermissionsLoadFailed,
        AuditDetails::Permissions {
            role: role.unwrap_or_default().to_string(),
            count: None,
            fingerprint: None,
            reason: Some(reason.to_string()),
        },
    )
    .with_user(user)
}

/// The permission cache was cleared
pub fn cache_invalidated(reason: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::CacheInvalidated,
        AuditDetails::Invalidation {
            reason: reason.to_string(),
        },
    )
}

/// An access decision
pub fn access_decision(user: Option<UserId>, permission: &str, decision: &Decision) -> AuditEvent {
    let (event_type, grant, reason) = match decision {
        Decision::Allow(grant) => (
            AuditEventType::AccessGranted,
            Some(grant_label(*grant).to_string()),
            None,
        ),
        Decision::Deny(DenyReason::NotGranted) => (
            AuditEventType::AccessDenied,
            None,
            Some("not granted".to_string()),
        ),
        Decision::Deny(DenyReason::InvalidCandidate(e)) => {
            (AuditEventType::AccessDenied, None, Some(e.to_string()))
        }
    };
    let event = AuditEvent::new(
        event_type,
        AuditDetails::Check {
            permission: permission.to_string(),
            grant,
            reason,
        },
    );
    match user {
        Some(user) => event.with_user(user),
        None => event,
    }
}

fn role_event(event_type: AuditEventType, role: &Role, reason: Option<String>) -> AuditEvent {
    AuditEvent::new(
        event_type,
        AuditDetails::Role {
            id: role.id.0,
            name: role.name.to_string(),
            fingerprint: role.permissions.fingerprint(),
            reason,
        },
    )
}

pub fn role_created(role: &Role) -> AuditEvent {
    role_event(AuditEventType::RoleCreated, role, None)
}

pub fn role_updated(role: &Role) -> AuditEvent {
    role_event(AuditEventType::RoleUpdated, role, None)
}

pub fn role_deleted(role: &Role) -> AuditEvent {
    role_event(AuditEventType::RoleDeleted, role, None)
}

/// A deletion was refused (role in use or protected)
pub fn role_delete_rejected(role: &Role, reason: &str) -> AuditEvent {
    role_event(
        AuditEventType::RoleDeleteRejected,
        role,
        Some(reason.to_string()),
    )
}

fn grant_label(grant: Grant) -> &'static str {
    match grant {
        Grant::SuperRole => "super_role",
        Grant::GlobalWildcard => "global_wildcard",
        Grant::Exact => "exact",
        Grant::ModuleWildcard => "module_wildcard",
    }
}
