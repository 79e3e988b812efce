//! # warden: administrative CLI for the permission engine
//!
//! Inspect and edit the roles file, and ask what a given user may do.
//!
//! ```text
//! warden roles list
//! warden roles create clerk --display-name "Clerk" --permission reports:read
//! warden check --user 3 cases:update
//! warden can --user 4 personnel read self
//! warden menu --user 2
//! ```
//!
//! Output goes to stdout, logs to stderr. Exit codes: 0 on success or an
//! allowed check, 1 for user errors and denied checks, 101 for system
//! failures.

pub mod build_info;
pub mod cli;
pub mod commands;
pub mod tracing_support;

pub use build_info::{version_info, version_short};
pub use tracing_support::{init_subscriber_with_config, TracingConfig, TracingFormat};

use warden_engine::{ConfigError, LoadError, ModelError, PresetError, RegistryError, StoreError};

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Error Types
// ============================================================================

/// Top-level error type for CLI operations.
///
/// Distinguishes between user-fixable errors (exit code 1) and system failures (exit code 101).
#[derive(Debug)]
pub enum CliError {
    /// User-fixable errors (exit code 1).
    User(UserError),

    /// System-level failures (exit code 101).
    System(SystemError),
}

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::User(_) => 1,
            CliError::System(_) => 101,
        }
    }

    /// Convenience constructor for user errors.
    pub fn user(message: impl Into<String>) -> Self {
        CliError::User(UserError::Generic(message.into()))
    }

    /// Convenience constructor for system errors.
    pub fn system(message: impl Into<String>) -> Self {
        CliError::System(SystemError::Internal(message.into()))
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::User(e) => write!(f, "{}", e),
            CliError::System(e) => write!(f, "{}", e),
        }
    }
}

/// User-fixable errors (exit code 1).
#[derive(Debug)]
pub enum UserError {
    /// Generic user error with a message.
    Generic(String),

    /// Invalid argument provided.
    InvalidArgument { arg: String, reason: String },

    /// The named record does not exist.
    NotFound { what: String },

    /// The operation was refused; the hint says how to proceed.
    Rejected { reason: String, fix_hint: String },
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserError::Generic(msg) => write!(f, "Error: {}", msg),
            UserError::InvalidArgument { arg, reason } => {
                write!(f, "Error: Invalid argument '{}'\n\n{}", arg, reason)
            }
            UserError::NotFound { what } => write!(f, "Error: {} not found", what),
            UserError::Rejected { reason, fix_hint } => {
                write!(f, "Error: {}\n\nHint: {}", reason, fix_hint)
            }
        }
    }
}

/// System-level failures (exit code 101).
#[derive(Debug)]
pub enum SystemError {
    /// Generic internal error.
    Internal(String),

    /// I/O error.
    Io(std::io::Error),

    /// Configuration parsing error.
    ConfigParse(String),

    /// The roles file could not be read or written.
    Store(String),
}

impl std::fmt::Display for SystemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemError::Internal(msg) => {
                write!(f, "Internal Error: {}\n\nThis is likely a bug.", msg)
            }
            SystemError::Io(e) => write!(f, "Internal Error: I/O operation failed\n\n{}", e),
            SystemError::ConfigParse(e) => write!(f, "Internal Error: Config parse failed\n\n{}", e),
            SystemError::Store(e) => write!(f, "Internal Error: Role store failed\n\n{}", e),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::System(SystemError::Io(e))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::system(format!("Failed to serialize output: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Invalid(reason) => CliError::User(UserError::InvalidArgument {
                arg: "--config".into(),
                reason,
            }),
            other => CliError::System(SystemError::ConfigParse(other.to_string())),
        }
    }
}

impl From<ModelError> for CliError {
    fn from(e: ModelError) -> Self {
        CliError::User(UserError::InvalidArgument {
            arg: "role".into(),
            reason: e.to_string(),
        })
    }
}

impl From<PresetError> for CliError {
    fn from(e: PresetError) -> Self {
        match e {
            PresetError::InvalidConfig(reason) => CliError::User(UserError::InvalidArgument {
                arg: "--config".into(),
                reason,
            }),
            other => CliError::System(SystemError::Store(other.to_string())),
        }
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ReadOnly => CliError::User(UserError::Rejected {
                reason: "The roles file is read-only".into(),
                fix_hint: "Drop --read-only (or `read_only` in the config) to edit roles".into(),
            }),
            StoreError::NotFound(id) => CliError::User(UserError::NotFound {
                what: format!("Role {}", id),
            }),
            other => CliError::System(SystemError::Store(other.to_string())),
        }
    }
}

impl From<RegistryError> for CliError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Store(e) => e.into(),
            RegistryError::Model(e) => e.into(),
            RegistryError::RoleNotFound(id) => CliError::User(UserError::NotFound {
                what: format!("Role {}", id),
            }),
            e @ RegistryError::RoleInUse { .. } => CliError::User(UserError::Rejected {
                reason: e.to_string(),
                fix_hint: "Assign those users another role first".into(),
            }),
            e @ RegistryError::ProtectedRole(_) => CliError::User(UserError::Rejected {
                reason: e.to_string(),
                fix_hint: "The super-role is configured with `super_role`".into(),
            }),
            e @ RegistryError::DuplicateRoleName(_) => CliError::User(UserError::InvalidArgument {
                arg: "name".into(),
                reason: e.to_string(),
            }),
        }
    }
}

impl From<LoadError> for CliError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::Registry(e) => e.into(),
            other => CliError::User(UserError::Generic(other.to_string())),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Response returned by command handlers.
///
/// Contains exit code and output to be displayed to the user.
#[derive(Debug)]
pub struct Response {
    /// Exit code (0 = success, 1 = user error or denied, 101 = system error).
    pub exit_code: i32,

    /// Output to display (text or JSON).
    pub output: Output,
}

impl Response {
    /// Create a successful response with text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: Output::Text(content.into()),
        }
    }

    /// Create a successful response with JSON output.
    pub fn json(value: &impl serde::Serialize) -> CliResult<Self> {
        Ok(Self {
            exit_code: 0,
            output: Output::Json(serde_json::to_string_pretty(value)?),
        })
    }

    /// Report an access decision; denied exits with 1.
    pub fn decision(allowed: bool) -> Self {
        Self {
            exit_code: if allowed { 0 } else { 1 },
            output: Output::Text(if allowed { "allowed" } else { "denied" }.into()),
        }
    }
}

/// Output type for responses.
#[derive(Debug)]
pub enum Output {
    /// Text output (printed to stdout).
    Text(String),

    /// JSON output (for machine-readable responses).
    Json(String),
}

impl Output {
    /// Check if output is empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Output::Text(s) | Output::Json(s) => s.is_empty(),
        }
    }

    /// Check if output is JSON.
    pub fn is_json(&self) -> bool {
        matches!(self, Output::Json(_))
    }
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Output::Text(s) | Output::Json(s) => write!(f, "{}", s),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use warden_api::{RoleId, RoleName};

    #[test]
    fn test_user_error_exit_code() {
        let err = CliError::user("test error");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_system_error_exit_code() {
        let err = CliError::system("test error");
        assert_eq!(err.exit_code(), 101);
    }

    #[test]
    fn test_registry_errors_are_user_errors() {
        let in_use: CliError = RegistryError::RoleInUse {
            name: RoleName::new("officer").unwrap(),
            users: 3,
        }
        .into();
        assert_eq!(in_use.exit_code(), 1);
        assert!(in_use.to_string().contains("Hint:"));

        let missing: CliError = RegistryError::RoleNotFound(RoleId(9)).into();
        assert_eq!(missing.to_string(), "Error: Role 9 not found");

        let read_only: CliError = RegistryError::Store(StoreError::ReadOnly).into();
        assert_eq!(read_only.exit_code(), 1);
    }

    #[test]
    fn test_store_failures_are_system_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CliError = RegistryError::Store(StoreError::Read(io)).into();
        assert_eq!(err.exit_code(), 101);
    }

    #[test]
    fn test_decision_response() {
        let allowed = Response::decision(true);
        assert_eq!(allowed.exit_code, 0);
        assert_eq!(allowed.output.to_string(), "allowed");

        let denied = Response::decision(false);
        assert_eq!(denied.exit_code, 1);
        assert_eq!(denied.output.to_string(), "denied");
    }

    #[test]
    fn test_json_response() {
        let response = Response::json(&serde_json::json!({"allowed": true})).unwrap();
        assert_eq!(response.exit_code, 0);
        assert!(response.output.is_json());
        assert!(!response.output.is_empty());
    }
}
