//! Compile-time build information for `warden version`.

use serde::Serialize;

#[cfg(feature = "build-info")]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// What was built, from where, and with which compiler
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub package: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_at: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rustc: Option<&'static str>,
}

impl BuildInfo {
    #[cfg(feature = "build-info")]
    pub fn current() -> Self {
        Self {
            package: built_info::PKG_NAME,
            version: built_info::PKG_VERSION,
            target: Some(built_info::TARGET),
            built_at: Some(built_info::BUILT_TIME_UTC),
            commit: built_info::GIT_COMMIT_HASH_SHORT,
            rustc: Some(built_info::RUSTC_VERSION),
        }
    }

    #[cfg(not(feature = "build-info"))]
    pub fn current() -> Self {
        Self {
            package: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            target: None,
            built_at: None,
            commit: None,
            rustc: None,
        }
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.package, self.version)?;
        if let Some(target) = self.target {
            write!(f, " ({})", target)?;
        }
        if let Some(built_at) = self.built_at {
            write!(f, "\nBuilt: {}", built_at)?;
        }
        if self.built_at.is_some() {
            write!(f, "\nCommit: {}", self.commit.unwrap_or("unknown"))?;
        }
        if let Some(rustc) = self.rustc {
            write!(f, "\nRustc: {}", rustc)?;
        }
        Ok(())
    }
}

/// Multi-line version banner
///
/// ```text
/// warden-cli 0.3.0 (x86_64-unknown-linux-gnu)
/// Built: Mon, 19 Oct 2026 12:34:56 +0000
/// Commit: a1b2c3d
/// Rustc: rustc 1.82.0
/// ```
pub fn version_info() -> String {
    BuildInfo::current().to_string()
}

/// Package version only
pub fn version_short() -> &'static str {
    BuildInfo::current().version
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info_starts_with_package() {
        let info = version_info();
        assert!(info.starts_with("warden-cli "));
    }

    #[test]
    fn test_version_short() {
        assert_eq!(version_short(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_serializes_package() {
        let json = serde_json::to_string(&BuildInfo::current()).unwrap();
        assert!(json.contains("\"package\":\"warden-cli\""));
    }
}
