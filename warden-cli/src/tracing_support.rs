//! Tracing and logging support.
//!
//! Logs go to stderr so that command output on stdout stays parseable.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TracingFormat {
    /// Human-readable format with colors.
    Pretty,

    /// Compact single-line format (default for the CLI).
    Compact,

    /// JSON format (recommended for log shipping).
    Json,
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter.
    ///
    /// If None, uses RUST_LOG environment variable or defaults to "info".
    pub level: Option<tracing::Level>,

    /// Output format.
    pub format: TracingFormat,

    /// Include timestamps in output.
    pub timestamps: bool,

    /// Include target module names in output.
    pub target: bool,

    /// Include thread IDs in output.
    pub thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: TracingFormat::Compact,
            timestamps: true,
            target: true,
            thread_ids: false,
        }
    }
}

impl TracingConfig {
    /// Level for a `-v` count: none keeps the default, 1 is debug, 2+ is trace.
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        self.level = match verbose {
            0 => self.level,
            1 => Some(tracing::Level::DEBUG),
            _ => Some(tracing::Level::TRACE),
        };
        self
    }

    fn filter(&self) -> EnvFilter {
        match self.level {
            Some(level) => EnvFilter::new(level.to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        }
    }
}

/// Initialize tracing subscriber with custom configuration.
///
/// Without an explicit level, `RUST_LOG` decides (default "info"), e.g.
/// `RUST_LOG=warden_engine=trace`.
///
/// # Example
///
/// ```ignore
/// use warden_cli::tracing_support::{init_subscriber_with_config, TracingConfig, TracingFormat};
///
/// let config = TracingConfig {
///     format: TracingFormat::Json,
///     ..Default::default()
/// };
/// init_subscriber_with_config(config);
/// ```
pub fn init_subscriber_with_config(config: TracingConfig) {
    let registry = tracing_subscriber::registry().with(config.filter());
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.target)
        .with_thread_ids(config.thread_ids);

    match (config.format, config.timestamps) {
        (TracingFormat::Pretty, true) => registry.with(layer.pretty()).init(),
        (TracingFormat::Pretty, false) => registry.with(layer.pretty().without_time()).init(),
        (TracingFormat::Compact, true) => registry.with(layer.compact()).init(),
        (TracingFormat::Compact, false) => registry.with(layer.compact().without_time()).init(),
        (TracingFormat::Json, true) => registry.with(layer.json()).init(),
        (TracingFormat::Json, false) => registry.with(layer.json().without_time()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.format, TracingFormat::Compact);
        assert!(config.timestamps);
        assert!(config.target);
        assert!(!config.thread_ids);
        assert!(config.level.is_none());
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(TracingConfig::default().with_verbosity(0).level, None);
        assert_eq!(
            TracingConfig::default().with_verbosity(1).level,
            Some(tracing::Level::DEBUG)
        );
        assert_eq!(
            TracingConfig::default().with_verbosity(3).level,
            Some(tracing::Level::TRACE)
        );
    }
}
