//! Hot reload for the roles file
//!
//! Watches the roles file for edits made outside the engine and, once the
//! edits settle, re-reads it, drops the registry snapshot and reloads the
//! active user's permissions.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::service::PermissionService;
use crate::store::FileRoleStore;

/// Configuration for the roles file watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for file events
    pub debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
        }
    }
}

/// Watches a [`FileRoleStore`]'s file and refreshes the service on change
pub struct RoleFileWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    shutdown_tx: mpsc::Sender<()>,
}

impl RoleFileWatcher {
    /// Start watching `store`'s file on behalf of `service`
    ///
    /// `service` must be backed by `store`.
    pub fn new(
        service: Arc<PermissionService>,
        store: Arc<FileRoleStore>,
        config: WatcherConfig,
    ) -> Result<Self, WatcherError> {
        let path = store.path().to_path_buf();
        // Watch the directory: editors often replace the file rather than
        // writing it in place.
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if !dir.exists() {
            return Err(WatcherError::MissingDirectory(dir));
        }

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(100);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = event_tx.blocking_send(event);
            }
        })
        .map_err(WatcherError::WatcherInit)?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(WatcherError::WatcherInit)?;
        tracing::info!(path = %path.display(), "Watching roles file");

        let file_name = path.file_name().map(|n| n.to_os_string());
        let debounce = config.debounce;
        tokio::spawn(async move {
            let mut debounce_timer: Option<tokio::time::Instant> = None;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Roles file watcher shutting down");
                        break;
                    }

                    Some(event) = event_rx.recv() => {
                        let touches_roles = event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                        if touches_roles {
                            debounce_timer = Some(tokio::time::Instant::now() + debounce);
                        }
                    }

                    _ = async {
                        if let Some(deadline) = debounce_timer {
                            tokio::time::sleep_until(deadline).await;
                        } else {
                            std::future::pending::<()>().await;
                        }
                    } => {
                        refresh(&service, &store).await;
                        debounce_timer = None;
                    }
                }
            }
        });

        Ok(Self {
            path,
            _watcher: watcher,
            shutdown_tx,
        })
    }

    /// The watched roles file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shutdown the watcher
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Re-read the roles file and bring the service up to date
///
/// A file that fails to parse is logged and ignored; the previous roles stay
/// in effect.
pub async fn refresh(service: &PermissionService, store: &FileRoleStore) {
    if let Err(e) = store.reload() {
        tracing::warn!(path = %store.path().display(), error = %e, "Ignoring unreadable roles file");
        return;
    }
    service.registry().invalidate().await;
    match service.reload_current().await {
        Ok(Some(resolved)) => {
            tracing::info!(user = %resolved.user_id, role = %resolved.role, "Roles file reloaded");
        }
        Ok(None) => tracing::info!("Roles file reloaded"),
        Err(e) => tracing::warn!(error = %e, "Roles file reloaded; active user has no valid role"),
    }
}

/// Errors that can occur during watching
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Failed to initialize watcher: {0}")]
    WatcherInit(#[source] notify::Error),

    #[error("Directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),
}
