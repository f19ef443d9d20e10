//! File watcher for fleet configuration hot-reload.
//!
//! Watches the configuration file's directory (and the `data/` directory
//! holding body includes) for changes, debounces rapid event bursts, and
//! re-runs the full resolver. A successful resolve is swapped into the
//! [`SharedConfig`]; a failing one is logged and the previous revision
//! stays live.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

use crate::resolve::load_config;
use crate::resolved::ResolvedConfig;
use crate::shared::SharedConfig;

/// Default debounce interval for filesystem change events.
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Callback invoked with each successfully published revision.
pub type ReloadHook = Arc<dyn Fn(Arc<ResolvedConfig>) + Send + Sync>;

/// Watches the fleet config file and triggers hot-reloads.
///
/// Editors commonly rewrite files via rename, which replaces the inode the
/// watcher is bound to; watching the parent directory and re-adding the
/// watch after every burst tolerates that pattern.
pub struct ConfigWatcher {
    shared: Arc<SharedConfig>,
    config_path: PathBuf,
    debounce: Duration,
    on_reload: Option<ReloadHook>,
}

impl ConfigWatcher {
    /// Create a new watcher over `config_path`.
    pub fn new(shared: Arc<SharedConfig>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            shared,
            config_path: config_path.into(),
            debounce: DEFAULT_DEBOUNCE,
            on_reload: None,
        }
    }

    /// Override the default debounce duration.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Register a hook invoked after each published revision (cache flush,
    /// scheduler reconciliation).
    #[must_use]
    pub fn with_reload_hook(mut self, hook: ReloadHook) -> Self {
        self.on_reload = Some(hook);
        self
    }

    /// Spawn the watcher as a background tokio task.
    ///
    /// Returns a `JoinHandle` that can be aborted to stop watching.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!(error = %e, "config watcher exited with error");
            }
        })
    }

    async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(16);

        let watch_dir = self
            .config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let data_dir = watch_dir.join("data");

        let mut watcher = {
            let tx = tx.clone();
            RecommendedWatcher::new(
                move |res: Result<notify::Event, notify::Error>| match res {
                    Ok(event) => {
                        if is_relevant_event(event.kind) {
                            // Best-effort send; a full channel already has a
                            // reload queued.
                            let _ = tx.try_send(());
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "filesystem watcher error");
                    }
                },
                notify::Config::default(),
            )?
        };
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
        if data_dir.is_dir() {
            watcher.watch(&data_dir, RecursiveMode::Recursive)?;
        }
        info!(path = %self.config_path.display(), "config watcher started");

        loop {
            if rx.recv().await.is_none() {
                debug!("config watcher channel closed, shutting down");
                break;
            }

            // Debounce: drain events arriving within the window.
            tokio::time::sleep(self.debounce).await;
            while rx.try_recv().is_ok() {}

            self.reload();

            // Re-add watches in case the directory entries were replaced by
            // a rename/remove cycle.
            let _ = watcher.watch(&watch_dir, RecursiveMode::NonRecursive);
            if data_dir.is_dir() {
                let _ = watcher.watch(&data_dir, RecursiveMode::Recursive);
            }
        }

        Ok(())
    }

    /// Re-run the resolver and publish the result.
    fn reload(&self) {
        info!(path = %self.config_path.display(), "reloading fleet config");
        match load_config(&self.config_path) {
            Ok(config) => {
                let revision = self.shared.swap(config);
                info!(revision, "fleet config reloaded");
                if let Some(ref hook) = self.on_reload {
                    hook(self.shared.load());
                }
            }
            Err(e) => {
                error!(error = %e, "fleet config reload failed, keeping previous revision");
            }
        }
    }
}

/// Returns `true` for filesystem events that may change the config file or
/// a body include.
fn is_relevant_event(kind: EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevant_events_cover_editor_patterns() {
        assert!(is_relevant_event(EventKind::Create(
            notify::event::CreateKind::File
        )));
        assert!(is_relevant_event(EventKind::Modify(
            notify::event::ModifyKind::Name(notify::event::RenameMode::Any)
        )));
        assert!(is_relevant_event(EventKind::Remove(
            notify::event::RemoveKind::File
        )));
        assert!(!is_relevant_event(EventKind::Access(
            notify::event::AccessKind::Read
        )));
    }
}
