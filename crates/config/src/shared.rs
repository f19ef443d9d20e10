//! Shared handle to the current configuration revision.

use std::sync::Arc;
use std::sync::RwLock;

use crate::resolved::ResolvedConfig;

/// Many-reader handle to the live configuration.
///
/// Readers grab the `Arc` once per request or scheduler tick and keep using
/// that revision until their unit of work completes; the reloader swaps the
/// pointer under the write lock. Monitor records are never shared between
/// revisions.
#[derive(Debug)]
pub struct SharedConfig {
    current: RwLock<Arc<ResolvedConfig>>,
}

impl SharedConfig {
    /// Wrap an initial configuration.
    #[must_use]
    pub fn new(config: ResolvedConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Capture the current revision.
    ///
    /// The lock is held only for the pointer clone.
    #[must_use]
    pub fn load(&self) -> Arc<ResolvedConfig> {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Publish a new revision, assigning it the next revision number.
    /// Returns the published revision.
    pub fn swap(&self, mut config: ResolvedConfig) -> u64 {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        config.revision = guard.revision + 1;
        let revision = config.revision;
        *guard = Arc::new(config);
        revision
    }
}
