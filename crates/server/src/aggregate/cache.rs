//! Fingerprint-keyed snapshot cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::api::schemas::StatusResponse;

struct Entry {
    body: Arc<StatusResponse>,
    expires_at: Instant,
    revision: u64,
}

/// In-memory cache of computed status snapshots.
///
/// Entries carry their expiry and the config revision they were computed
/// under; expiry is lazy on access, and a revision bump invalidates
/// everything without a sweep.
#[derive(Default)]
pub struct SnapshotCache {
    entries: DashMap<String, Entry>,
}

impl SnapshotCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cached snapshot for the fingerprint, when fresh and computed
    /// under `revision`.
    #[must_use]
    pub fn get(&self, key: &str, revision: u64) -> Option<Arc<StatusResponse>> {
        let hit = {
            let entry = self.entries.get(key)?;
            if entry.expires_at <= Instant::now() || entry.revision != revision {
                None
            } else {
                Some(entry.body.clone())
            }
        };
        if hit.is_none() {
            self.entries.remove(key);
        }
        hit
    }

    /// Store a freshly computed snapshot.
    pub fn insert(&self, key: String, body: Arc<StatusResponse>, ttl: Duration, revision: u64) {
        self.entries.insert(
            key,
            Entry {
                body,
                expires_at: Instant::now() + ttl,
                revision,
            },
        );
    }

    /// Drop every entry. Called on config reload.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of live entries, for tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
