//! Announcement snapshot cache with singleflight refresh.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use relaymon_config::AnnouncementsConfig;
use relaymon_store::LoopHandle;

use crate::announce::fetcher::{AnnouncementFetcher, AnnouncementItem};
use crate::error::ServerError;

/// How long a stale snapshot may keep being served after a refresh
/// failure.
const STALE_GRACE: Duration = Duration::from_secs(60);

/// One fetched announcement set.
#[derive(Debug, Clone, Serialize)]
pub struct AnnouncementsSnapshot {
    pub fetched_at: DateTime<Utc>,
    /// Set on copies served after a refresh failure.
    pub stale: bool,
    pub items: Vec<AnnouncementItem>,
    pub latest: Option<AnnouncementItem>,
    /// `"<latest.createdAt RFC3339>#<number>"`; clients compare
    /// lexicographically against their last dismissed version.
    pub version: String,
}

impl AnnouncementsSnapshot {
    fn from_items(items: Vec<AnnouncementItem>) -> Self {
        let latest = items.first().cloned();
        let version = latest
            .as_ref()
            .map(|l| format!("{}#{}", l.created_at.to_rfc3339(), l.number))
            .unwrap_or_default();
        Self {
            fetched_at: Utc::now(),
            stale: false,
            items,
            latest,
            version,
        }
    }
}

#[derive(Default)]
struct Inner {
    snapshot: Option<Arc<AnnouncementsSnapshot>>,
    inflight: Option<watch::Receiver<bool>>,
}

/// Serves announcement snapshots, refreshing at most once at a time.
///
/// Concurrent cache misses coalesce into one GraphQL call; losers wait on
/// a watch channel. A refresh failure serves a *copy* of the previous
/// snapshot marked stale for up to [`STALE_GRACE`] past its TTL.
pub struct AnnouncementsService {
    config: AnnouncementsConfig,
    fetcher: Arc<dyn AnnouncementFetcher>,
    inner: Mutex<Inner>,
}

impl AnnouncementsService {
    #[must_use]
    pub fn new(config: AnnouncementsConfig, fetcher: Arc<dyn AnnouncementFetcher>) -> Self {
        Self {
            config,
            fetcher,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The service configuration.
    #[must_use]
    pub fn config(&self) -> &AnnouncementsConfig {
        &self.config
    }

    /// Current snapshot, refreshing on demand once the TTL lapsed.
    pub async fn get(&self) -> Result<Arc<AnnouncementsSnapshot>, ServerError> {
        let mut waiter = {
            let mut inner = self.inner.lock().await;
            if let Some(ref snapshot) = inner.snapshot
                && age_within(snapshot.fetched_at, self.config.ttl)
            {
                return Ok(snapshot.clone());
            }
            if let Some(ref rx) = inner.inflight {
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(false);
                inner.inflight = Some(rx);
                drop(inner);
                return self.refresh(tx).await;
            }
        };

        // Loser of the singleflight race: wait for the winner's broadcast,
        // then read whatever it produced.
        let _ = waiter.changed().await;
        let inner = self.inner.lock().await;
        inner
            .snapshot
            .clone()
            .ok_or_else(|| ServerError::AnnouncementsUnavailable("no announcement data".into()))
    }

    /// Force a refresh regardless of TTL. Used by the background poller.
    pub async fn refresh_now(&self) {
        let tx = {
            let mut inner = self.inner.lock().await;
            if inner.inflight.is_some() {
                return;
            }
            let (tx, rx) = watch::channel(false);
            inner.inflight = Some(rx);
            tx
        };
        let _ = self.refresh(tx).await;
    }

    async fn refresh(
        &self,
        tx: watch::Sender<bool>,
    ) -> Result<Arc<AnnouncementsSnapshot>, ServerError> {
        let fetched = self.fetcher.fetch().await;
        let mut inner = self.inner.lock().await;
        inner.inflight = None;

        let result = match fetched {
            Ok(items) => {
                let snapshot = Arc::new(AnnouncementsSnapshot::from_items(items));
                inner.snapshot = Some(snapshot.clone());
                info!(items = snapshot.items.len(), "announcements refreshed");
                Ok(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "announcements refresh failed");
                match inner.snapshot {
                    Some(ref previous)
                        if age_within(previous.fetched_at, self.config.ttl + STALE_GRACE) =>
                    {
                        // A copy, not a mutation: concurrent readers still
                        // hold the original.
                        let mut stale = (**previous).clone();
                        stale.stale = true;
                        Ok(Arc::new(stale))
                    }
                    _ => Err(ServerError::AnnouncementsUnavailable(e.to_string())),
                }
            }
        };
        drop(inner);
        let _ = tx.send(true);
        result
    }

    /// Spawn the periodic refresh loop.
    #[must_use]
    pub fn spawn_poller(self: Arc<Self>) -> LoopHandle {
        let service = self;
        let (handle, mut stop, stopped) = LoopHandle::pair();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.config.refresh_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                service.refresh_now().await;
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut stop => break,
                }
            }
            let _ = stopped.send(());
        });
        handle
    }
}

fn age_within(fetched_at: DateTime<Utc>, window: Duration) -> bool {
    let age = Utc::now() - fetched_at;
    age <= chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero())
}
