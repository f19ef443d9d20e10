//! Background retention sweeper.
//!
//! Deletes observations older than the configured window in bounded
//! batches, yielding between batches so the single-writer backends are
//! never starved by cleanup.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use relaymon_config::RetentionConfig;

use crate::store::ObservationStore;

/// Handle to a spawned background loop: signal `stop`, then await the
/// `stopped` confirmation for deterministic shutdown.
pub struct LoopHandle {
    stop: oneshot::Sender<()>,
    stopped: oneshot::Receiver<()>,
}

impl LoopHandle {
    /// Create a handle plus the receiver/sender pair a loop body selects
    /// on. Used by every background loop in the workspace.
    #[must_use]
    pub fn pair() -> (Self, oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (stopped_tx, stopped_rx) = oneshot::channel();
        (
            Self {
                stop: stop_tx,
                stopped: stopped_rx,
            },
            stop_rx,
            stopped_tx,
        )
    }

    /// Request shutdown and wait for the loop to confirm. The loop finishes
    /// its current batch before exiting.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        let _ = self.stopped.await;
    }
}

/// Periodic deletion of observations past the retention window.
pub struct RetentionSweeper {
    store: Arc<dyn ObservationStore>,
    config: RetentionConfig,
}

impl RetentionSweeper {
    /// Create a sweeper over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ObservationStore>, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    /// Spawn the sweep loop. The first sweep runs after `startup_delay`
    /// plus a uniformly sampled share of the configured jitter.
    #[must_use]
    pub fn spawn(self) -> LoopHandle {
        let (handle, mut stop, stopped) = LoopHandle::pair();
        tokio::spawn(async move {
            let jitter_ms = self.config.jitter.as_millis().min(u128::from(u64::MAX));
            #[allow(clippy::cast_possible_truncation)]
            let jitter = if jitter_ms == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms as u64))
            };
            let initial = self.config.startup_delay + jitter;
            info!(
                delay_secs = initial.as_secs(),
                interval_secs = self.config.cleanup_interval.as_secs(),
                days = self.config.days,
                "retention sweeper started"
            );

            tokio::select! {
                () = tokio::time::sleep(initial) => {}
                _ = &mut stop => {
                    let _ = stopped.send(());
                    return;
                }
            }

            let mut ticker = tokio::time::interval(self.config.cleanup_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first interval tick completes immediately; consume it so
            // the sweep below is not doubled.
            ticker.tick().await;
            loop {
                self.sweep(&mut stop).await;
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut stop => break,
                }
            }
            let _ = stopped.send(());
        });
        handle
    }

    /// One sweep cycle: delete in batches until a batch comes back short,
    /// the per-cycle budget is exhausted, or stop is signalled.
    async fn sweep(&self, stop: &mut oneshot::Receiver<()>) {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.config.days));
        let mut total = 0u64;
        for _ in 0..self.config.max_batches_per_run {
            match self.store.delete_before(cutoff, self.config.batch_size).await {
                Ok(deleted) => {
                    total += deleted;
                    if deleted < u64::from(self.config.batch_size) {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "retention batch failed");
                    break;
                }
            }
            // A pending stop wins over further batches.
            if stop.try_recv().is_ok() {
                break;
            }
            tokio::task::yield_now().await;
        }
        if total > 0 {
            debug!(deleted = total, %cutoff, "retention sweep complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use relaymon_core::{MonitorKey, Observation, Status, SubStatus};

    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::ObservationStore as _;

    #[tokio::test(start_paused = true)]
    async fn sweeps_rows_past_the_window() {
        let store = Arc::new(MemoryStore::new());
        let key = MonitorKey::new("demo", "cc", "vip", "m1");
        let now = Utc::now();
        for days_ago in [200, 120, 10, 1] {
            let mut o = Observation::new(key.clone(), Status::Available, SubStatus::Ok, 5);
            o.timestamp = now - chrono::Duration::days(days_ago);
            store.append(&o).await.unwrap();
        }

        let config = RetentionConfig {
            enabled: true,
            days: 90,
            cleanup_interval: Duration::from_secs(3600),
            startup_delay: Duration::from_secs(1),
            jitter: Duration::ZERO,
            batch_size: 1,
            max_batches_per_run: 10,
        };
        let handle = RetentionSweeper::new(store.clone(), config).spawn();

        // Let the startup delay and first sweep run under the paused clock.
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.shutdown().await;

        assert_eq!(store.len(), 2);
        let remaining = store
            .history(
                &key,
                Utc.timestamp_opt(0, 0).unwrap(),
                now + chrono::Duration::days(1),
            )
            .await
            .unwrap();
        assert!(
            remaining
                .iter()
                .all(|o| o.timestamp >= now - chrono::Duration::days(90))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_first_sweep_is_clean() {
        let store = Arc::new(MemoryStore::new());
        let config = RetentionConfig {
            startup_delay: Duration::from_secs(3600),
            ..RetentionConfig::default()
        };
        let handle = RetentionSweeper::new(store, config).spawn();
        handle.shutdown().await;
    }
}
