//! Periodic probe scheduler.
//!
//! One tokio task per probed monitor, phase-staggered within its interval,
//! with fleet-wide concurrency capped by a semaphore. Reconciliation after
//! a config reload drains removed monitors, restarts monitors whose
//! cadence changed, and leaves unchanged monitors on their existing phase.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relaymon_config::{ResolvedConfig, SharedConfig};
use relaymon_core::{MonitorKey, Observation};

use crate::engine::ProbeEngine;

/// Receives completed observations from the scheduler.
///
/// The server wires this to the store append and the event state machine;
/// tests substitute a recording sink.
#[async_trait]
pub trait ObservationSink: Send + Sync {
    async fn record(&self, observation: Observation);
}

/// Fleet-wide probe counters, surfaced on the health endpoint.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    started: AtomicU64,
    completed: AtomicU64,
    dropped: AtomicU64,
    canceled: AtomicU64,
}

/// Point-in-time copy of the scheduler counters.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    pub started: u64,
    pub completed: u64,
    pub dropped: u64,
    pub canceled: u64,
}

impl SchedulerMetrics {
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
        }
    }
}

struct MonitorTask {
    interval: Duration,
    cancel: CancellationToken,
}

/// Owns the per-monitor probe loops.
pub struct Scheduler {
    engine: Arc<ProbeEngine>,
    sink: Arc<dyn ObservationSink>,
    shared: Arc<SharedConfig>,
    root: CancellationToken,
    metrics: Arc<SchedulerMetrics>,
    // Configured cap plus the semaphore enforcing it; `None` semaphore
    // means unbounded (`max_concurrency = -1`).
    semaphore: Arc<RwLock<(i32, Option<Arc<Semaphore>>)>>,
    tasks: std::sync::Mutex<HashMap<MonitorKey, MonitorTask>>,
}

impl Scheduler {
    /// Create a scheduler. No loops run until [`Scheduler::reconcile`] is
    /// called with the initial configuration.
    #[must_use]
    pub fn new(
        engine: Arc<ProbeEngine>,
        sink: Arc<dyn ObservationSink>,
        shared: Arc<SharedConfig>,
        root: CancellationToken,
    ) -> Self {
        Self {
            engine,
            sink,
            shared,
            root,
            metrics: Arc::new(SchedulerMetrics::default()),
            semaphore: Arc::new(RwLock::new((0, None))),
            tasks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Shared counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        self.metrics.clone()
    }

    /// Bring the running loops in line with a config revision.
    pub fn reconcile(&self, config: &ResolvedConfig) {
        self.set_concurrency(config.max_concurrency);

        let desired: HashMap<MonitorKey, Duration> = config
            .probed_monitors()
            .map(|m| (m.key.clone(), m.interval))
            .collect();

        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Drain monitors that disappeared or changed cadence.
        tasks.retain(|key, task| {
            let keep = desired.get(key) == Some(&task.interval);
            if !keep {
                debug!(key = %key, "draining probe loop");
                task.cancel.cancel();
            }
            keep
        });

        // Start monitors that are new (or restarting at a new cadence) with
        // a fresh offset inside the next period.
        for (key, interval) in desired {
            if tasks.contains_key(&key) {
                continue;
            }
            let cancel = self.root.child_token();
            let offset = if config.stagger_probes {
                stagger_offset(interval)
            } else {
                Duration::ZERO
            };
            tasks.insert(
                key.clone(),
                MonitorTask {
                    interval,
                    cancel: cancel.clone(),
                },
            );
            tokio::spawn(monitor_loop(MonitorLoop {
                key,
                interval,
                offset,
                engine: self.engine.clone(),
                sink: self.sink.clone(),
                shared: self.shared.clone(),
                semaphore: self.semaphore.clone(),
                metrics: self.metrics.clone(),
                cancel,
            }));
        }

        info!(monitors = tasks.len(), revision = config.revision, "scheduler reconciled");
    }

    /// Stop every loop. In-flight probes return by their deadline.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    fn set_concurrency(&self, max_concurrency: i32) {
        let mut guard = self
            .semaphore
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.1.is_some() && guard.0 == max_concurrency {
            return;
        }
        // Probes already queued on the old semaphore finish under the old
        // cap; new ticks pick up the replacement.
        let semaphore = match max_concurrency {
            n if n < 0 => None,
            0 => Some(Arc::new(Semaphore::new(10))),
            n => Some(Arc::new(Semaphore::new(usize::try_from(n).unwrap_or(10)))),
        };
        *guard = (max_concurrency, semaphore);
    }
}

struct MonitorLoop {
    key: MonitorKey,
    interval: Duration,
    offset: Duration,
    engine: Arc<ProbeEngine>,
    sink: Arc<dyn ObservationSink>,
    shared: Arc<SharedConfig>,
    semaphore: Arc<RwLock<(i32, Option<Arc<Semaphore>>)>>,
    metrics: Arc<SchedulerMetrics>,
    cancel: CancellationToken,
}

/// Uniform first-fire offset within one period.
fn stagger_offset(interval: Duration) -> Duration {
    let ms = interval.as_millis().max(1);
    #[allow(clippy::cast_possible_truncation)]
    Duration::from_millis(rand::thread_rng().gen_range(0..ms.min(u128::from(u64::MAX))) as u64)
}

async fn monitor_loop(ctx: MonitorLoop) {
    tokio::select! {
        () = tokio::time::sleep(ctx.offset) => {}
        () = ctx.cancel.cancelled() => return,
    }

    let mut ticker = tokio::time::interval(ctx.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = ctx.cancel.cancelled() => break,
        }

        // Capture the config pointer once per tick; a reload that removed
        // this monitor ends the loop at the next tick.
        let config = ctx.shared.load();
        let Some(monitor) = config.monitor(&ctx.key).cloned() else {
            break;
        };
        if !monitor.probed(config.boards_enabled) {
            break;
        }

        // Acquire a worker slot. Waiting longer than one interval means
        // the fleet is saturated; this probe is dropped with a warning.
        let semaphore = ctx
            .semaphore
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .1
            .clone();
        let _permit = if let Some(semaphore) = semaphore {
            tokio::select! {
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
                () = tokio::time::sleep(ctx.interval) => {
                    ctx.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %ctx.key, "probe dropped: no worker slot within one interval");
                    continue;
                }
                () = ctx.cancel.cancelled() => break,
            }
        } else {
            None
        };

        ctx.metrics.started.fetch_add(1, Ordering::Relaxed);
        match ctx.engine.probe(&monitor, &ctx.cancel).await {
            Some(observation) => {
                ctx.metrics.completed.fetch_add(1, Ordering::Relaxed);
                ctx.sink.record(observation).await;
            }
            None => {
                ctx.metrics.canceled.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }
    debug!(key = %ctx.key, "probe loop stopped");
}
