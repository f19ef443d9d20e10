//! `GET /health` -- liveness plus scheduler counters.

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

use relaymon_probe::MetricsSnapshot;

use crate::api::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    /// Config revision currently live.
    revision: u64,
    /// Monitors in the fleet under that revision.
    monitors: usize,
    scheduler: MetricsSnapshot,
    /// Model-level keys tracked by the event state machine.
    events_tracked: usize,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.shared.load();
    Json(HealthResponse {
        status: "ok",
        revision: config.revision,
        monitors: config.monitors.len(),
        scheduler: state.scheduler_metrics.snapshot(),
        events_tracked: state.events.snapshots().len(),
    })
}
