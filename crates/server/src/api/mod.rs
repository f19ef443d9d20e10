//! HTTP API surface.

pub mod announcements;
pub mod health;
pub mod schemas;
pub mod status;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use relaymon_config::SharedConfig;
use relaymon_events::EventEngine;
use relaymon_probe::SchedulerMetrics;
use relaymon_store::ObservationStore;

use crate::aggregate::SnapshotCache;
use crate::announce::AnnouncementsService;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live configuration handle; captured once per request.
    pub shared: Arc<SharedConfig>,
    /// The observation store.
    pub store: Arc<dyn ObservationStore>,
    /// Fingerprint-keyed snapshot cache.
    pub cache: Arc<SnapshotCache>,
    /// Announcements snapshot service.
    pub announcements: Arc<AnnouncementsService>,
    /// Probe counters for the health endpoint.
    pub scheduler_metrics: Arc<SchedulerMetrics>,
    /// Event state machine, for health reporting.
    pub events: Arc<EventEngine>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status::status))
        .route("/api/announcements", get(announcements::announcements))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
