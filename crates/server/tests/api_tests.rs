//! API tests over the in-memory store.

use std::sync::Arc;

use axum_test::TestServer;
use chrono::Utc;

use relaymon_config::{FleetDocument, SharedConfig, resolve};
use relaymon_core::{MonitorKey, Observation, Status, SubStatus};
use relaymon_events::EventEngine;
use relaymon_probe::{ProbeEngine, Scheduler};
use relaymon_server::aggregate::SnapshotCache;
use relaymon_server::announce::{AnnouncementsService, GithubFetcher};
use relaymon_server::api::{AppState, router};
use relaymon_server::sink::PipelineSink;
use relaymon_store::{MemoryStore, ObservationStore};
use tokio_util::sync::CancellationToken;

const FLEET: &str = r#"
boards = { enabled = true }

[[monitors]]
provider = "demo"
service = "cc"
channel = "main"
url = "https://relay.example.com/v1/messages"

[[monitors]]
provider = "demo"
service = "cc"
channel = "beta"
url = "https://relay.example.com/v1/messages"
hidden = true
hidden_reason = "burn-in"

[[monitors]]
provider = "acme"
service = "api"
channel = "pool"
model = "m0"
url = "https://acme.example.com/v1/chat"

[[monitors]]
parent = "acme/api/pool"
model = "m1"
"#;

async fn build_state(store: Arc<MemoryStore>) -> AppState {
    let doc: FleetDocument = toml::from_str(FLEET).unwrap();
    let config = resolve(doc, std::path::Path::new(".")).unwrap();
    let announcements_config = config.announcements.clone();
    let events_config = config.events.clone();
    let shared = Arc::new(SharedConfig::new(config));

    let (events, _event_rx) = EventEngine::new(events_config);
    let events = Arc::new(events);
    let scheduler = Scheduler::new(
        Arc::new(ProbeEngine::new().unwrap()),
        Arc::new(PipelineSink::new(store.clone(), events.clone())),
        shared.clone(),
        CancellationToken::new(),
    );

    AppState {
        shared,
        store,
        cache: Arc::new(SnapshotCache::new()),
        announcements: Arc::new(AnnouncementsService::new(
            announcements_config.clone(),
            Arc::new(GithubFetcher::new(announcements_config).unwrap()),
        )),
        scheduler_metrics: scheduler.metrics(),
        events,
    }
}

async fn seed(store: &MemoryStore, channel: &str, model: &str, status: Status, minutes_ago: i64) {
    let mut obs = Observation::new(
        MonitorKey::new(
            if channel == "pool" { "acme" } else { "demo" },
            if channel == "pool" { "api" } else { "cc" },
            channel,
            model,
        ),
        status,
        if status == Status::Unavailable {
            SubStatus::ServerError
        } else {
            SubStatus::Ok
        },
        120,
    );
    obs.timestamp = Utc::now() - chrono::Duration::minutes(minutes_ago);
    obs.http_status = Some(200);
    store.append(&obs).await.unwrap();
}

#[tokio::test]
async fn status_returns_meta_data_and_cache_headers() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "main", "", Status::Available, 5).await;
    let server = TestServer::new(router(build_state(store).await)).unwrap();

    let response = server.get("/api/status").add_query_param("period", "90m").await;
    response.assert_status_ok();
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "private, max-age=10"
    );

    let body: serde_json::Value = response.json();
    assert!(body["meta"]["slow_latency_ms"].as_u64().unwrap() > 0);
    assert_eq!(body["meta"]["boards"]["enabled"], true);
    assert_eq!(body["meta"]["cache"]["period"], "90m");
    let ids: Vec<&str> = body["meta"]["all_monitor_ids"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(ids.contains(&"demo/cc/main"));
    assert!(ids.contains(&"acme/api/pool/m1"));

    let data = body["data"].as_array().unwrap();
    let main = data
        .iter()
        .find(|m| m["id"] == "demo/cc/main")
        .expect("visible monitor present");
    assert_eq!(main["status"], 1);
    assert_eq!(
        main["timeline"].as_array().unwrap().len(),
        45,
        "90m window has 45 buckets"
    );
}

#[tokio::test]
async fn multi_model_monitors_come_back_as_groups() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "pool", "m0", Status::Available, 2).await;
    seed(&store, "pool", "m1", Status::Unavailable, 2).await;
    let server = TestServer::new(router(build_state(store).await)).unwrap();

    let body: serde_json::Value = server.get("/api/status").await.json();

    let groups = body["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group["id"], "acme/api/pool");
    // Worst layer wins.
    assert_eq!(group["status"], 0);
    let layers = group["layers"].as_array().unwrap();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0]["layer_order"], 0);
    assert_eq!(layers[0]["model"], "m0");
    assert_eq!(layers[1]["model"], "m1");

    // Grouped monitors do not reappear as single-layer entries.
    let data = body["data"].as_array().unwrap();
    assert!(data.iter().all(|m| m["provider"] != "acme"));
}

#[tokio::test]
async fn hidden_monitors_need_explicit_opt_in() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "main", "", Status::Available, 2).await;
    seed(&store, "beta", "", Status::Available, 2).await;
    let server = TestServer::new(router(build_state(store).await)).unwrap();

    let body: serde_json::Value = server.get("/api/status").await.json();
    let data = body["data"].as_array().unwrap();
    assert!(data.iter().all(|m| m["id"] != "demo/cc/beta"));

    let body: serde_json::Value = server
        .get("/api/status")
        .add_query_param("include_hidden", "true")
        .await
        .json();
    let data = body["data"].as_array().unwrap();
    let beta = data.iter().find(|m| m["id"] == "demo/cc/beta").unwrap();
    assert_eq!(beta["hidden"], true);
}

#[tokio::test]
async fn cache_hit_returns_the_populating_bytes() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "main", "", Status::Available, 5).await;
    let state = build_state(store.clone()).await;
    let server = TestServer::new(router(state)).unwrap();

    let first = server.get("/api/status").await.text();

    // New data lands between the requests; the cached snapshot must win
    // until its TTL or a reload.
    seed(&store, "main", "", Status::Unavailable, 0).await;
    let second = server.get("/api/status").await.text();
    assert_eq!(first, second);
}

#[tokio::test]
async fn validation_failures_name_the_field() {
    let store = Arc::new(MemoryStore::new());
    let server = TestServer::new(router(build_state(store).await)).unwrap();

    let response = server.get("/api/status").add_query_param("period", "14d").await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["field"], "period");

    let response = server
        .get("/api/status")
        .add_query_param("period", "90m")
        .add_query_param("time_filter", "09:00-18:00")
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["field"], "time_filter");

    let response = server.get("/api/status").add_query_param("board", "warm").await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["field"], "board");
}

#[tokio::test]
async fn disabled_announcements_answer_without_fetching() {
    let store = Arc::new(MemoryStore::new());
    let server = TestServer::new(router(build_state(store).await)).unwrap();

    let response = server.get("/api/announcements").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["enabled"], false);
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn health_reports_revision_and_fleet_size() {
    let store = Arc::new(MemoryStore::new());
    let server = TestServer::new(router(build_state(store).await)).unwrap();

    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["revision"], 0);
    assert_eq!(body["monitors"], 4);
}
