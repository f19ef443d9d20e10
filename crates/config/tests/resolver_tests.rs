//! End-to-end resolver tests over complete TOML documents.

use std::path::Path;
use std::time::Duration;

use relaymon_config::{
    ChannelStrategy, ConfigError, EventsMode, FleetDocument, StorageBackend, resolve,
};
use relaymon_core::{Board, HttpMethod, MonitorKey, SponsorLevel};

fn resolve_toml(toml_str: &str, dir: &Path) -> Result<relaymon_config::ResolvedConfig, ConfigError> {
    let doc: FleetDocument = toml::from_str(toml_str).expect("valid TOML");
    resolve(doc, dir)
}

#[test]
fn full_document_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let config = resolve_toml(
        r#"
interval = "30s"
slow_latency = "3s"
timeout = "8s"
degraded_weight = 0.5
max_concurrency = 4

[storage]
type = "sqlite"
sqlite_path = "fleet.db"

[events]
mode = "channel"
channel_down_threshold = 2
channel_strategy = "incremental"

[[monitors]]
provider = "demo"
service = "cc"
channel = "vip"
url = "https://relay.example.com/v1/messages"
method = "POST"
api_key = "k-123"

[monitors.headers]
Authorization = "Bearer {{API_KEY}}"
"#,
        dir.path(),
    )
    .expect("resolves");

    assert_eq!(config.monitors.len(), 1);
    let m = &config.monitors[0];
    assert_eq!(m.key, MonitorKey::new("demo", "cc", "vip", ""));
    assert_eq!(m.interval, Duration::from_secs(30));
    assert_eq!(m.slow_latency, Duration::from_secs(3));
    assert_eq!(m.timeout, Duration::from_secs(8));
    assert_eq!(m.method, HttpMethod::Post);
    assert_eq!(m.slug, "demo");
    assert_eq!(m.board, Board::Hot);

    assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    assert_eq!(config.events.mode, EventsMode::Channel);
    assert_eq!(config.events.channel_down_threshold, 2);
    assert_eq!(config.events.channel_strategy, ChannelStrategy::Incremental);
    assert_eq!(config.max_concurrency, 4);
    assert!((config.degraded_weight - 0.5).abs() < f64::EPSILON);
}

#[test]
fn parent_inheritance_scenario() {
    // A child declaring only `parent` and `model` receives the parent's
    // probe definition; placeholders stay for probe-time substitution.
    let dir = tempfile::tempdir().unwrap();
    let config = resolve_toml(
        r#"
[[monitors]]
provider = "demo"
service = "cc"
channel = "vip"
model = "m0"
url = "https://x"
api_key = "k"
body = '{"m":"{{MODEL}}"}'

[monitors.headers]
Auth = "Bearer {{API_KEY}}"

[[monitors]]
parent = "demo/cc/vip"
model = "m1"
"#,
        dir.path(),
    )
    .expect("resolves");

    let child = config
        .monitor(&MonitorKey::new("demo", "cc", "vip", "m1"))
        .expect("child exists");
    assert_eq!(child.url, "https://x");
    assert_eq!(child.api_key.as_deref(), Some("k"));
    assert_eq!(
        child.headers.get("Auth").map(String::as_str),
        Some("Bearer {{API_KEY}}")
    );
    assert_eq!(child.body.as_deref(), Some("{\"m\":\"{{MODEL}}\"}"));
    assert_eq!(child.parent.as_deref(), Some("demo/cc/vip"));
    // The model itself is never inherited.
    assert_eq!(child.key.model, "m1");
}

#[test]
fn child_inherits_parsed_interval() {
    let dir = tempfile::tempdir().unwrap();
    let config = resolve_toml(
        r#"
[[monitors]]
provider = "demo"
service = "cc"
channel = "vip"
model = "m0"
url = "https://x"
interval = "2m"

[[monitors]]
parent = "demo/cc/vip"
model = "m1"
"#,
        dir.path(),
    )
    .expect("resolves");

    let parent = config
        .monitor(&MonitorKey::new("demo", "cc", "vip", "m0"))
        .unwrap();
    let child = config
        .monitor(&MonitorKey::new("demo", "cc", "vip", "m1"))
        .unwrap();
    assert_eq!(parent.interval, Duration::from_secs(120));
    assert_eq!(child.interval, parent.interval);
}

#[test]
fn child_overrides_survive_inheritance() {
    let dir = tempfile::tempdir().unwrap();
    let config = resolve_toml(
        r#"
[[monitors]]
provider = "demo"
service = "cc"
channel = "vip"
model = "m0"
url = "https://x"
timeout = "10s"
sponsor_level = "enterprise"

[monitors.headers]
Auth = "parent"
Extra = "parent-only"

[[monitors]]
parent = "demo/cc/vip"
model = "m1"
timeout = "4s"

[monitors.headers]
Auth = "child"
"#,
        dir.path(),
    )
    .expect("resolves");

    let child = config
        .monitor(&MonitorKey::new("demo", "cc", "vip", "m1"))
        .unwrap();
    assert_eq!(child.timeout, Duration::from_secs(4));
    // Child header overrides win; parent-only entries merge in.
    assert_eq!(child.headers.get("Auth").map(String::as_str), Some("child"));
    assert_eq!(
        child.headers.get("Extra").map(String::as_str),
        Some("parent-only")
    );
    assert_eq!(child.sponsor_level, SponsorLevel::Enterprise);
}

#[test]
fn cold_reason_cleared_off_cold_board() {
    let dir = tempfile::tempdir().unwrap();
    let config = resolve_toml(
        r#"
[[monitors]]
provider = "demo"
service = "cc"
channel = "vip"
url = "https://x"
board = "secondary"
cold_reason = "stale"

[[monitors]]
provider = "demo"
service = "cc"
channel = "retired"
url = "https://x"
board = "cold"
cold_reason = "provider sunset"
"#,
        dir.path(),
    )
    .expect("resolves");

    let warm = config
        .monitor(&MonitorKey::new("demo", "cc", "vip", ""))
        .unwrap();
    assert_eq!(warm.board, Board::Secondary);
    assert!(warm.cold_reason.is_none());

    let cold = config
        .monitor(&MonitorKey::new("demo", "cc", "retired", ""))
        .unwrap();
    assert_eq!(cold.board, Board::Cold);
    assert_eq!(cold.cold_reason.as_deref(), Some("provider sunset"));
}

#[test]
fn slow_latency_at_or_above_timeout_warns_but_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let config = resolve_toml(
        r#"
[[monitors]]
provider = "demo"
service = "cc"
channel = "vip"
url = "https://x"
slow_latency = "10s"
timeout = "10s"
"#,
        dir.path(),
    )
    .expect("warns, does not fail");
    assert!(
        config
            .warnings
            .iter()
            .any(|w| w.contains("slow_latency")),
        "expected a slow_latency warning, got {:?}",
        config.warnings
    );
}

#[test]
fn inverted_retry_window_after_inheritance_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = resolve_toml(
        r#"
[[monitors]]
provider = "demo"
service = "cc"
channel = "vip"
model = "m0"
url = "https://x"
retry_max_delay = "100ms"

[[monitors]]
parent = "demo/cc/vip"
model = "m1"
retry_base_delay = "500ms"
"#,
        dir.path(),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::RetryDelayInverted { .. }));
}

#[test]
fn resolve_is_idempotent_over_normalized_documents() {
    // Normalize(Normalize(c)) == Normalize(c): resolving the same document
    // twice yields identical monitor sets.
    let dir = tempfile::tempdir().unwrap();
    let toml_str = r#"
slow_latency_by_service = { CC = "2s" }
disabled_providers = { demo = "maintenance" }

[[monitors]]
provider = "demo"
service = "cc"
channel = "vip"
model = "m0"
url = "https://x"

[[monitors]]
parent = "demo/cc/vip"
model = "m1"
"#;
    let a = resolve_toml(toml_str, dir.path()).expect("first resolve");
    let b = resolve_toml(toml_str, dir.path()).expect("second resolve");
    assert_eq!(a.monitors.len(), b.monitors.len());
    for (x, y) in a.monitors.iter().zip(&b.monitors) {
        assert_eq!(x.key, y.key);
        assert_eq!(x.interval, y.interval);
        assert_eq!(x.slow_latency, y.slow_latency);
        assert_eq!(x.disabled, y.disabled);
        assert_eq!(x.hidden, y.hidden);
    }
    // Provider-level disable cascaded into both layers, and disabled
    // implies hidden.
    assert!(a.monitors.iter().all(|m| m.disabled && m.hidden));
    // The service-level override applied case-insensitively.
    assert!(
        a.monitors
            .iter()
            .all(|m| m.slow_latency == Duration::from_secs(2))
    );
}

#[test]
fn storage_env_overrides_apply_to_resolution() {
    let dir = tempfile::tempdir().unwrap();
    // `resolve` reads the real process environment; this test goes through
    // the document mutation path instead to stay hermetic.
    let mut doc: FleetDocument = toml::from_str(
        r#"
[[monitors]]
provider = "demo"
service = "cc"
channel = "vip"
url = "https://x"
"#,
    )
    .unwrap();
    relaymon_config::env::apply_env_overrides_from(&mut doc, |name| match name {
        "MONITOR_STORAGE_TYPE" => Some("postgres".into()),
        "MONITOR_POSTGRES_HOST" => Some("db.internal".into()),
        _ => None,
    });
    let config = resolve(doc, dir.path()).expect("resolves");
    assert_eq!(config.storage.backend, StorageBackend::Postgres);
    assert_eq!(
        config.storage.postgres.as_ref().unwrap().host,
        "db.internal"
    );
}
