//! Behavior tests for the SQLite backend against an in-memory database.

use chrono::{TimeZone, Utc};
use relaymon_core::{MonitorKey, Observation, Status, SubStatus};
use relaymon_store::bucket::TimelineQuery;
use relaymon_store::ObservationStore;
use relaymon_store_sqlite::SqliteStore;

fn key(model: &str) -> MonitorKey {
    MonitorKey::new("demo", "cc", "vip", model)
}

fn obs(model: &str, secs: i64, status: Status, sub: SubStatus) -> Observation {
    let mut o = Observation::new(key(model), status, sub, 42);
    o.timestamp = Utc.timestamp_opt(secs, 0).unwrap();
    o.http_status = Some(200);
    o
}

#[tokio::test]
async fn append_roundtrips_through_history() {
    let store = SqliteStore::connect_in_memory().await.unwrap();
    let mut written = obs("m1", 100, Status::Degraded, SubStatus::SlowLatency);
    written.body_snippet = Some("{\"ok\":true}".into());
    written.error = None;
    store.append(&written).await.unwrap();

    let history = store
        .history(
            &key("m1"),
            Utc.timestamp_opt(0, 0).unwrap(),
            Utc.timestamp_opt(200, 0).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    let read = &history[0];
    assert_eq!(read.key, written.key);
    assert_eq!(read.timestamp, written.timestamp);
    assert_eq!(read.status, Status::Degraded);
    assert_eq!(read.sub_status, SubStatus::SlowLatency);
    assert_eq!(read.http_status, Some(200));
    assert_eq!(read.latency_ms, 42);
    assert_eq!(read.body_snippet.as_deref(), Some("{\"ok\":true}"));
}

#[tokio::test]
async fn latest_returns_most_recent_per_key() {
    let store = SqliteStore::connect_in_memory().await.unwrap();
    for secs in [10, 50, 30] {
        store
            .append(&obs("m1", secs, Status::Available, SubStatus::Ok))
            .await
            .unwrap();
    }
    store
        .append(&obs("m2", 20, Status::Unavailable, SubStatus::ServerError))
        .await
        .unwrap();

    let latest = store.latest(&[key("m1"), key("m2"), key("m3")]).await.unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(
        latest[&key("m1")].timestamp,
        Utc.timestamp_opt(50, 0).unwrap()
    );
    assert_eq!(latest[&key("m2")].status, Status::Unavailable);
    assert!(!latest.contains_key(&key("m3")));
}

#[tokio::test]
async fn timeline_batch_matches_shared_bucketing() {
    let store = SqliteStore::connect_in_memory().await.unwrap();
    let observations = vec![
        obs("m1", 5, Status::Available, SubStatus::Ok),
        obs("m1", 12, Status::Degraded, SubStatus::SlowLatency),
        obs("m1", 25, Status::Available, SubStatus::Ok),
        obs("m1", 40, Status::Unavailable, SubStatus::ServerError),
        obs("m1", 55, Status::Available, SubStatus::Ok),
    ];
    for o in &observations {
        store.append(o).await.unwrap();
    }

    let query = TimelineQuery {
        start: Utc.timestamp_opt(0, 0).unwrap(),
        end: Utc.timestamp_opt(60, 0).unwrap(),
        buckets: 6,
        degraded_weight: 0.7,
        time_filter: None,
    };
    let batch = store
        .timeline_batch(&[key("m1"), key("m2")], &query)
        .await
        .unwrap();

    let expected = relaymon_store::aggregate(&observations, &query);
    let got = &batch[&key("m1")];
    assert_eq!(got.len(), expected.len());
    for (g, e) in got.iter().zip(&expected) {
        assert_eq!(g.status, e.status);
        assert_eq!(g.count, e.count);
        assert!((g.availability - e.availability).abs() < 1e-9);
    }
    // A key with no rows yields all-missing buckets.
    assert!(batch[&key("m2")].iter().all(|b| !b.has_data()));
}

#[tokio::test]
async fn delete_before_is_batched() {
    let store = SqliteStore::connect_in_memory().await.unwrap();
    for secs in 0..20 {
        store
            .append(&obs("m1", secs, Status::Available, SubStatus::Ok))
            .await
            .unwrap();
    }
    let cutoff = Utc.timestamp_opt(10, 0).unwrap();
    assert_eq!(store.delete_before(cutoff, 4).await.unwrap(), 4);
    assert_eq!(store.delete_before(cutoff, 100).await.unwrap(), 6);
    assert_eq!(store.delete_before(cutoff, 100).await.unwrap(), 0);
}

#[tokio::test]
async fn day_rows_select_one_utc_day() {
    let store = SqliteStore::connect_in_memory().await.unwrap();
    let day_secs = 86_400;
    for secs in [day_secs - 1, day_secs, day_secs + 3600, 2 * day_secs] {
        store
            .append(&obs("m1", secs, Status::Available, SubStatus::Ok))
            .await
            .unwrap();
    }
    let rows = store
        .day_rows(chrono::NaiveDate::from_ymd_opt(1970, 1, 2).unwrap())
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn batched_queries_chunk_past_the_parameter_cap() {
    let store = SqliteStore::connect_in_memory().await.unwrap();
    let keys: Vec<MonitorKey> = (0..300)
        .map(|i| MonitorKey::new("demo", "cc", "vip", format!("m{i}")))
        .collect();
    for k in keys.iter().take(3) {
        let mut o = Observation::new(k.clone(), Status::Available, SubStatus::Ok, 1);
        o.timestamp = Utc.timestamp_opt(5, 0).unwrap();
        store.append(&o).await.unwrap();
    }

    // 300 keys exceed floor(999 / 4); the store must chunk internally.
    let latest = store.latest(&keys).await.unwrap();
    assert_eq!(latest.len(), 3);
}
