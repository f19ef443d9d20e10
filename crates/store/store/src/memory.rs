//! In-memory observation store.
//!
//! Backs unit and integration tests across the workspace. Keeps the full
//! observation log in a per-key ordered map, so reads reflect writes
//! immediately and deterministically.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use relaymon_core::{MonitorKey, Observation, TimelineBucket};

use crate::bucket::{TimelineQuery, aggregate};
use crate::error::StoreError;
use crate::store::ObservationStore;

/// Observation store holding everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<MonitorKey, BTreeMap<DateTime<Utc>, Observation>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored observations, for test assertions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().values().map(BTreeMap::len).sum()
    }

    /// Whether the store holds no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<MonitorKey, BTreeMap<DateTime<Utc>, Observation>>>
    {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn append(&self, observation: &Observation) -> Result<(), StoreError> {
        self.lock()
            .entry(observation.key.clone())
            .or_default()
            .insert(observation.timestamp, observation.clone());
        Ok(())
    }

    async fn latest(
        &self,
        keys: &[MonitorKey],
    ) -> Result<HashMap<MonitorKey, Observation>, StoreError> {
        let rows = self.lock();
        let mut out = HashMap::new();
        for key in keys {
            if let Some(per_key) = rows.get(key)
                && let Some((_, obs)) = per_key.iter().next_back()
            {
                out.insert(key.clone(), obs.clone());
            }
        }
        Ok(out)
    }

    async fn history(
        &self,
        key: &MonitorKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StoreError> {
        let rows = self.lock();
        Ok(rows
            .get(key)
            .map(|per_key| per_key.range(start..=end).map(|(_, o)| o.clone()).collect())
            .unwrap_or_default())
    }

    async fn timeline_batch(
        &self,
        keys: &[MonitorKey],
        query: &TimelineQuery,
    ) -> Result<HashMap<MonitorKey, Vec<TimelineBucket>>, StoreError> {
        let mut out = HashMap::new();
        for key in keys {
            let history = self.history(key, query.start, query.end).await?;
            out.insert(key.clone(), aggregate(&history, query));
        }
        Ok(out)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<u64, StoreError> {
        let mut rows = self.lock();
        let mut remaining = u64::from(limit);
        let mut deleted = 0u64;
        for per_key in rows.values_mut() {
            while remaining > 0 {
                let Some((&ts, _)) = per_key.iter().next() else {
                    break;
                };
                if ts >= cutoff {
                    break;
                }
                per_key.remove(&ts);
                deleted += 1;
                remaining -= 1;
            }
            if remaining == 0 {
                break;
            }
        }
        Ok(deleted)
    }

    async fn day_rows(&self, day: NaiveDate) -> Result<Vec<Observation>, StoreError> {
        let start = day
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| StoreError::Backend("invalid day".into()))?;
        let end = start + chrono::Duration::days(1);
        let rows = self.lock();
        let mut out: Vec<Observation> = rows
            .values()
            .flat_map(|per_key| {
                per_key
                    .range(start..end)
                    .map(|(_, o)| o.clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        out.sort_by_key(|o| o.timestamp);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use relaymon_core::{Status, SubStatus};

    use super::*;

    fn obs(secs: i64) -> Observation {
        let mut o = Observation::new(
            MonitorKey::new("demo", "cc", "vip", "m1"),
            Status::Available,
            SubStatus::Ok,
            42,
        );
        o.timestamp = Utc.timestamp_opt(secs, 0).unwrap();
        o
    }

    #[tokio::test]
    async fn append_then_latest_and_history() {
        let store = MemoryStore::new();
        let key = MonitorKey::new("demo", "cc", "vip", "m1");
        for secs in [10, 20, 30] {
            store.append(&obs(secs)).await.unwrap();
        }

        let latest = store.latest(std::slice::from_ref(&key)).await.unwrap();
        assert_eq!(
            latest[&key].timestamp,
            Utc.timestamp_opt(30, 0).unwrap()
        );

        let history = store
            .history(
                &key,
                Utc.timestamp_opt(15, 0).unwrap(),
                Utc.timestamp_opt(30, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn delete_before_respects_cutoff_and_limit() {
        let store = MemoryStore::new();
        for secs in 0..10 {
            store.append(&obs(secs)).await.unwrap();
        }
        let cutoff = Utc.timestamp_opt(5, 0).unwrap();

        let deleted = store.delete_before(cutoff, 3).await.unwrap();
        assert_eq!(deleted, 3);
        let deleted = store.delete_before(cutoff, 100).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn day_rows_cover_exactly_one_day() {
        let store = MemoryStore::new();
        let day_secs = 86_400;
        for secs in [day_secs - 1, day_secs, day_secs + 10, 2 * day_secs] {
            store.append(&obs(secs)).await.unwrap();
        }
        let day = NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        let rows = store.day_rows(day).await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}
