use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use relaymon_core::{MonitorKey, Observation, TimelineBucket};

use crate::bucket::TimelineQuery;
use crate::error::StoreError;

/// Append-only table of probe observations keyed by
/// `(provider, service, channel, model, timestamp)`.
///
/// Implementations must be `Send + Sync`. Writes for one key are issued by
/// a single producer (the scheduler), so backends only need per-statement
/// atomicity; readers may run concurrently with the writer.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Write one observation.
    async fn append(&self, observation: &Observation) -> Result<(), StoreError>;

    /// Most recent observation per key. Keys with no observations are
    /// absent from the result.
    async fn latest(
        &self,
        keys: &[MonitorKey],
    ) -> Result<HashMap<MonitorKey, Observation>, StoreError>;

    /// Raw observations for one key within `[start, end]`, ordered by
    /// timestamp ascending.
    async fn history(
        &self,
        key: &MonitorKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StoreError>;

    /// Fixed-length bucket arrays for each key over the query window.
    ///
    /// Backends may push the aggregation into SQL; the result must agree
    /// with [`crate::bucket::aggregate`] over the same observations.
    async fn timeline_batch(
        &self,
        keys: &[MonitorKey],
        query: &TimelineQuery,
    ) -> Result<HashMap<MonitorKey, Vec<TimelineBucket>>, StoreError>;

    /// Delete up to `limit` observations older than `cutoff`. Returns the
    /// number of rows deleted; the retention sweeper calls this repeatedly
    /// until a batch comes back short.
    async fn delete_before(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<u64, StoreError>;

    /// All observations with `timestamp ∈ [day, day+1)`, ordered by
    /// timestamp, for the archive writer.
    async fn day_rows(&self, day: NaiveDate) -> Result<Vec<Observation>, StoreError>;
}
