use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use relaymon_core::{MonitorKey, Observation, Status, SubStatus, TimelineBucket};
use relaymon_store::bucket::{TimelineQuery, aggregate};
use relaymon_store::{ObservationStore, StoreError};

use crate::migrations;

/// Hard cap on keys per batched statement: SQLite binds at most 999
/// parameters and each key consumes four.
pub const MAX_BATCH_KEYS: usize = 999 / 4;

/// SQLite-backed observation store.
///
/// Timestamps are stored as integer milliseconds since the Unix epoch so
/// range scans stay index-friendly. WAL journal mode lets the aggregator
/// read while the scheduler's single writer appends.
pub struct SqliteStore {
    pool: SqlitePool,
    batch_max_keys: usize,
    enable_batch_query: bool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and run
    /// migrations.
    ///
    /// `batch_max_keys` comes from the normalized configuration and is
    /// clamped to [`MAX_BATCH_KEYS`] regardless.
    pub async fn connect(
        path: &str,
        batch_max_keys: usize,
        enable_batch_query: bool,
    ) -> Result<Self, StoreError> {
        // An in-memory database is private to its connection, so the pool
        // must not grow past one there.
        let in_memory = path == ":memory:";
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(if in_memory {
                SqliteJournalMode::Memory
            } else {
                SqliteJournalMode::Wal
            });
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        migrations::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            batch_max_keys: batch_max_keys.clamp(1, MAX_BATCH_KEYS),
            enable_batch_query,
        })
    }

    /// In-memory database for tests.
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        Self::connect(":memory:", MAX_BATCH_KEYS, true).await
    }

    fn row_values_clause(keys: &[MonitorKey]) -> String {
        let tuples = std::iter::repeat_n("(?, ?, ?, ?)", keys.len())
            .collect::<Vec<_>>()
            .join(", ");
        format!("(provider, service, channel, model) IN (VALUES {tuples})")
    }

    fn bind_keys<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        keys: &'q [MonitorKey],
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        for key in keys {
            query = query
                .bind(&key.provider)
                .bind(&key.service)
                .bind(&key.channel)
                .bind(&key.model);
        }
        query
    }
}

fn decode_row(row: &SqliteRow) -> Result<Observation, StoreError> {
    let status_code: i16 = row
        .try_get("status")
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let status = Status::try_from(status_code).map_err(StoreError::Corrupt)?;
    let sub_status_raw: String = row
        .try_get("sub_status")
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let sub_status = sub_status_raw
        .parse::<SubStatus>()
        .map_err(StoreError::Corrupt)?;
    let timestamp_ms: i64 = row
        .try_get("timestamp_ms")
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let timestamp = Utc
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {timestamp_ms}")))?;

    let get_text = |column: &str| -> Result<String, StoreError> {
        row.try_get(column)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    };

    Ok(Observation {
        key: MonitorKey::new(
            get_text("provider")?,
            get_text("service")?,
            get_text("channel")?,
            get_text("model")?,
        ),
        timestamp,
        status,
        sub_status,
        http_status: row
            .try_get::<Option<i64>, _>("http_status")
            .map_err(|e| StoreError::Corrupt(e.to_string()))?
            .and_then(|c| u16::try_from(c).ok()),
        latency_ms: row
            .try_get("latency_ms")
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        body_snippet: row
            .try_get("body_snippet")
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        error: row
            .try_get("error")
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
    })
}

#[async_trait]
impl ObservationStore for SqliteStore {
    async fn append(&self, observation: &Observation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO observations
             (provider, service, channel, model, timestamp_ms, status, sub_status,
              http_status, latency_ms, body_snippet, error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&observation.key.provider)
        .bind(&observation.key.service)
        .bind(&observation.key.channel)
        .bind(&observation.key.model)
        .bind(observation.timestamp.timestamp_millis())
        .bind(observation.status.code())
        .bind(observation.sub_status.as_str())
        .bind(observation.http_status.map(i64::from))
        .bind(observation.latency_ms)
        .bind(&observation.body_snippet)
        .bind(&observation.error)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn latest(
        &self,
        keys: &[MonitorKey],
    ) -> Result<HashMap<MonitorKey, Observation>, StoreError> {
        let mut out = HashMap::new();
        for chunk in keys.chunks(self.batch_max_keys) {
            let sql = format!(
                "SELECT * FROM (
                     SELECT *, ROW_NUMBER() OVER (
                         PARTITION BY provider, service, channel, model
                         ORDER BY timestamp_ms DESC
                     ) AS rn
                     FROM observations
                     WHERE {}
                 ) WHERE rn = 1",
                Self::row_values_clause(chunk)
            );
            let rows = Self::bind_keys(sqlx::query(&sql), chunk)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            for row in &rows {
                let obs = decode_row(row)?;
                out.insert(obs.key.clone(), obs);
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
        let rows = sqlx::query(
            "SELECT * FROM observations
             WHERE provider = ? AND service = ? AND channel = ? AND model = ?
               AND timestamp_ms >= ? AND timestamp_ms <= ?
             ORDER BY timestamp_ms ASC",
        )
        .bind(&key.provider)
        .bind(&key.service)
        .bind(&key.channel)
        .bind(&key.model)
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.iter().map(decode_row).collect()
    }

    async fn timeline_batch(
        &self,
        keys: &[MonitorKey],
        query: &TimelineQuery,
    ) -> Result<HashMap<MonitorKey, Vec<TimelineBucket>>, StoreError> {
        let mut out: HashMap<MonitorKey, Vec<TimelineBucket>> = keys
            .iter()
            .map(|k| (k.clone(), vec![TimelineBucket::empty(); query.buckets]))
            .collect();

        if self.enable_batch_query {
            for chunk in keys.chunks(self.batch_max_keys) {
                let sql = format!(
                    "SELECT * FROM observations
                     WHERE {}
                       AND timestamp_ms >= ? AND timestamp_ms <= ?
                     ORDER BY timestamp_ms ASC",
                    Self::row_values_clause(chunk)
                );
                let rows = Self::bind_keys(sqlx::query(&sql), chunk)
                    .bind(query.start.timestamp_millis())
                    .bind(query.end.timestamp_millis())
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StoreError::Backend(e.to_string()))?;

                let mut per_key: HashMap<MonitorKey, Vec<Observation>> = HashMap::new();
                for row in &rows {
                    let obs = decode_row(row)?;
                    per_key.entry(obs.key.clone()).or_default().push(obs);
                }
                for (key, observations) in per_key {
                    out.insert(key, aggregate(&observations, query));
                }
            }
        } else {
            for key in keys {
                let history = self.history(key, query.start, query.end).await?;
                out.insert(key.clone(), aggregate(&history, query));
            }
        }

        Ok(out)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM observations WHERE rowid IN (
                 SELECT rowid FROM observations WHERE timestamp_ms < ? LIMIT ?
             )",
        )
        .bind(cutoff.timestamp_millis())
        .bind(i64::from(limit))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn day_rows(&self, day: NaiveDate) -> Result<Vec<Observation>, StoreError> {
        let start = day
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| StoreError::Backend("invalid day".into()))?;
        let end = start + chrono::Duration::days(1);
        let rows = sqlx::query(
            "SELECT * FROM observations
             WHERE timestamp_ms >= ? AND timestamp_ms < ?
             ORDER BY timestamp_ms ASC",
        )
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.iter().map(decode_row).collect()
    }
}
