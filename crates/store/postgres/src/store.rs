use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use relaymon_config::PostgresConfig;
use relaymon_core::{MonitorKey, Observation, Status, SubStatus, TimelineBucket};
use relaymon_store::bucket::{TimelineQuery, aggregate};
use relaymon_store::{ObservationStore, StoreError};

use crate::migrations;

/// Behavior knobs resolved at normalize time.
#[derive(Debug, Clone, Copy)]
pub struct PgStoreOptions {
    /// Maximum keys per batched statement.
    pub batch_max_keys: usize,
    /// Batch multiple keys into one statement.
    pub enable_batch_query: bool,
    /// Push bucket aggregation into SQL. Requires `enable_batch_query`.
    pub enable_db_timeline_agg: bool,
}

impl Default for PgStoreOptions {
    fn default() -> Self {
        Self {
            batch_max_keys: 200,
            enable_batch_query: true,
            enable_db_timeline_agg: false,
        }
    }
}

/// PostgreSQL-backed observation store.
pub struct PgStore {
    pool: PgPool,
    options: PgStoreOptions,
}

impl PgStore {
    /// Connect, size the pool per the resolved configuration, and run
    /// migrations.
    pub async fn connect(
        config: &PostgresConfig,
        options: PgStoreOptions,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_open_conns)
            .min_connections(config.max_idle_conns.min(config.max_open_conns))
            .connect(&config.url())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Self::from_pool(pool, options).await
    }

    /// Build a store over an existing pool. Runs migrations.
    pub async fn from_pool(pool: PgPool, options: PgStoreOptions) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool, options })
    }

    /// Render `(provider, service, channel, model) IN (($n,$n+1,..),..)`
    /// with placeholders starting at `first`.
    fn row_values_clause(keys: &[MonitorKey], first: usize) -> String {
        let tuples: Vec<String> = (0..keys.len())
            .map(|i| {
                let base = first + i * 4;
                format!("(${}, ${}, ${}, ${})", base, base + 1, base + 2, base + 3)
            })
            .collect();
        format!(
            "(provider, service, channel, model) IN ({})",
            tuples.join(", ")
        )
    }

    fn bind_keys<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        keys: &'q [MonitorKey],
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        for key in keys {
            query = query
                .bind(&key.provider)
                .bind(&key.service)
                .bind(&key.channel)
                .bind(&key.model);
        }
        query
    }

    /// SQL-side aggregation: counts per (key, bucket, status, sub_status)
    /// merged into bucket arrays in Rust. Must agree with
    /// [`relaymon_store::aggregate`]; the memory-backed fixture test in
    /// `bucket.rs` pins the shared semantics this merge re-implements.
    async fn timeline_batch_sql(
        &self,
        keys: &[MonitorKey],
        query: &TimelineQuery,
        out: &mut HashMap<MonitorKey, Vec<TimelineBucket>>,
    ) -> Result<(), StoreError> {
        for chunk in keys.chunks(self.options.batch_max_keys) {
            let sql = format!(
                "SELECT provider, service, channel, model,
                        LEAST(
                            FLOOR(
                                EXTRACT(EPOCH FROM (timestamp - $1)) /
                                EXTRACT(EPOCH FROM ($2::timestamptz - $1::timestamptz)) * $3
                            )::int,
                            $3 - 1
                        ) AS bucket_idx,
                        status, sub_status,
                        COUNT(*)        AS cnt,
                        MAX(latency_ms) AS max_latency
                 FROM observations
                 WHERE timestamp >= $1 AND timestamp <= $2 AND {}
                 GROUP BY 1, 2, 3, 4, 5, 6, 7",
                Self::row_values_clause(chunk, 4)
            );
            #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
            let rows = Self::bind_keys(
                sqlx::query(&sql)
                    .bind(query.start)
                    .bind(query.end)
                    .bind(query.buckets as i32),
                chunk,
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

            let mut availability_counts: HashMap<(MonitorKey, usize), (u64, u64)> =
                HashMap::new();
            for row in &rows {
                let key = MonitorKey::new(
                    row.try_get::<String, _>("provider")
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    row.try_get::<String, _>("service")
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    row.try_get::<String, _>("channel")
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    row.try_get::<String, _>("model")
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                );
                let idx = usize::try_from(
                    row.try_get::<i32, _>("bucket_idx")
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                )
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                let status = Status::try_from(
                    row.try_get::<i16, _>("status")
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                )
                .map_err(StoreError::Corrupt)?;
                let sub_status: String = row
                    .try_get("sub_status")
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                let cnt = u64::try_from(
                    row.try_get::<i64, _>("cnt")
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                )
                .unwrap_or(0);
                let max_latency: i64 = row
                    .try_get("max_latency")
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;

                let Some(buckets) = out.get_mut(&key) else {
                    continue;
                };
                let Some(bucket) = buckets.get_mut(idx) else {
                    continue;
                };
                bucket.status = if bucket.has_data() {
                    bucket.status.worst(status)
                } else {
                    status
                };
                bucket.latency_max_ms = bucket.latency_max_ms.max(max_latency);
                bucket.count += cnt;
                *bucket.breakdown.entry(sub_status).or_insert(0) += cnt;

                let entry = availability_counts.entry((key, idx)).or_insert((0, 0));
                match status {
                    Status::Available => entry.0 += cnt,
                    Status::Degraded => entry.1 += cnt,
                    _ => {}
                }
            }

            for ((key, idx), (available, degraded)) in availability_counts {
                if let Some(bucket) = out.get_mut(&key).and_then(|b| b.get_mut(idx))
                    && bucket.count > 0
                {
                    #[allow(clippy::cast_precision_loss)]
                    let availability = (available as f64).mul_add(
                        100.0,
                        degraded as f64 * 100.0 * query.degraded_weight,
                    ) / bucket.count as f64;
                    bucket.availability = availability;
                }
            }
        }
        Ok(())
    }
}

fn decode_row(row: &PgRow) -> Result<Observation, StoreError> {
    let status = Status::try_from(
        row.try_get::<i16, _>("status")
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
    )
    .map_err(StoreError::Corrupt)?;
    let sub_status = row
        .try_get::<String, _>("sub_status")
        .map_err(|e| StoreError::Corrupt(e.to_string()))?
        .parse::<SubStatus>()
        .map_err(StoreError::Corrupt)?;

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
        timestamp: row
            .try_get("timestamp")
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        status,
        sub_status,
        http_status: row
            .try_get::<Option<i32>, _>("http_status")
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
impl ObservationStore for PgStore {
    async fn append(&self, observation: &Observation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO observations
             (provider, service, channel, model, timestamp, status, sub_status,
              http_status, latency_ms, body_snippet, error)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (provider, service, channel, model, timestamp) DO NOTHING",
        )
        .bind(&observation.key.provider)
        .bind(&observation.key.service)
        .bind(&observation.key.channel)
        .bind(&observation.key.model)
        .bind(observation.timestamp)
        .bind(observation.status.code())
        .bind(observation.sub_status.as_str())
        .bind(observation.http_status.map(i32::from))
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
        for chunk in keys.chunks(self.options.batch_max_keys) {
            let sql = format!(
                "SELECT DISTINCT ON (provider, service, channel, model) *
                 FROM observations
                 WHERE {}
                 ORDER BY provider, service, channel, model, timestamp DESC",
                Self::row_values_clause(chunk, 1)
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
             WHERE provider = $1 AND service = $2 AND channel = $3 AND model = $4
               AND timestamp >= $5 AND timestamp <= $6
             ORDER BY timestamp ASC",
        )
        .bind(&key.provider)
        .bind(&key.service)
        .bind(&key.channel)
        .bind(&key.model)
        .bind(start)
        .bind(end)
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

        // The SQL path has no time-of-day filter; fall back to the shared
        // Rust aggregation when one is requested.
        let sql_agg = self.options.enable_db_timeline_agg
            && self.options.enable_batch_query
            && query.time_filter.is_none();

        if sql_agg {
            self.timeline_batch_sql(keys, query, &mut out).await?;
        } else if self.options.enable_batch_query {
            for chunk in keys.chunks(self.options.batch_max_keys) {
                let sql = format!(
                    "SELECT * FROM observations
                     WHERE timestamp >= $1 AND timestamp <= $2 AND {}
                     ORDER BY timestamp ASC",
                    Self::row_values_clause(chunk, 3)
                );
                let rows = Self::bind_keys(
                    sqlx::query(&sql).bind(query.start).bind(query.end),
                    chunk,
                )
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
            "DELETE FROM observations WHERE ctid IN (
                 SELECT ctid FROM observations WHERE timestamp < $1 LIMIT $2
             )",
        )
        .bind(cutoff)
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
             WHERE timestamp >= $1 AND timestamp < $2
             ORDER BY timestamp ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.iter().map(decode_row).collect()
    }
}
