//! Fully resolved configuration, the output of the resolver passes.

use std::collections::HashMap;
use std::time::Duration;

use relaymon_core::{Monitor, MonitorKey, Period, SponsorLevel};

use crate::document::BadgeDef;

/// SQLite binds at most 999 parameters per statement; four per key.
pub const SQLITE_MAX_BATCH_KEYS: usize = 999 / 4;

/// Aggregator cache TTLs per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub min90: Duration,
    pub hour24: Duration,
    pub day7: Duration,
    pub day30: Duration,
}

impl CacheTtl {
    /// TTL for the given period.
    #[must_use]
    pub fn for_period(&self, period: Period) -> Duration {
        match period {
            Period::Min90 => self.min90,
            Period::Hour24 => self.hour24,
            Period::Day7 => self.day7,
            Period::Day30 => self.day30,
        }
    }
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            min90: Duration::from_secs(10),
            hour24: Duration::from_secs(10),
            day7: Duration::from_secs(60),
            day30: Duration::from_secs(60),
        }
    }
}

/// Which store backend to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Postgres,
}

impl StorageBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

/// Resolved PostgreSQL connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub sslmode: Option<String>,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
}

impl PostgresConfig {
    /// Render a connection URL for sqlx.
    #[must_use]
    pub fn url(&self) -> String {
        let mut url = format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.dbname
        );
        if let Some(ref mode) = self.sslmode {
            url.push_str("?sslmode=");
            url.push_str(mode);
        }
        url
    }
}

/// Resolved retention sweep settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub days: u32,
    pub cleanup_interval: Duration,
    pub startup_delay: Duration,
    /// Startup jitter already materialized: `cleanup_interval * jitter_ratio`
    /// is sampled uniformly at loop start.
    pub jitter: Duration,
    pub batch_size: u32,
    pub max_batches_per_run: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            days: 90,
            cleanup_interval: Duration::from_secs(3600),
            startup_delay: Duration::from_secs(60),
            jitter: Duration::ZERO,
            batch_size: 5_000,
            max_batches_per_run: 10,
        }
    }
}

/// Resolved archive settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub enabled: bool,
    pub schedule_hour: u8,
    pub archive_days: u32,
    pub backfill_days: u32,
    pub output_dir: String,
    pub compress: bool,
    pub keep_days: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule_hour: 3,
            archive_days: 30,
            backfill_days: 3,
            output_dir: "archive".into(),
            compress: true,
            keep_days: 0,
        }
    }
}

/// Resolved storage configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite_path: Option<String>,
    pub postgres: Option<PostgresConfig>,
    pub retention: RetentionConfig,
    pub archive: ArchiveConfig,
}

/// Event FSM mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventsMode {
    #[default]
    Model,
    Channel,
}

/// Channel-mode aggregation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelStrategy {
    #[default]
    Recompute,
    Incremental,
}

/// Resolved event state machine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EventsConfig {
    pub mode: EventsMode,
    pub down_threshold: u32,
    pub up_threshold: u32,
    pub channel_down_threshold: u32,
    pub channel_strategy: ChannelStrategy,
    pub queue_size: usize,
    pub api_token: Option<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            mode: EventsMode::Model,
            down_threshold: 2,
            up_threshold: 1,
            channel_down_threshold: 1,
            channel_strategy: ChannelStrategy::Recompute,
            queue_size: 256,
            api_token: None,
        }
    }
}

/// Resolved announcements settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncementsConfig {
    pub enabled: bool,
    pub source: String,
    pub repo: Option<String>,
    pub window_days: u32,
    pub ttl: Duration,
    pub refresh_interval: Duration,
    pub api_max_age: u64,
    pub github_token: Option<String>,
    pub graphql_url: String,
}

impl Default for AnnouncementsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source: "github".into(),
            repo: None,
            window_days: 30,
            ttl: Duration::from_secs(300),
            refresh_interval: Duration::from_secs(300),
            api_max_age: 60,
            github_token: None,
            graphql_url: "https://api.github.com/graphql".into(),
        }
    }
}

/// Resolved sponsor pin settings, surfaced verbatim in API `meta`.
#[derive(Debug, Clone, PartialEq)]
pub struct SponsorPinConfig {
    pub min_level: SponsorLevel,
    pub min_uptime: f64,
    pub service_count: HashMap<String, u32>,
    pub max_pinned: u32,
}

impl Default for SponsorPinConfig {
    fn default() -> Self {
        Self {
            min_level: SponsorLevel::Basic,
            min_uptime: 95.0,
            service_count: HashMap::new(),
            max_pinned: 6,
        }
    }
}

/// Resolved self-test settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelftestConfig {
    pub enabled: bool,
    pub queue_size: usize,
}

impl Default for SelftestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue_size: 64,
        }
    }
}

/// The fully resolved configuration for one revision of the fleet.
///
/// Owned immutably behind an `Arc`; the hot-reloader publishes a fresh
/// instance on every successful reload and never mutates a published one.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    /// Monotonically increasing revision, assigned by the loader.
    pub revision: u64,

    pub degraded_weight: f64,
    /// Fleet-wide default slow-latency threshold, surfaced in API meta.
    pub default_slow_latency: Duration,
    /// `-1` means unbounded.
    pub max_concurrency: i32,
    pub stagger_probes: bool,

    pub enable_concurrent_query: bool,
    pub concurrent_query_limit: usize,
    pub enable_batch_query: bool,
    pub enable_db_timeline_agg: bool,
    /// Already clamped to [`SQLITE_MAX_BATCH_KEYS`] for the SQLite backend.
    pub batch_query_max_keys: usize,

    pub cache_ttl: CacheTtl,
    pub storage: StorageConfig,
    pub public_base_url: Option<String>,

    pub boards_enabled: bool,
    pub expose_channel_details: bool,
    pub channel_details_providers: Vec<String>,

    pub enable_badges: bool,
    pub badge_definitions: HashMap<String, BadgeDef>,

    pub sponsor_pin: SponsorPinConfig,
    pub selftest: SelftestConfig,
    pub events: EventsConfig,
    pub announcements: AnnouncementsConfig,

    pub monitors: Vec<Monitor>,

    /// Non-fatal findings collected by the resolver, already logged.
    pub warnings: Vec<String>,
}

impl ResolvedConfig {
    /// Look up a monitor by key.
    #[must_use]
    pub fn monitor(&self, key: &MonitorKey) -> Option<&Monitor> {
        self.monitors.iter().find(|m| &m.key == key)
    }

    /// Monitors the scheduler should probe under this revision.
    pub fn probed_monitors(&self) -> impl Iterator<Item = &Monitor> {
        self.monitors.iter().filter(|m| m.probed(self.boards_enabled))
    }
}
