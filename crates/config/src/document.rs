//! Raw shape of the declarative fleet document.
//!
//! Everything here mirrors the TOML file faithfully: optional fields stay
//! optional and duration values stay strings. The resolver passes
//! (validate, normalize, inherit) operate on this representation before it
//! is materialized into [`relaymon_core::Monitor`] records.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level fleet document, loaded from `relaymon.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FleetDocument {
    /// Default probe cadence, e.g. `"1m"`.
    pub interval: Option<String>,
    /// Default slow-latency threshold, e.g. `"5s"`.
    pub slow_latency: Option<String>,
    /// Per-service slow-latency overrides; keys are matched
    /// case-insensitively.
    #[serde(default)]
    pub slow_latency_by_service: HashMap<String, String>,
    /// Default per-attempt timeout, e.g. `"10s"`.
    pub timeout: Option<String>,
    /// Per-service timeout overrides; keys are matched case-insensitively.
    #[serde(default)]
    pub timeout_by_service: HashMap<String, String>,

    /// Default retry count for UNAVAILABLE outcomes.
    pub retry: Option<u32>,
    pub retry_base_delay: Option<String>,
    pub retry_max_delay: Option<String>,
    pub retry_jitter: Option<f64>,

    /// Weight applied to DEGRADED observations when computing availability.
    pub degraded_weight: Option<f64>,
    /// Probe worker cap. `-1` means unbounded; `0` means the default of 10.
    pub max_concurrency: Option<i32>,
    /// Spread first-fire offsets uniformly over each period.
    pub stagger_probes: Option<bool>,

    pub enable_concurrent_query: Option<bool>,
    pub concurrent_query_limit: Option<usize>,
    pub enable_batch_query: Option<bool>,
    pub enable_db_timeline_agg: Option<bool>,
    pub batch_query_max_keys: Option<usize>,

    /// Aggregator cache TTLs per period.
    #[serde(default)]
    pub cache_ttl: CacheTtlSpec,

    /// Storage backend, retention, and archive settings.
    #[serde(default)]
    pub storage: StorageSpec,

    pub public_base_url: Option<String>,

    /// Provider-level flags injected into every monitor of the provider.
    /// Values are the human-readable reasons.
    #[serde(default)]
    pub disabled_providers: HashMap<String, String>,
    #[serde(default)]
    pub hidden_providers: HashMap<String, String>,
    #[serde(default)]
    pub risk_providers: HashMap<String, String>,

    #[serde(default)]
    pub boards: BoardsSpec,

    pub expose_channel_details: Option<bool>,
    #[serde(default)]
    pub channel_details_providers: Vec<String>,

    pub enable_badges: Option<bool>,
    /// Badge id → definition.
    #[serde(default)]
    pub badge_definitions: HashMap<String, BadgeDef>,
    /// Provider → badge ids applied to monitors without explicit badges.
    #[serde(default)]
    pub badge_providers: HashMap<String, Vec<String>>,

    /// Named request bodies referenced by `monitor.body_template`.
    #[serde(default)]
    pub body_templates: HashMap<String, String>,

    #[serde(default)]
    pub sponsor_pin: SponsorPinSpec,
    #[serde(default)]
    pub selftest: SelftestSpec,
    #[serde(default)]
    pub events: EventsSpec,
    #[serde(default)]
    pub announcements: AnnouncementsSpec,
    #[serde(default)]
    pub github: GithubSpec,

    #[serde(default)]
    pub monitors: Vec<MonitorSpec>,
}

/// Per-period aggregator cache TTL strings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CacheTtlSpec {
    #[serde(rename = "90m")]
    pub min90: Option<String>,
    #[serde(rename = "24h")]
    pub hour24: Option<String>,
    #[serde(rename = "7d")]
    pub day7: Option<String>,
    #[serde(rename = "30d")]
    pub day30: Option<String>,
}

/// Storage section of the fleet document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StorageSpec {
    /// `"sqlite"` (default) or `"postgres"`.
    #[serde(rename = "type")]
    pub backend: Option<String>,
    pub sqlite_path: Option<String>,
    #[serde(default)]
    pub postgres: PostgresSpec,
    #[serde(default)]
    pub retention: RetentionSpec,
    #[serde(default)]
    pub archive: ArchiveSpec,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PostgresSpec {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub sslmode: Option<String>,
    pub max_open_conns: Option<u32>,
    pub max_idle_conns: Option<u32>,
}

/// Retention sweep settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RetentionSpec {
    pub enabled: Option<bool>,
    /// Observations older than this many days are deleted.
    pub days: Option<u32>,
    pub cleanup_interval: Option<String>,
    pub startup_delay: Option<String>,
    /// Extra startup jitter as a fraction of `cleanup_interval`.
    pub jitter_ratio: Option<f64>,
    pub batch_size: Option<u32>,
    pub max_batches_per_run: Option<u32>,
}

/// Daily archive settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ArchiveSpec {
    pub enabled: Option<bool>,
    /// UTC hour of day the archive job runs at.
    pub schedule_hour: Option<u8>,
    /// Days to hold back before a day becomes archivable.
    pub archive_days: Option<u32>,
    /// How many additional past days to backfill.
    pub backfill_days: Option<u32>,
    pub output_dir: Option<String>,
    /// Write gzipped CSV instead of plain CSV.
    pub compress: Option<bool>,
    /// Archives older than this many days are deleted; 0 retains forever.
    pub keep_days: Option<u32>,
}

/// Boards feature toggle.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BoardsSpec {
    pub enabled: Option<bool>,
}

/// A badge definition referenced by id from monitors and providers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BadgeDef {
    pub label: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Sponsor pinning floors and budgets.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SponsorPinSpec {
    /// Minimum sponsor level eligible for pinning.
    pub min_level: Option<String>,
    /// Minimum uptime percent eligible for pinning.
    pub min_uptime: Option<f64>,
    /// Sponsor group → number of sponsored services.
    #[serde(default)]
    pub service_count: HashMap<String, u32>,
    /// Total pin budget across all sponsors.
    pub max_pinned: Option<u32>,
}

/// Self-test queueing settings (consumed by an external collaborator).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SelftestSpec {
    pub enabled: Option<bool>,
    pub queue_size: Option<usize>,
}

/// Event state machine settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EventsSpec {
    /// `"model"` (default) or `"channel"`.
    pub mode: Option<String>,
    pub down_threshold: Option<u32>,
    pub up_threshold: Option<u32>,
    pub channel_down_threshold: Option<u32>,
    /// `"recompute"` (default) or `"incremental"`.
    pub channel_strategy: Option<String>,
    /// Capacity of the outbound event queue.
    pub queue_size: Option<usize>,
    /// Token required by the events API collaborator.
    pub api_token: Option<String>,
}

/// Announcements service settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AnnouncementsSpec {
    pub enabled: Option<bool>,
    /// Announcement source; only `"github"` is recognized.
    pub source: Option<String>,
    /// `owner/name` of the repository whose discussions are polled.
    pub repo: Option<String>,
    /// How many days of announcements to serve.
    pub window_days: Option<u32>,
    /// Snapshot TTL before an on-demand refresh.
    pub ttl: Option<String>,
    /// Background refresh cadence.
    pub refresh_interval: Option<String>,
    /// `max-age` advertised to API clients, seconds.
    pub api_max_age: Option<u64>,
}

/// GitHub API settings shared by the announcements poller.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GithubSpec {
    pub token: Option<String>,
    pub graphql_url: Option<String>,
}

/// One monitor entry of the fleet document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MonitorSpec {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub model: String,
    /// Parent path `provider/service/channel` for children of a
    /// multi-model group.
    pub parent: Option<String>,

    pub url: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    /// Name of an entry in the top-level `body_templates` table.
    pub body_template: Option<String>,
    pub api_key: Option<String>,
    pub env_var_name: Option<String>,
    pub success_contains: Option<String>,
    pub proxy: Option<String>,

    pub interval: Option<String>,
    pub slow_latency: Option<String>,
    pub timeout: Option<String>,

    pub retry: Option<u32>,
    pub retry_base_delay: Option<String>,
    pub retry_max_delay: Option<String>,
    pub retry_jitter: Option<f64>,

    pub category: Option<String>,
    pub sponsor: Option<String>,
    pub sponsor_level: Option<String>,
    pub board: Option<String>,
    pub cold_reason: Option<String>,
    pub disabled: Option<bool>,
    pub disabled_reason: Option<String>,
    pub hidden: Option<bool>,
    pub hidden_reason: Option<String>,
    #[serde(default)]
    pub badges: Vec<String>,
    pub risk: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    /// `YYYY-MM-DD`.
    pub listed_since: Option<String>,
    pub display_name: Option<String>,
    pub provider_display_name: Option<String>,
    pub provider_slug: Option<String>,
    #[serde(default)]
    pub provider_metadata: HashMap<String, String>,

    // Parsed duration shadows. Filled during Normalize and refreshed after
    // Inherit so that no monitor leaves the resolver with an unparsed
    // duration string.
    #[serde(skip)]
    pub interval_duration: Option<Duration>,
    #[serde(skip)]
    pub slow_latency_duration: Option<Duration>,
    #[serde(skip)]
    pub timeout_duration: Option<Duration>,
    #[serde(skip)]
    pub retry_base_delay_duration: Option<Duration>,
    #[serde(skip)]
    pub retry_max_delay_duration: Option<Duration>,
}

impl MonitorSpec {
    /// Human-readable identity for error messages:
    /// `provider/service/channel/model` with the segments currently known.
    #[must_use]
    pub fn display_key(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.provider, self.service, self.channel, self.model
        )
    }

    /// Channel triple `provider/service/channel`.
    #[must_use]
    pub fn triple(&self) -> String {
        format!("{}/{}/{}", self.provider, self.service, self.channel)
    }
}
