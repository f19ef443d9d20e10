//! The three resolver passes and the materializer that turns a normalized
//! document into [`ResolvedConfig`].

mod inherit;
mod normalize;
mod validate;

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use relaymon_core::{Board, Category, HttpMethod, Monitor, MonitorKey, RetryPolicy, SponsorLevel};
use tracing::warn;

pub use inherit::inherit;
pub use normalize::normalize;
pub use validate::{ParentIndex, validate};

use crate::document::{FleetDocument, MonitorSpec};
use crate::duration::parse_duration;
use crate::error::ConfigError;
use crate::resolved::{
    AnnouncementsConfig, ArchiveConfig, CacheTtl, ChannelStrategy, EventsConfig, EventsMode,
    PostgresConfig, ResolvedConfig, RetentionConfig, SelftestConfig, SponsorPinConfig,
    StorageBackend, StorageConfig,
};

/// Run Validate → Normalize → Inherit over a parsed document and
/// materialize the result.
///
/// `config_dir` anchors body `!include` resolution. All collected warnings
/// are logged through `tracing` and kept on the returned config.
pub fn resolve(
    mut doc: FleetDocument,
    config_dir: &Path,
) -> Result<ResolvedConfig, ConfigError> {
    let mut warnings = Vec::new();
    let index = validate(&mut doc, &mut warnings)?;
    normalize(&mut doc, config_dir, &mut warnings)?;
    inherit(&mut doc, &index, &mut warnings)?;
    let resolved = materialize(&doc, warnings)?;
    for warning in &resolved.warnings {
        warn!(%warning, "config warning");
    }
    Ok(resolved)
}

/// Load, parse, and resolve a fleet configuration file.
pub fn load_config(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let doc: FleetDocument = toml::from_str(&contents)?;
    let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve(doc, config_dir)
}

#[allow(clippy::too_many_lines)]
fn materialize(
    doc: &FleetDocument,
    mut warnings: Vec<String>,
) -> Result<ResolvedConfig, ConfigError> {
    let global_interval = parse_global(doc.interval.as_deref(), "interval")?;
    let global_slow = parse_global(doc.slow_latency.as_deref(), "slow_latency")?;
    let global_timeout = parse_global(doc.timeout.as_deref(), "timeout")?;
    let global_retry = RetryPolicy {
        count: doc.retry.unwrap_or(0),
        base_delay: parse_global(doc.retry_base_delay.as_deref(), "retry_base_delay")?,
        max_delay: parse_global(doc.retry_max_delay.as_deref(), "retry_max_delay")?,
        jitter: doc.retry_jitter.unwrap_or(0.0),
    };

    let mut monitors = Vec::with_capacity(doc.monitors.len());
    for (order, spec) in doc.monitors.iter().enumerate() {
        monitors.push(materialize_monitor(
            spec,
            order,
            global_interval,
            global_slow,
            global_timeout,
            &global_retry,
            &mut warnings,
        )?);
    }

    let storage = materialize_storage(doc)?;
    let enable_concurrent_query = doc.enable_concurrent_query.unwrap_or(false);
    let concurrent_query_limit = doc.concurrent_query_limit.unwrap_or(10);
    if enable_concurrent_query
        && let Some(ref pg) = storage.postgres
        && (pg.max_open_conns as usize) < concurrent_query_limit
    {
        warnings.push(format!(
            "storage.postgres.max_open_conns ({}) is below concurrent_query_limit ({}); \
             concurrent queries will contend for connections",
            pg.max_open_conns, concurrent_query_limit
        ));
    }

    Ok(ResolvedConfig {
        revision: 0,
        degraded_weight: doc.degraded_weight.unwrap_or(0.7),
        default_slow_latency: global_slow,
        max_concurrency: doc.max_concurrency.unwrap_or(10),
        stagger_probes: doc.stagger_probes.unwrap_or(true),
        enable_concurrent_query,
        concurrent_query_limit,
        enable_batch_query: doc.enable_batch_query.unwrap_or(true),
        enable_db_timeline_agg: doc.enable_db_timeline_agg.unwrap_or(false),
        batch_query_max_keys: doc.batch_query_max_keys.unwrap_or(200),
        cache_ttl: CacheTtl {
            min90: parse_global(doc.cache_ttl.min90.as_deref(), "cache_ttl.90m")?,
            hour24: parse_global(doc.cache_ttl.hour24.as_deref(), "cache_ttl.24h")?,
            day7: parse_global(doc.cache_ttl.day7.as_deref(), "cache_ttl.7d")?,
            day30: parse_global(doc.cache_ttl.day30.as_deref(), "cache_ttl.30d")?,
        },
        storage,
        public_base_url: doc.public_base_url.clone(),
        boards_enabled: doc.boards.enabled.unwrap_or(false),
        expose_channel_details: doc.expose_channel_details.unwrap_or(false),
        channel_details_providers: doc.channel_details_providers.clone(),
        enable_badges: doc.enable_badges.unwrap_or(false),
        badge_definitions: doc.badge_definitions.clone(),
        sponsor_pin: materialize_sponsor_pin(doc)?,
        selftest: SelftestConfig {
            enabled: doc.selftest.enabled.unwrap_or(false),
            queue_size: doc.selftest.queue_size.unwrap_or(64),
        },
        events: materialize_events(doc),
        announcements: materialize_announcements(doc)?,
        monitors,
        warnings,
    })
}

fn parse_global(value: Option<&str>, field: &'static str) -> Result<Duration, ConfigError> {
    // Normalize has filled every global default; the fallback only guards
    // direct materialize calls in tests.
    let value = value.unwrap_or("0s");
    parse_duration(value).map_err(|_| ConfigError::InvalidGlobalDuration {
        field,
        value: value.to_owned(),
    })
}

fn materialize_monitor(
    spec: &MonitorSpec,
    order: usize,
    global_interval: Duration,
    global_slow: Duration,
    global_timeout: Duration,
    global_retry: &RetryPolicy,
    warnings: &mut Vec<String>,
) -> Result<Monitor, ConfigError> {
    if spec.provider.is_empty() || spec.service.is_empty() || spec.channel.is_empty() {
        return Err(ConfigError::InvalidField {
            monitor: spec.display_key(),
            message: "provider, service, and channel are required".into(),
        });
    }

    let key = MonitorKey::new(
        spec.provider.clone(),
        spec.service.clone(),
        spec.channel.clone(),
        spec.model.clone(),
    );

    let method = match spec.method {
        Some(ref m) => m.parse::<HttpMethod>().map_err(|message| {
            ConfigError::InvalidField {
                monitor: spec.display_key(),
                message,
            }
        })?,
        None => HttpMethod::default(),
    };

    let category = spec
        .category
        .as_deref()
        .map(str::parse::<Category>)
        .transpose()
        .map_err(|message| ConfigError::InvalidField {
            monitor: spec.display_key(),
            message,
        })?;
    let sponsor_level = spec
        .sponsor_level
        .as_deref()
        .map(str::parse::<SponsorLevel>)
        .transpose()
        .map_err(|message| ConfigError::InvalidField {
            monitor: spec.display_key(),
            message,
        })?
        .unwrap_or_default();
    let board = spec
        .board
        .as_deref()
        .map(str::parse::<Board>)
        .transpose()
        .map_err(|message| ConfigError::InvalidField {
            monitor: spec.display_key(),
            message,
        })?
        .unwrap_or_default();
    let listed_since = spec
        .listed_since
        .as_deref()
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()
        .map_err(|e| ConfigError::InvalidField {
            monitor: spec.display_key(),
            message: format!("listed_since: {e}"),
        })?;

    let interval = spec.interval_duration.unwrap_or(global_interval);
    let slow_latency = spec.slow_latency_duration.unwrap_or(global_slow);
    let timeout = spec.timeout_duration.unwrap_or(global_timeout);
    if slow_latency >= timeout {
        warnings.push(format!(
            "{}: slow_latency is not below timeout; successful probes can never be \
             classified DEGRADED before timing out",
            spec.display_key()
        ));
    }

    let retry = RetryPolicy {
        count: spec.retry.unwrap_or(global_retry.count),
        base_delay: spec
            .retry_base_delay_duration
            .unwrap_or(global_retry.base_delay),
        max_delay: spec
            .retry_max_delay_duration
            .unwrap_or(global_retry.max_delay),
        jitter: spec.retry_jitter.unwrap_or(global_retry.jitter),
    };

    Ok(Monitor {
        key,
        parent: spec.parent.clone(),
        order,
        url: spec.url.clone().unwrap_or_default(),
        method,
        headers: spec.headers.clone(),
        body: spec.body.clone(),
        api_key: spec.api_key.clone(),
        success_contains: spec.success_contains.clone(),
        env_var_name: spec.env_var_name.clone(),
        proxy: spec.proxy.clone(),
        interval,
        slow_latency,
        timeout,
        retry,
        slug: spec
            .provider_slug
            .clone()
            .unwrap_or_else(|| spec.provider.to_lowercase()),
        display_name: spec.display_name.clone(),
        provider_display_name: spec.provider_display_name.clone(),
        category,
        sponsor: spec.sponsor.clone(),
        sponsor_level,
        board,
        cold_reason: spec.cold_reason.clone(),
        disabled: spec.disabled.unwrap_or(false),
        disabled_reason: spec.disabled_reason.clone(),
        hidden: spec.hidden.unwrap_or(false),
        hidden_reason: spec.hidden_reason.clone(),
        badges: spec.badges.clone(),
        risk: spec.risk.clone(),
        price_min: spec.price_min,
        price_max: spec.price_max,
        listed_since,
        provider_metadata: spec.provider_metadata.clone(),
    })
}

fn materialize_storage(doc: &FleetDocument) -> Result<StorageConfig, ConfigError> {
    let backend = match doc.storage.backend.as_deref() {
        Some("postgres") => StorageBackend::Postgres,
        _ => StorageBackend::Sqlite,
    };

    let enable_concurrent = doc.enable_concurrent_query.unwrap_or(false);
    let (default_open, default_idle) = if enable_concurrent { (50, 10) } else { (25, 5) };

    let postgres = if backend == StorageBackend::Postgres {
        let pg = &doc.storage.postgres;
        Some(PostgresConfig {
            host: pg.host.clone().unwrap_or_else(|| "localhost".into()),
            port: pg.port.unwrap_or(5432),
            user: pg.user.clone().unwrap_or_else(|| "relaymon".into()),
            password: pg.password.clone().unwrap_or_default(),
            dbname: pg.dbname.clone().unwrap_or_else(|| "relaymon".into()),
            sslmode: pg.sslmode.clone(),
            max_open_conns: pg.max_open_conns.unwrap_or(default_open),
            max_idle_conns: pg.max_idle_conns.unwrap_or(default_idle),
        })
    } else {
        None
    };

    let r = &doc.storage.retention;
    let cleanup_interval = r
        .cleanup_interval
        .as_deref()
        .map(parse_duration)
        .transpose()
        .map_err(ConfigError::Storage)?
        .unwrap_or(Duration::from_secs(3600));
    let jitter = Duration::from_secs_f64(
        cleanup_interval.as_secs_f64() * r.jitter_ratio.unwrap_or(0.1).clamp(0.0, 1.0),
    );
    let retention = RetentionConfig {
        enabled: r.enabled.unwrap_or(false),
        days: r.days.unwrap_or(90),
        cleanup_interval,
        startup_delay: r
            .startup_delay
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(ConfigError::Storage)?
            .unwrap_or(Duration::from_secs(60)),
        jitter,
        batch_size: r.batch_size.unwrap_or(5_000),
        max_batches_per_run: r.max_batches_per_run.unwrap_or(10),
    };

    let a = &doc.storage.archive;
    let archive = ArchiveConfig {
        enabled: a.enabled.unwrap_or(false),
        schedule_hour: a.schedule_hour.unwrap_or(3).min(23),
        archive_days: a.archive_days.unwrap_or(30),
        backfill_days: a.backfill_days.unwrap_or(3),
        output_dir: a.output_dir.clone().unwrap_or_else(|| "archive".into()),
        compress: a.compress.unwrap_or(true),
        keep_days: a.keep_days.unwrap_or(0),
    };

    Ok(StorageConfig {
        backend,
        sqlite_path: Some(
            doc.storage
                .sqlite_path
                .clone()
                .unwrap_or_else(|| "relaymon.db".into()),
        ),
        postgres,
        retention,
        archive,
    })
}

fn materialize_events(doc: &FleetDocument) -> EventsConfig {
    let defaults = EventsConfig::default();
    EventsConfig {
        mode: match doc.events.mode.as_deref() {
            Some("channel") => EventsMode::Channel,
            _ => EventsMode::Model,
        },
        down_threshold: doc.events.down_threshold.unwrap_or(defaults.down_threshold),
        up_threshold: doc.events.up_threshold.unwrap_or(defaults.up_threshold),
        channel_down_threshold: doc
            .events
            .channel_down_threshold
            .unwrap_or(defaults.channel_down_threshold),
        channel_strategy: match doc.events.channel_strategy.as_deref() {
            Some("incremental") => ChannelStrategy::Incremental,
            _ => ChannelStrategy::Recompute,
        },
        queue_size: doc.events.queue_size.unwrap_or(defaults.queue_size),
        api_token: doc.events.api_token.clone(),
    }
}

fn materialize_announcements(doc: &FleetDocument) -> Result<AnnouncementsConfig, ConfigError> {
    let defaults = AnnouncementsConfig::default();
    Ok(AnnouncementsConfig {
        enabled: doc.announcements.enabled.unwrap_or(false),
        source: doc
            .announcements
            .source
            .clone()
            .unwrap_or_else(|| "github".into()),
        repo: doc.announcements.repo.clone(),
        window_days: doc.announcements.window_days.unwrap_or(30),
        ttl: doc
            .announcements
            .ttl
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(ConfigError::Storage)?
            .unwrap_or(defaults.ttl),
        refresh_interval: doc
            .announcements
            .refresh_interval
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(ConfigError::Storage)?
            .unwrap_or(defaults.refresh_interval),
        api_max_age: doc.announcements.api_max_age.unwrap_or(60),
        github_token: doc.github.token.clone(),
        graphql_url: doc
            .github
            .graphql_url
            .clone()
            .unwrap_or(defaults.graphql_url),
    })
}

fn materialize_sponsor_pin(doc: &FleetDocument) -> Result<SponsorPinConfig, ConfigError> {
    let defaults = SponsorPinConfig::default();
    let min_level = match doc.sponsor_pin.min_level.as_deref() {
        Some(level) => level
            .parse::<SponsorLevel>()
            .map_err(|message| ConfigError::InvalidField {
                monitor: "sponsor_pin.min_level".into(),
                message,
            })?,
        None => defaults.min_level,
    };
    Ok(SponsorPinConfig {
        min_level,
        min_uptime: doc.sponsor_pin.min_uptime.unwrap_or(defaults.min_uptime),
        service_count: doc.sponsor_pin.service_count.clone(),
        max_pinned: doc.sponsor_pin.max_pinned.unwrap_or(defaults.max_pinned),
    })
}
