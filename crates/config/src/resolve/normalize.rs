//! Normalization pass: defaults, environment overrides, duration parsing,
//! per-service overrides, slugs, provider-level flag injection, and body
//! resolution.

use std::collections::HashMap;
use std::path::Path;

use crate::document::FleetDocument;
use crate::duration::parse_duration;
use crate::env::apply_env_overrides;
use crate::error::ConfigError;
use crate::include::{include_path, resolve_include};
use crate::resolved::SQLITE_MAX_BATCH_KEYS;
use crate::slug::{derive_slug, validate_slug};

/// Run the normalization pass.
///
/// Normalize is idempotent: a second run over its own output changes
/// nothing. Per-monitor fields that may still be inherited from a parent
/// are left unset here; only service-level override maps are applied, so
/// they take precedence over inheritance.
pub fn normalize(
    doc: &mut FleetDocument,
    config_dir: &Path,
    warnings: &mut Vec<String>,
) -> Result<(), ConfigError> {
    fill_global_defaults(doc);
    apply_env_overrides(doc);

    // Case-insensitive service maps: store keys lowercased once.
    doc.slow_latency_by_service = lowercase_keys(&doc.slow_latency_by_service);
    doc.timeout_by_service = lowercase_keys(&doc.timeout_by_service);

    check_global_durations(doc)?;
    normalize_storage(doc, warnings)?;
    normalize_events(doc)?;
    resolve_body_templates(doc, config_dir)?;

    for i in 0..doc.monitors.len() {
        let service = doc.monitors[i].service.to_lowercase();
        let provider = doc.monitors[i].provider.clone();

        // Service-level timing overrides fill gaps before inheritance.
        if doc.monitors[i].slow_latency.is_none()
            && let Some(v) = doc.slow_latency_by_service.get(&service)
        {
            doc.monitors[i].slow_latency = Some(v.clone());
        }
        if doc.monitors[i].timeout.is_none()
            && let Some(v) = doc.timeout_by_service.get(&service)
        {
            doc.monitors[i].timeout = Some(v.clone());
        }

        parse_monitor_durations(doc, i)?;

        // Provider slug.
        let monitor = &mut doc.monitors[i];
        match monitor.provider_slug {
            Some(ref slug) => validate_slug(slug)?,
            None => monitor.provider_slug = Some(derive_slug(&provider)?),
        }

        // Provider-level flag injection with reason fallthrough: an explicit
        // monitor-level reason always wins over the provider-level one.
        if let Some(reason) = doc.disabled_providers.get(&provider) {
            monitor.disabled = Some(true);
            if monitor.disabled_reason.is_none() {
                monitor.disabled_reason = Some(reason.clone());
            }
        }
        if let Some(reason) = doc.hidden_providers.get(&provider) {
            monitor.hidden = Some(true);
            if monitor.hidden_reason.is_none() {
                monitor.hidden_reason = Some(reason.clone());
            }
        }
        if monitor.risk.is_none()
            && let Some(reason) = doc.risk_providers.get(&provider)
        {
            monitor.risk = Some(reason.clone());
        }

        // disabled ⇒ hidden, with the disable reason falling through.
        if monitor.disabled == Some(true) && monitor.hidden != Some(true) {
            monitor.hidden = Some(true);
            if monitor.hidden_reason.is_none() {
                monitor.hidden_reason = monitor.disabled_reason.clone();
            }
        }

        resolve_monitor_body(doc, i, config_dir)?;
    }

    Ok(())
}

fn fill_global_defaults(doc: &mut FleetDocument) {
    doc.interval.get_or_insert_with(|| "1m".into());
    doc.slow_latency.get_or_insert_with(|| "5s".into());
    doc.timeout.get_or_insert_with(|| "10s".into());
    doc.retry.get_or_insert(0);
    doc.retry_base_delay.get_or_insert_with(|| "200ms".into());
    doc.retry_max_delay.get_or_insert_with(|| "2s".into());
    doc.retry_jitter.get_or_insert(0.0);
    doc.degraded_weight.get_or_insert(0.7);
    // `0` falls back to the default worker cap; `-1` stays as "unbounded".
    match doc.max_concurrency {
        None | Some(0) => doc.max_concurrency = Some(10),
        Some(_) => {}
    }
    doc.stagger_probes.get_or_insert(true);
    doc.enable_concurrent_query.get_or_insert(false);
    doc.concurrent_query_limit.get_or_insert(10);
    doc.enable_batch_query.get_or_insert(true);
    doc.enable_db_timeline_agg.get_or_insert(false);
    doc.batch_query_max_keys.get_or_insert(200);
    doc.cache_ttl.min90.get_or_insert_with(|| "10s".into());
    doc.cache_ttl.hour24.get_or_insert_with(|| "10s".into());
    doc.cache_ttl.day7.get_or_insert_with(|| "60s".into());
    doc.cache_ttl.day30.get_or_insert_with(|| "60s".into());
}

fn lowercase_keys(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}

fn check_global_durations(doc: &FleetDocument) -> Result<(), ConfigError> {
    let fields: [(&'static str, Option<&String>); 11] = [
        ("interval", doc.interval.as_ref()),
        ("slow_latency", doc.slow_latency.as_ref()),
        ("timeout", doc.timeout.as_ref()),
        ("retry_base_delay", doc.retry_base_delay.as_ref()),
        ("retry_max_delay", doc.retry_max_delay.as_ref()),
        ("cache_ttl.90m", doc.cache_ttl.min90.as_ref()),
        ("cache_ttl.24h", doc.cache_ttl.hour24.as_ref()),
        ("cache_ttl.7d", doc.cache_ttl.day7.as_ref()),
        ("cache_ttl.30d", doc.cache_ttl.day30.as_ref()),
        (
            "storage.retention.cleanup_interval",
            doc.storage.retention.cleanup_interval.as_ref(),
        ),
        (
            "storage.retention.startup_delay",
            doc.storage.retention.startup_delay.as_ref(),
        ),
    ];
    for (field, value) in fields {
        if let Some(value) = value {
            parse_duration(value).map_err(|_| ConfigError::InvalidGlobalDuration {
                field,
                value: value.clone(),
            })?;
        }
    }
    for (field, value) in [
        ("announcements.ttl", doc.announcements.ttl.as_ref()),
        (
            "announcements.refresh_interval",
            doc.announcements.refresh_interval.as_ref(),
        ),
    ] {
        if let Some(value) = value {
            parse_duration(value).map_err(|_| ConfigError::InvalidGlobalDuration {
                field,
                value: value.clone(),
            })?;
        }
    }
    for (service, value) in doc
        .slow_latency_by_service
        .iter()
        .chain(doc.timeout_by_service.iter())
    {
        parse_duration(value).map_err(|_| ConfigError::InvalidGlobalDuration {
            field: "service override",
            value: format!("{service}={value}"),
        })?;
    }
    Ok(())
}

fn parse_monitor_durations(doc: &mut FleetDocument, i: usize) -> Result<(), ConfigError> {
    let key = doc.monitors[i].display_key();
    let monitor = &mut doc.monitors[i];
    for (field, source, slot) in [
        (
            "interval",
            monitor.interval.clone(),
            &mut monitor.interval_duration,
        ),
        (
            "slow_latency",
            monitor.slow_latency.clone(),
            &mut monitor.slow_latency_duration,
        ),
        (
            "timeout",
            monitor.timeout.clone(),
            &mut monitor.timeout_duration,
        ),
        (
            "retry_base_delay",
            monitor.retry_base_delay.clone(),
            &mut monitor.retry_base_delay_duration,
        ),
        (
            "retry_max_delay",
            monitor.retry_max_delay.clone(),
            &mut monitor.retry_max_delay_duration,
        ),
    ] {
        if let Some(raw) = source {
            *slot = Some(parse_duration(&raw).map_err(|_| ConfigError::InvalidDuration {
                monitor: key.clone(),
                field,
                value: raw,
            })?);
        }
    }
    Ok(())
}

fn normalize_storage(doc: &mut FleetDocument, warnings: &mut Vec<String>) -> Result<(), ConfigError> {
    let backend = doc
        .storage
        .backend
        .get_or_insert_with(|| "sqlite".into())
        .clone();
    if backend != "sqlite" && backend != "postgres" {
        return Err(ConfigError::Storage(format!(
            "unknown storage type {backend:?}"
        )));
    }

    // The SQLite parameter cap must be visible before the first query, so
    // the clamp happens here rather than at request time.
    if backend == "sqlite" {
        let max_keys = doc.batch_query_max_keys.unwrap_or(200);
        if max_keys > SQLITE_MAX_BATCH_KEYS {
            warnings.push(format!(
                "batch_query_max_keys {max_keys} exceeds the SQLite statement cap; \
                 clamping to {SQLITE_MAX_BATCH_KEYS}"
            ));
            doc.batch_query_max_keys = Some(SQLITE_MAX_BATCH_KEYS);
        }
    }

    let archive = &doc.storage.archive;
    if archive.enabled == Some(true) {
        let days = doc.storage.retention.days.unwrap_or(90);
        let needed = archive.archive_days.unwrap_or(30) + archive.backfill_days.unwrap_or(3);
        if days < needed {
            return Err(ConfigError::ArchiveExceedsRetention { days, needed });
        }
    }

    Ok(())
}

fn normalize_events(doc: &mut FleetDocument) -> Result<(), ConfigError> {
    if let Some(ref mode) = doc.events.mode
        && mode != "model"
        && mode != "channel"
    {
        return Err(ConfigError::Storage(format!(
            "events.mode {mode:?} must be \"model\" or \"channel\""
        )));
    }
    if let Some(ref strategy) = doc.events.channel_strategy
        && strategy != "recompute"
        && strategy != "incremental"
    {
        return Err(ConfigError::Storage(format!(
            "events.channel_strategy {strategy:?} must be \"recompute\" or \"incremental\""
        )));
    }
    Ok(())
}

fn resolve_body_templates(doc: &mut FleetDocument, config_dir: &Path) -> Result<(), ConfigError> {
    let names: Vec<String> = doc.body_templates.keys().cloned().collect();
    for name in names {
        let value = doc.body_templates[&name].clone();
        if let Some(path) = include_path(&value) {
            let contents =
                resolve_include(config_dir, path).map_err(|message| ConfigError::BadInclude {
                    monitor: format!("body_templates.{name}"),
                    path: path.to_owned(),
                    message,
                })?;
            doc.body_templates.insert(name, contents);
        }
    }
    Ok(())
}

fn resolve_monitor_body(
    doc: &mut FleetDocument,
    i: usize,
    config_dir: &Path,
) -> Result<(), ConfigError> {
    let key = doc.monitors[i].display_key();

    if let Some(body) = doc.monitors[i].body.clone()
        && let Some(path) = include_path(&body)
    {
        let contents =
            resolve_include(config_dir, path).map_err(|message| ConfigError::BadInclude {
                monitor: key.clone(),
                path: path.to_owned(),
                message,
            })?;
        doc.monitors[i].body = Some(contents);
    }

    if doc.monitors[i].body.is_none()
        && let Some(name) = doc.monitors[i].body_template.clone()
    {
        let Some(template) = doc.body_templates.get(&name) else {
            return Err(ConfigError::UnknownBodyTemplate { monitor: key, name });
        };
        doc.monitors[i].body = Some(template.clone());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MonitorSpec;
    use std::time::Duration;

    fn base_doc() -> FleetDocument {
        FleetDocument {
            monitors: vec![MonitorSpec {
                provider: "demo".into(),
                service: "cc".into(),
                channel: "vip".into(),
                url: Some("https://example.com".into()),
                ..MonitorSpec::default()
            }],
            ..FleetDocument::default()
        }
    }

    #[test]
    fn fills_documented_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = base_doc();
        normalize(&mut doc, dir.path(), &mut Vec::new()).expect("normalizes");

        assert_eq!(doc.interval.as_deref(), Some("1m"));
        assert_eq!(doc.slow_latency.as_deref(), Some("5s"));
        assert_eq!(doc.timeout.as_deref(), Some("10s"));
        assert!((doc.degraded_weight.unwrap() - 0.7).abs() < f64::EPSILON);
        assert_eq!(doc.max_concurrency, Some(10));
        assert_eq!(doc.stagger_probes, Some(true));
        assert_eq!(doc.cache_ttl.min90.as_deref(), Some("10s"));
        assert_eq!(doc.cache_ttl.day30.as_deref(), Some("60s"));
    }

    #[test]
    fn zero_concurrency_becomes_default_minus_one_survives() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = base_doc();
        doc.max_concurrency = Some(0);
        normalize(&mut doc, dir.path(), &mut Vec::new()).unwrap();
        assert_eq!(doc.max_concurrency, Some(10));

        let mut doc = base_doc();
        doc.max_concurrency = Some(-1);
        normalize(&mut doc, dir.path(), &mut Vec::new()).unwrap();
        assert_eq!(doc.max_concurrency, Some(-1));
    }

    #[test]
    fn service_override_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = base_doc();
        doc.slow_latency_by_service
            .insert("CC".into(), "3s".into());
        normalize(&mut doc, dir.path(), &mut Vec::new()).unwrap();
        assert_eq!(doc.monitors[0].slow_latency.as_deref(), Some("3s"));
        assert_eq!(
            doc.monitors[0].slow_latency_duration,
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn provider_flags_inject_with_reason_fallthrough() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = base_doc();
        doc.disabled_providers
            .insert("demo".into(), "billing lapsed".into());
        normalize(&mut doc, dir.path(), &mut Vec::new()).unwrap();

        let m = &doc.monitors[0];
        assert_eq!(m.disabled, Some(true));
        assert_eq!(m.disabled_reason.as_deref(), Some("billing lapsed"));
        // disabled ⇒ hidden, reason falls through.
        assert_eq!(m.hidden, Some(true));
        assert_eq!(m.hidden_reason.as_deref(), Some("billing lapsed"));
    }

    #[test]
    fn monitor_level_reason_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = base_doc();
        doc.monitors[0].disabled_reason = Some("own reason".into());
        doc.disabled_providers
            .insert("demo".into(), "provider reason".into());
        normalize(&mut doc, dir.path(), &mut Vec::new()).unwrap();
        assert_eq!(
            doc.monitors[0].disabled_reason.as_deref(),
            Some("own reason")
        );
    }

    #[test]
    fn slug_derived_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = base_doc();
        normalize(&mut doc, dir.path(), &mut Vec::new()).unwrap();
        assert_eq!(doc.monitors[0].provider_slug.as_deref(), Some("demo"));

        let mut doc = base_doc();
        doc.monitors[0].provider_slug = Some("Bad Slug".into());
        assert!(normalize(&mut doc, dir.path(), &mut Vec::new()).is_err());
    }

    #[test]
    fn sqlite_batch_cap_clamped_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = base_doc();
        doc.batch_query_max_keys = Some(500);
        let mut warnings = Vec::new();
        normalize(&mut doc, dir.path(), &mut warnings).unwrap();
        assert_eq!(doc.batch_query_max_keys, Some(SQLITE_MAX_BATCH_KEYS));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn archive_requires_covering_retention() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = base_doc();
        doc.storage.archive.enabled = Some(true);
        doc.storage.archive.archive_days = Some(30);
        doc.storage.archive.backfill_days = Some(3);
        doc.storage.retention.days = Some(20);
        let err = normalize(&mut doc, dir.path(), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ArchiveExceedsRetention { .. }));
    }

    #[test]
    fn body_include_and_template_resolution() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/chat.json"), "{\"x\":1}").unwrap();

        let mut doc = base_doc();
        doc.monitors[0].body = Some("!include chat.json".into());
        normalize(&mut doc, dir.path(), &mut Vec::new()).unwrap();
        assert_eq!(doc.monitors[0].body.as_deref(), Some("{\"x\":1}"));

        let mut doc = base_doc();
        doc.body_templates
            .insert("chat".into(), "!include chat.json".into());
        doc.monitors[0].body_template = Some("chat".into());
        normalize(&mut doc, dir.path(), &mut Vec::new()).unwrap();
        assert_eq!(doc.monitors[0].body.as_deref(), Some("{\"x\":1}"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/chat.json"), "{}").unwrap();

        let mut doc = base_doc();
        doc.monitors[0].body = Some("!include chat.json".into());
        doc.slow_latency_by_service
            .insert("CC".into(), "3s".into());
        doc.disabled_providers.insert("demo".into(), "gone".into());

        normalize(&mut doc, dir.path(), &mut Vec::new()).unwrap();
        let once = doc.clone();
        normalize(&mut doc, dir.path(), &mut Vec::new()).unwrap();
        assert_eq!(doc, once);
    }
}
