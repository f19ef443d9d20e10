//! Environment variable overrides.
//!
//! Applied during Normalize, after defaults are filled and before
//! inheritance, so that a key injected into a group parent flows down to
//! its children like any other configured value.

use crate::document::FleetDocument;

/// Apply overrides from the process environment.
pub fn apply_env_overrides(doc: &mut FleetDocument) {
    apply_env_overrides_from(doc, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup, for tests.
pub fn apply_env_overrides_from(
    doc: &mut FleetDocument,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("MONITOR_PUBLIC_BASE_URL") {
        doc.public_base_url = Some(v);
    }
    if let Some(v) = lookup("MONITOR_STORAGE_TYPE") {
        doc.storage.backend = Some(v);
    }
    if let Some(v) = lookup("MONITOR_SQLITE_PATH") {
        doc.storage.sqlite_path = Some(v);
    }
    if let Some(v) = lookup("MONITOR_POSTGRES_HOST") {
        doc.storage.postgres.host = Some(v);
    }
    if let Some(v) = lookup("MONITOR_POSTGRES_PORT")
        && let Ok(port) = v.parse()
    {
        doc.storage.postgres.port = Some(port);
    }
    if let Some(v) = lookup("MONITOR_POSTGRES_USER") {
        doc.storage.postgres.user = Some(v);
    }
    if let Some(v) = lookup("MONITOR_POSTGRES_PASSWORD") {
        doc.storage.postgres.password = Some(v);
    }
    if let Some(v) = lookup("MONITOR_POSTGRES_DBNAME") {
        doc.storage.postgres.dbname = Some(v);
    }
    if let Some(v) = lookup("MONITOR_POSTGRES_SSLMODE") {
        doc.storage.postgres.sslmode = Some(v);
    }
    if let Some(v) = lookup("EVENTS_API_TOKEN") {
        doc.events.api_token = Some(v);
    }
    if let Some(v) = lookup("GITHUB_TOKEN") {
        doc.github.token = Some(v);
    }

    for monitor in &mut doc.monitors {
        let from_env = if let Some(ref name) = monitor.env_var_name {
            lookup(name)
        } else {
            let scoped = format!(
                "MONITOR_{}_{}_{}_API_KEY",
                env_segment(&monitor.provider),
                env_segment(&monitor.service),
                env_segment(&monitor.channel),
            );
            lookup(&scoped).or_else(|| {
                let fallback = format!(
                    "MONITOR_{}_{}_API_KEY",
                    env_segment(&monitor.provider),
                    env_segment(&monitor.service),
                );
                lookup(&fallback)
            })
        };
        if let Some(key) = from_env {
            monitor.api_key = Some(key);
        }
    }
}

/// Uppercase a key segment and map anything outside `[A-Z0-9]` to `_`.
fn env_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            let c = c.to_ascii_uppercase();
            if c.is_ascii_alphanumeric() { c } else { '_' }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::MonitorSpec;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn storage_overrides_apply() {
        let vars = env(&[
            ("MONITOR_STORAGE_TYPE", "postgres"),
            ("MONITOR_POSTGRES_HOST", "db.internal"),
            ("MONITOR_POSTGRES_PORT", "5433"),
        ]);
        let mut doc = FleetDocument::default();
        apply_env_overrides_from(&mut doc, |k| vars.get(k).cloned());

        assert_eq!(doc.storage.backend.as_deref(), Some("postgres"));
        assert_eq!(doc.storage.postgres.host.as_deref(), Some("db.internal"));
        assert_eq!(doc.storage.postgres.port, Some(5433));
    }

    #[test]
    fn api_key_scoped_then_fallback() {
        let vars = env(&[("MONITOR_DEMO_CC_API_KEY", "fallback-key")]);
        let mut doc = FleetDocument {
            monitors: vec![MonitorSpec {
                provider: "demo".into(),
                service: "cc".into(),
                channel: "vip".into(),
                ..MonitorSpec::default()
            }],
            ..FleetDocument::default()
        };
        apply_env_overrides_from(&mut doc, |k| vars.get(k).cloned());
        assert_eq!(doc.monitors[0].api_key.as_deref(), Some("fallback-key"));

        let vars = env(&[
            ("MONITOR_DEMO_CC_API_KEY", "fallback-key"),
            ("MONITOR_DEMO_CC_VIP_API_KEY", "scoped-key"),
        ]);
        doc.monitors[0].api_key = None;
        apply_env_overrides_from(&mut doc, |k| vars.get(k).cloned());
        assert_eq!(doc.monitors[0].api_key.as_deref(), Some("scoped-key"));
    }

    #[test]
    fn explicit_env_var_name_wins() {
        let vars = env(&[
            ("MONITOR_DEMO_CC_VIP_API_KEY", "scoped-key"),
            ("MY_KEY", "explicit-key"),
        ]);
        let mut doc = FleetDocument {
            monitors: vec![MonitorSpec {
                provider: "demo".into(),
                service: "cc".into(),
                channel: "vip".into(),
                env_var_name: Some("MY_KEY".into()),
                ..MonitorSpec::default()
            }],
            ..FleetDocument::default()
        };
        apply_env_overrides_from(&mut doc, |k| vars.get(k).cloned());
        assert_eq!(doc.monitors[0].api_key.as_deref(), Some("explicit-key"));
    }

    #[test]
    fn segments_are_sanitized() {
        let vars = env(&[("MONITOR_MY_RELAY_CC_API_KEY", "k")]);
        let mut doc = FleetDocument {
            monitors: vec![MonitorSpec {
                provider: "my-relay".into(),
                service: "cc".into(),
                channel: "vip".into(),
                ..MonitorSpec::default()
            }],
            ..FleetDocument::default()
        };
        apply_env_overrides_from(&mut doc, |k| vars.get(k).cloned());
        // my-relay → MY_RELAY; scoped miss falls back to provider/service.
        assert_eq!(doc.monitors[0].api_key.as_deref(), Some("k"));
    }
}
