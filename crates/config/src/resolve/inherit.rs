//! Inheritance pass: copy unset fields from group parents into children,
//! then apply post-inheritance fixups.

use crate::document::{FleetDocument, MonitorSpec};
use crate::duration::parse_duration;
use crate::error::ConfigError;
use crate::resolve::validate::ParentIndex;

/// Run the inheritance pass.
///
/// For each child, every unset field is copied from the root of its parent
/// triple. `model` is never inherited. Duration strings copied from the
/// parent are re-parsed so no monitor leaves the resolver with an unparsed
/// duration, and the retry window is re-verified afterwards.
pub fn inherit(
    doc: &mut FleetDocument,
    index: &ParentIndex,
    warnings: &mut Vec<String>,
) -> Result<(), ConfigError> {
    for i in 0..doc.monitors.len() {
        let Some(parent_triple) = doc.monitors[i].parent.clone() else {
            continue;
        };
        let Some(root) = index.root_of(&parent_triple) else {
            continue;
        };
        if root == i {
            continue;
        }
        let parent = doc.monitors[root].clone();
        copy_unset(&mut doc.monitors[i], &parent);
        reparse_durations(&mut doc.monitors[i])?;
    }

    for i in 0..doc.monitors.len() {
        // Retry window sanity after inheritance mixed child and parent
        // values.
        let monitor = &doc.monitors[i];
        if let (Some(base), Some(max)) = (
            monitor.retry_base_delay_duration,
            monitor.retry_max_delay_duration,
        ) && max < base
        {
            return Err(ConfigError::RetryDelayInverted {
                monitor: monitor.display_key(),
            });
        }

        // Post-inheritance fixups.
        let monitor = &mut doc.monitors[i];
        monitor.board.get_or_insert_with(|| "hot".into());
        if monitor.board.as_deref() != Some("cold") {
            monitor.cold_reason = None;
        }

        // Badge resolution: empty sets take the provider-level badges, and
        // anything without a definition is dropped with a warning.
        if monitor.badges.is_empty()
            && let Some(provider_badges) = doc.badge_providers.get(&monitor.provider)
        {
            monitor.badges = provider_badges.clone();
        }
        let monitor = &mut doc.monitors[i];
        let before = monitor.badges.len();
        let kept: Vec<String> = monitor
            .badges
            .iter()
            .filter(|b| doc.badge_definitions.contains_key(*b))
            .cloned()
            .collect();
        if kept.len() != before {
            warnings.push(format!(
                "{}: dropped {} undefined badge(s)",
                monitor.display_key(),
                before - kept.len()
            ));
        }
        monitor.badges = kept;
    }

    Ok(())
}

fn copy_unset(child: &mut MonitorSpec, parent: &MonitorSpec) {
    // Core probe behavior.
    copy_opt(&mut child.api_key, &parent.api_key);
    copy_opt(&mut child.url, &parent.url);
    copy_opt(&mut child.method, &parent.method);
    copy_opt(&mut child.body, &parent.body);
    copy_opt(&mut child.body_template, &parent.body_template);
    copy_opt(&mut child.success_contains, &parent.success_contains);
    copy_opt(&mut child.env_var_name, &parent.env_var_name);
    copy_opt(&mut child.proxy, &parent.proxy);
    // Headers merge: parent entries fill in around child overrides.
    for (k, v) in &parent.headers {
        child
            .headers
            .entry(k.clone())
            .or_insert_with(|| v.clone());
    }

    // Timings.
    copy_timing(
        &mut child.slow_latency,
        &mut child.slow_latency_duration,
        &parent.slow_latency,
        parent.slow_latency_duration,
    );
    copy_timing(
        &mut child.timeout,
        &mut child.timeout_duration,
        &parent.timeout,
        parent.timeout_duration,
    );
    copy_timing(
        &mut child.interval,
        &mut child.interval_duration,
        &parent.interval,
        parent.interval_duration,
    );

    // Retry policy.
    copy_opt(&mut child.retry, &parent.retry);
    copy_timing(
        &mut child.retry_base_delay,
        &mut child.retry_base_delay_duration,
        &parent.retry_base_delay,
        parent.retry_base_delay_duration,
    );
    copy_timing(
        &mut child.retry_max_delay,
        &mut child.retry_max_delay_duration,
        &parent.retry_max_delay,
        parent.retry_max_delay_duration,
    );
    copy_opt(&mut child.retry_jitter, &parent.retry_jitter);

    // Metadata.
    copy_opt(&mut child.category, &parent.category);
    copy_opt(&mut child.sponsor, &parent.sponsor);
    copy_opt(&mut child.sponsor_level, &parent.sponsor_level);
    if child.provider_metadata.is_empty() {
        child.provider_metadata = parent.provider_metadata.clone();
    }

    // Board and cold reason.
    copy_opt(&mut child.board, &parent.board);
    copy_opt(&mut child.cold_reason, &parent.cold_reason);

    // Disabled / hidden OR-cascade with reason fallthrough.
    if parent.disabled == Some(true) && child.disabled != Some(true) {
        child.disabled = Some(true);
        if child.disabled_reason.is_none() {
            child.disabled_reason = parent.disabled_reason.clone();
        }
    }
    if parent.hidden == Some(true) && child.hidden != Some(true) {
        child.hidden = Some(true);
        if child.hidden_reason.is_none() {
            child.hidden_reason = parent.hidden_reason.clone();
        }
    }

    // Badges replace only an empty child set.
    if child.badges.is_empty() {
        child.badges = parent.badges.clone();
    }

    // Display names, pricing, listing date.
    copy_opt(&mut child.display_name, &parent.display_name);
    copy_opt(
        &mut child.provider_display_name,
        &parent.provider_display_name,
    );
    copy_opt(&mut child.price_min, &parent.price_min);
    copy_opt(&mut child.price_max, &parent.price_max);
    copy_opt(&mut child.listed_since, &parent.listed_since);

    // `model` is deliberately not inherited.
}

fn copy_opt<T: Clone>(child: &mut Option<T>, parent: &Option<T>) {
    if child.is_none() {
        child.clone_from(parent);
    }
}

/// Copy a duration string together with its parsed shadow. When the parent
/// only had the string (not yet parsed), the shadow is left `None` and
/// [`reparse_durations`] fills it.
fn copy_timing(
    child_raw: &mut Option<String>,
    child_parsed: &mut Option<std::time::Duration>,
    parent_raw: &Option<String>,
    parent_parsed: Option<std::time::Duration>,
) {
    if child_raw.is_none() && child_parsed.is_none() {
        child_raw.clone_from(parent_raw);
        *child_parsed = parent_parsed;
    }
}

/// Re-parse any duration string without a parsed shadow.
fn reparse_durations(monitor: &mut MonitorSpec) -> Result<(), ConfigError> {
    let key = monitor.display_key();
    for (field, raw, slot) in [
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
        if slot.is_none()
            && let Some(raw) = raw
        {
            *slot = Some(parse_duration(&raw).map_err(|_| ConfigError::InvalidDuration {
                monitor: key.clone(),
                field,
                value: raw,
            })?);
        }
    }
    Ok(())
}
