//! Snapshot computation: one status query in, one frontend-ready response
//! out.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Timelike, Utc};
use futures::StreamExt;

use relaymon_config::ResolvedConfig;
use relaymon_core::{
    Monitor, MonitorKey, Observation, Period, Status, TimelineBucket, uptime_percent,
};
use relaymon_store::bucket::{TimeFilter, TimelineQuery};
use relaymon_store::ObservationStore;

use crate::aggregate::fingerprint::{BoardFilter, Fingerprint};
use crate::aggregate::group::{
    alignment_tolerance, group_status, group_timeline, group_uptime, median_interval,
};
use crate::aggregate::sponsor::{PinCandidate, compute_pins};
use crate::api::schemas::{
    BoardsMeta, CacheMeta, GroupView, LayerView, Meta, MonitorView, SponsorPinMeta,
    StatusResponse,
};
use crate::error::ServerError;

/// Validated parameters of one status query.
#[derive(Debug, Clone)]
pub struct StatusParams {
    pub period: Period,
    pub align_hour: bool,
    pub time_filter_raw: Option<String>,
    pub time_filter: Option<TimeFilter>,
    pub board: BoardFilter,
    pub include_hidden: bool,
}

impl StatusParams {
    /// The cache identity of this query.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            period: self.period,
            align_hour: self.align_hour,
            time_filter: self.time_filter_raw.clone(),
            board: self.board,
            include_hidden: self.include_hidden,
        }
    }
}

/// Compute the full status response for one query.
#[allow(clippy::too_many_lines)]
pub async fn compute_snapshot(
    config: &ResolvedConfig,
    store: &dyn ObservationStore,
    params: &StatusParams,
) -> Result<StatusResponse, ServerError> {
    let end = window_end(params);
    let start = end
        - chrono::Duration::from_std(params.period.window())
            .unwrap_or_else(|_| chrono::Duration::hours(24));
    let query = TimelineQuery {
        start,
        end,
        buckets: params.period.buckets(),
        degraded_weight: config.degraded_weight,
        time_filter: params.time_filter,
    };

    // Visibility: disabled monitors are excluded everywhere, hidden ones
    // only surface on explicit request, and the board filter applies only
    // while the boards feature is on.
    let visible: Vec<&Monitor> = config
        .monitors
        .iter()
        .filter(|m| !m.disabled)
        .filter(|m| params.include_hidden || !m.hidden)
        .filter(|m| !config.boards_enabled || params.board.matches(m.board))
        .collect();

    let keys: Vec<MonitorKey> = visible.iter().map(|m| m.key.clone()).collect();
    let latest = store.latest(&keys).await?;
    let timelines = fetch_timelines(config, store, &keys, &query).await?;

    // Multi-model groups: a root (non-empty model, no parent) plus the
    // children referencing its triple, in declaration order.
    let roots: Vec<&Monitor> = visible
        .iter()
        .copied()
        .filter(|m| {
            m.parent.is_none()
                && !m.key.model.is_empty()
                && visible
                    .iter()
                    .any(|c| c.parent.as_deref() == Some(m.key.channel_key().as_str()))
        })
        .collect();
    let mut grouped: HashSet<MonitorKey> = HashSet::new();
    let mut groups = Vec::new();
    for root in roots {
        let triple = root.key.channel_key();
        let mut members: Vec<&Monitor> = vec![root];
        members.extend(
            visible
                .iter()
                .copied()
                .filter(|m| m.parent.as_deref() == Some(triple.as_str())),
        );
        members[1..].sort_by_key(|m| m.order);
        for member in &members {
            grouped.insert(member.key.clone());
        }
        groups.push(build_group(config, &members, &latest, &timelines));
    }

    let mask = |m: &Monitor| {
        !config.expose_channel_details
            && !config
                .channel_details_providers
                .iter()
                .any(|p| p == &m.key.provider)
    };

    let mut data: Vec<MonitorView> = visible
        .iter()
        .copied()
        .filter(|m| !grouped.contains(&m.key))
        .map(|m| {
            build_view(
                m,
                latest.get(&m.key),
                timelines.get(&m.key).cloned().unwrap_or_default(),
                mask(m),
            )
        })
        .collect();

    // Server-side initial sort: pinned monitors and groups first, in pin
    // order, then fleet declaration order.
    let candidates: Vec<PinCandidate> = data
        .iter()
        .map(|view| PinCandidate {
            id: view.id.clone(),
            sponsor: view.sponsor.clone(),
            level: view.sponsor_level,
            uptime: view.uptime,
            board: view.board,
        })
        .chain(groups.iter().map(|g| PinCandidate {
            id: g.id.clone(),
            sponsor: g.sponsor.clone(),
            level: g.sponsor_level,
            uptime: g.uptime,
            board: g.board,
        }))
        .collect();
    let pins = compute_pins(&candidates, &config.sponsor_pin);
    let rank = |id: &str| pins.iter().position(|p| p == id).unwrap_or(usize::MAX);
    data.sort_by_key(|v| rank(&v.id));
    groups.sort_by_key(|g| rank(&g.id));

    let all_monitor_ids: Vec<String> = config
        .monitors
        .iter()
        .filter(|m| !m.disabled)
        .map(Monitor::id)
        .collect();

    let ttl = config.cache_ttl.for_period(params.period);
    Ok(StatusResponse {
        meta: Meta {
            slow_latency_ms: u64::try_from(config.default_slow_latency.as_millis())
                .unwrap_or(u64::MAX),
            enable_badges: config.enable_badges,
            sponsor_pin: SponsorPinMeta {
                min_level: config.sponsor_pin.min_level,
                min_uptime: config.sponsor_pin.min_uptime,
                service_count: config.sponsor_pin.service_count.clone(),
                max_pinned: config.sponsor_pin.max_pinned,
            },
            boards: BoardsMeta {
                enabled: config.boards_enabled,
            },
            all_monitor_ids,
            cache: CacheMeta {
                period: params.period.to_string(),
                ttl_seconds: ttl.as_secs(),
            },
            public_base_url: config.public_base_url.clone(),
        },
        data,
        groups,
    })
}

fn window_end(params: &StatusParams) -> DateTime<Utc> {
    let now = Utc::now();
    if params.period == Period::Hour24 && params.align_hour {
        // Snap to the most recent hour boundary so every request within
        // the hour shares a window.
        now.with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now)
    } else {
        now
    }
}

async fn fetch_timelines(
    config: &ResolvedConfig,
    store: &dyn ObservationStore,
    keys: &[MonitorKey],
    query: &TimelineQuery,
) -> Result<HashMap<MonitorKey, Vec<TimelineBucket>>, ServerError> {
    if !config.enable_concurrent_query {
        return Ok(store.timeline_batch(keys, query).await?);
    }

    // Concurrent query mode: per-key histories fan out with bounded
    // parallelism, trading statement width for pool usage.
    let limit = config.concurrent_query_limit.max(1);
    let mut out = HashMap::with_capacity(keys.len());
    let mut stream = futures::stream::iter(keys.iter().cloned().map(|key| async move {
        let history = store.history(&key, query.start, query.end).await;
        (key, history)
    }))
    .buffer_unordered(limit);
    while let Some((key, history)) = stream.next().await {
        let history = history?;
        out.insert(key, relaymon_store::aggregate(&history, query));
    }
    Ok(out)
}

fn build_view(
    monitor: &Monitor,
    latest: Option<&Observation>,
    timeline: Vec<TimelineBucket>,
    mask_channel: bool,
) -> MonitorView {
    let uptime = uptime_percent(&timeline);
    MonitorView {
        id: monitor.id(),
        provider: monitor.key.provider.clone(),
        slug: monitor.slug.clone(),
        service: monitor.key.service.clone(),
        channel: if mask_channel {
            String::new()
        } else {
            monitor.key.channel.clone()
        },
        model: monitor.key.model.clone(),
        display_name: monitor.display_name.clone(),
        provider_display_name: monitor.provider_display_name.clone(),
        status: latest.map_or(Status::Missing, |o| o.status),
        sub_status: latest.map(|o| o.sub_status),
        latency_ms: latest.map_or(0, |o| o.latency_ms),
        last_checked: latest.map(|o| o.timestamp),
        uptime,
        timeline,
        board: monitor.board,
        badges: monitor.badges.clone(),
        sponsor: monitor.sponsor.clone(),
        sponsor_level: monitor.sponsor_level,
        category: monitor.category,
        risk: monitor.risk.clone(),
        price_min: monitor.price_min,
        price_max: monitor.price_max,
        listed_since: monitor.listed_since,
        hidden: monitor.hidden,
    }
}

fn build_group(
    config: &ResolvedConfig,
    members: &[&Monitor],
    latest: &HashMap<MonitorKey, Observation>,
    timelines: &HashMap<MonitorKey, Vec<TimelineBucket>>,
) -> GroupView {
    let root = members[0];
    let mask = !config.expose_channel_details
        && !config
            .channel_details_providers
            .iter()
            .any(|p| p == &root.key.provider);

    let layers: Vec<LayerView> = members
        .iter()
        .enumerate()
        .map(|(layer_order, m)| {
            let obs = latest.get(&m.key);
            let timeline = timelines.get(&m.key).cloned().unwrap_or_default();
            LayerView {
                model: m.key.model.clone(),
                layer_order,
                status: obs.map_or(Status::Missing, |o| o.status),
                sub_status: obs.map(|o| o.sub_status),
                latency_ms: obs.map_or(0, |o| o.latency_ms),
                last_checked: obs.map(|o| o.timestamp),
                uptime: uptime_percent(&timeline),
                timeline,
            }
        })
        .collect();

    let tolerance = alignment_tolerance(median_interval(
        &members.iter().map(|m| m.interval).collect::<Vec<_>>(),
    ));
    let status = group_status(
        &layers
            .iter()
            .map(|l| (l.last_checked, l.status))
            .collect::<Vec<_>>(),
        tolerance,
    );

    let timeline = group_timeline(
        &layers
            .iter()
            .map(|l| l.timeline.as_slice())
            .collect::<Vec<_>>(),
    );
    let uptime = group_uptime(&timeline);

    GroupView {
        id: format!("{}/{}/{}", root.slug, root.key.service, root.key.channel),
        provider: root.key.provider.clone(),
        slug: root.slug.clone(),
        service: root.key.service.clone(),
        channel: if mask {
            String::new()
        } else {
            root.key.channel.clone()
        },
        display_name: root.display_name.clone(),
        provider_display_name: root.provider_display_name.clone(),
        status,
        uptime,
        timeline,
        layers,
        board: root.board,
        badges: root.badges.clone(),
        sponsor: root.sponsor.clone(),
        sponsor_level: root.sponsor_level,
        category: root.category,
        risk: root.risk.clone(),
        hidden: root.hidden,
    }
}
