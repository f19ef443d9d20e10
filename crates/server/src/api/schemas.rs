//! Wire types served by the status API.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use relaymon_core::{Board, Category, SponsorLevel, Status, SubStatus, TimelineBucket};

/// `GET /api/status` response body.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub meta: Meta,
    /// Single-layer monitors.
    pub data: Vec<MonitorView>,
    /// Multi-model groups.
    pub groups: Vec<GroupView>,
}

/// Global context the frontend needs alongside the monitor lists.
#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub slow_latency_ms: u64,
    pub enable_badges: bool,
    pub sponsor_pin: SponsorPinMeta,
    pub boards: BoardsMeta,
    /// Every monitor id in the fleet, for client-side favorites
    /// reconciliation.
    pub all_monitor_ids: Vec<String>,
    pub cache: CacheMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
}

/// Pinning configuration; the client applies it during its initial sort.
#[derive(Debug, Clone, Serialize)]
pub struct SponsorPinMeta {
    pub min_level: SponsorLevel,
    pub min_uptime: f64,
    pub service_count: HashMap<String, u32>,
    pub max_pinned: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardsMeta {
    pub enabled: bool,
}

/// Cache directives echoed so clients can align their refresh cadence.
#[derive(Debug, Clone, Serialize)]
pub struct CacheMeta {
    pub period: String,
    pub ttl_seconds: u64,
}

/// One single-layer monitor as served to the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorView {
    pub id: String,
    pub provider: String,
    pub slug: String,
    pub service: String,
    pub channel: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_display_name: Option<String>,

    /// Latest observation's status, MISSING when nothing was recorded yet.
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_status: Option<SubStatus>,
    pub latency_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,

    /// Mean availability over the non-empty timeline buckets; `-1` when
    /// no bucket holds data.
    pub uptime: f64,
    pub timeline: Vec<TimelineBucket>,

    pub board: Board,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub badges: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor: Option<String>,
    pub sponsor_level: SponsorLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listed_since: Option<NaiveDate>,
    /// Only surfaced on `include_hidden` queries.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

/// One layer of a multi-model group.
#[derive(Debug, Clone, Serialize)]
pub struct LayerView {
    pub model: String,
    /// 0 for the group root, declaration order for children.
    pub layer_order: usize,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_status: Option<SubStatus>,
    pub latency_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    pub uptime: f64,
    pub timeline: Vec<TimelineBucket>,
}

/// Point-wise combination of the layers of a group.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GroupBucket {
    pub status: Status,
    /// Minimum availability across layers with data; `-1` when none have.
    pub availability: f64,
}

/// One multi-model group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    /// `slug/service/channel`.
    pub id: String,
    pub provider: String,
    pub slug: String,
    pub service: String,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_display_name: Option<String>,

    /// Worst current status across live layers.
    pub status: Status,
    pub uptime: f64,
    pub timeline: Vec<GroupBucket>,
    pub layers: Vec<LayerView>,

    pub board: Board,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub badges: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor: Option<String>,
    pub sponsor_level: SponsorLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}
