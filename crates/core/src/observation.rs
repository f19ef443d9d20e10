use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::MonitorKey;

/// Maximum number of bytes retained from a probe response body.
pub const SNIPPET_MAX_BYTES: usize = 512;

/// Coarse availability status of one probe outcome.
///
/// The wire representation is the integer code, matching what the frontend
/// and the store schema expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum Status {
    /// Probe failed (transport error, non-2xx, or content mismatch).
    Unavailable,
    /// Probe succeeded within the latency budget.
    Available,
    /// Probe succeeded but exceeded `slow_latency`.
    Degraded,
    /// No observation exists for the queried point in time.
    Missing,
    /// The target exists but has no probe configuration.
    NotConfigured,
}

impl Status {
    /// Integer code stored and served for this status.
    #[must_use]
    pub fn code(self) -> i16 {
        match self {
            Self::Unavailable => 0,
            Self::Available => 1,
            Self::Degraded => 2,
            Self::Missing => -1,
            Self::NotConfigured => 3,
        }
    }

    /// Severity used when picking a bucket's representative status:
    /// `UNAVAILABLE > DEGRADED > AVAILABLE > MISSING / NOT_CONFIGURED`.
    #[must_use]
    pub fn severity(self) -> u8 {
        match self {
            Self::Unavailable => 3,
            Self::Degraded => 2,
            Self::Available => 1,
            Self::Missing | Self::NotConfigured => 0,
        }
    }

    /// The more severe of two statuses.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl From<Status> for i16 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl TryFrom<i16> for Status {
    type Error = String;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Unavailable),
            1 => Ok(Self::Available),
            2 => Ok(Self::Degraded),
            -1 => Ok(Self::Missing),
            3 => Ok(Self::NotConfigured),
            other => Err(format!("unknown status code: {other}")),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unavailable => "unavailable",
            Self::Available => "available",
            Self::Degraded => "degraded",
            Self::Missing => "missing",
            Self::NotConfigured => "not_configured",
        };
        f.write_str(s)
    }
}

/// Authoritative reason code for a probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStatus {
    Ok,
    SlowLatency,
    RateLimit,
    ServerError,
    ClientError,
    AuthError,
    InvalidRequest,
    NetworkError,
    ContentMismatch,
}

impl SubStatus {
    /// Return the wire string for this sub-status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::SlowLatency => "slow_latency",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::AuthError => "auth_error",
            Self::InvalidRequest => "invalid_request",
            Self::NetworkError => "network_error",
            Self::ContentMismatch => "content_mismatch",
        }
    }
}

impl std::fmt::Display for SubStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "slow_latency" => Ok(Self::SlowLatency),
            "rate_limit" => Ok(Self::RateLimit),
            "server_error" => Ok(Self::ServerError),
            "client_error" => Ok(Self::ClientError),
            "auth_error" => Ok(Self::AuthError),
            "invalid_request" => Ok(Self::InvalidRequest),
            "network_error" => Ok(Self::NetworkError),
            "content_mismatch" => Ok(Self::ContentMismatch),
            other => Err(format!("unknown sub-status: {other}")),
        }
    }
}

/// One probe outcome, immutable once written to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Target this observation belongs to.
    pub key: MonitorKey,
    /// Wall-clock completion time of the probe.
    pub timestamp: DateTime<Utc>,
    /// Coarse availability status.
    pub status: Status,
    /// Authoritative reason code.
    pub sub_status: SubStatus,
    /// HTTP status code, when a response was received.
    #[serde(default)]
    pub http_status: Option<u16>,
    /// Round-trip latency in milliseconds.
    pub latency_ms: i64,
    /// Truncated response body, kept for diagnosis of content mismatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_snippet: Option<String>,
    /// Error message for transport-level failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Observation {
    /// Create an observation stamped with the current time.
    #[must_use]
    pub fn new(key: MonitorKey, status: Status, sub_status: SubStatus, latency_ms: i64) -> Self {
        Self {
            key,
            timestamp: Utc::now(),
            status,
            sub_status,
            http_status: None,
            latency_ms,
            body_snippet: None,
            error: None,
        }
    }

    /// Attach a response snippet, truncating to [`SNIPPET_MAX_BYTES`] on a
    /// char boundary.
    #[must_use]
    pub fn with_snippet(mut self, body: &str) -> Self {
        self.body_snippet = Some(truncate_snippet(body));
        self
    }
}

/// Truncate a response body to [`SNIPPET_MAX_BYTES`], respecting UTF-8
/// boundaries.
#[must_use]
pub fn truncate_snippet(body: &str) -> String {
    if body.len() <= SNIPPET_MAX_BYTES {
        return body.to_owned();
    }
    let mut end = SNIPPET_MAX_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_owned()
}
