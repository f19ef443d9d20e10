use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observation::Status;

/// Availability value served for buckets with no observations.
pub const MISSING_AVAILABILITY: f64 = -1.0;

/// Canonical query window for status aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[default]
    #[serde(rename = "90m")]
    Min90,
    #[serde(rename = "24h")]
    Hour24,
    #[serde(rename = "7d")]
    Day7,
    #[serde(rename = "30d")]
    Day30,
}

impl Period {
    /// All periods, in ascending window order.
    pub const ALL: [Self; 4] = [Self::Min90, Self::Hour24, Self::Day7, Self::Day30];

    /// Window length covered by the period.
    #[must_use]
    pub fn window(self) -> Duration {
        match self {
            Self::Min90 => Duration::from_secs(90 * 60),
            Self::Hour24 => Duration::from_secs(24 * 60 * 60),
            Self::Day7 => Duration::from_secs(7 * 24 * 60 * 60),
            Self::Day30 => Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    /// Number of timeline buckets the window is divided into.
    #[must_use]
    pub fn buckets(self) -> usize {
        match self {
            Self::Min90 => 45,
            Self::Hour24 => 48,
            Self::Day7 => 84,
            Self::Day30 => 60,
        }
    }

    /// Wire form of the period.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min90 => "90m",
            Self::Hour24 => "24h",
            Self::Day7 => "7d",
            Self::Day30 => "30d",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "90m" => Ok(Self::Min90),
            "24h" => Ok(Self::Hour24),
            "7d" => Ok(Self::Day7),
            "30d" => Ok(Self::Day30),
            other => Err(format!("unknown period: {other}")),
        }
    }
}

/// One equal-width slice of an aggregated timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineBucket {
    /// Representative status: the worst observation in the bucket by
    /// severity, or [`Status::Missing`] when the bucket is empty.
    pub status: Status,
    /// Availability percent in `[0, 100]`, weighted by `degraded_weight`
    /// for DEGRADED observations; [`MISSING_AVAILABILITY`] when empty.
    pub availability: f64,
    /// Maximum observed latency in the bucket, ms. Zero when empty.
    pub latency_max_ms: i64,
    /// Number of observations that fell into the bucket.
    pub count: u64,
    /// Observation counts per sub-status wire string.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub breakdown: HashMap<String, u64>,
}

impl TimelineBucket {
    /// An empty bucket: MISSING status and `-1` availability.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            status: Status::Missing,
            availability: MISSING_AVAILABILITY,
            latency_max_ms: 0,
            count: 0,
            breakdown: HashMap::new(),
        }
    }

    /// Whether the bucket holds any observations.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

impl Default for TimelineBucket {
    fn default() -> Self {
        Self::empty()
    }
}

/// Mean availability over the buckets that hold data, or
/// [`MISSING_AVAILABILITY`] when none do.
#[must_use]
pub fn uptime_percent(buckets: &[TimelineBucket]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0u32;
    for bucket in buckets.iter().filter(|b| b.has_data()) {
        sum += bucket.availability;
        n += 1;
    }
    if n == 0 {
        MISSING_AVAILABILITY
    } else {
        sum / f64::from(n)
    }
}
