//! Shared bucket aggregation.
//!
//! Both backends reduce raw observations through this module (the
//! PostgreSQL SQL-side path must agree with it; the cross-check lives in
//! that backend's tests), so the bucketing rule is written exactly once.

use chrono::{DateTime, Timelike, Utc};

use relaymon_core::{Observation, Status, TimelineBucket};

/// Daily time window `HH:MM-HH:MM` restricting observations before
/// bucketing. A window whose end precedes its start wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFilter {
    /// Minutes since midnight, inclusive.
    pub start_minute: u16,
    /// Minutes since midnight, inclusive.
    pub end_minute: u16,
}

impl TimeFilter {
    /// Parse `"HH:MM-HH:MM"`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("time_filter {s:?} must be HH:MM-HH:MM"))?;
        Ok(Self {
            start_minute: parse_hhmm(start)?,
            end_minute: parse_hhmm(end)?,
        })
    }

    /// Whether a timestamp's UTC time of day falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let minute = u16::try_from(at.hour() * 60 + at.minute()).unwrap_or(u16::MAX);
        if self.start_minute <= self.end_minute {
            (self.start_minute..=self.end_minute).contains(&minute)
        } else {
            minute >= self.start_minute || minute <= self.end_minute
        }
    }
}

fn parse_hhmm(s: &str) -> Result<u16, String> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| format!("time {s:?} must be HH:MM"))?;
    let h: u16 = h.parse().map_err(|_| format!("bad hour in {s:?}"))?;
    let m: u16 = m.parse().map_err(|_| format!("bad minute in {s:?}"))?;
    if h > 23 || m > 59 {
        return Err(format!("time {s:?} out of range"));
    }
    Ok(h * 60 + m)
}

/// Parameters of one timeline aggregation.
#[derive(Debug, Clone)]
pub struct TimelineQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub buckets: usize,
    /// Weight applied to DEGRADED observations in availability.
    pub degraded_weight: f64,
    /// Optional daily window applied before bucketing.
    pub time_filter: Option<TimeFilter>,
}

impl TimelineQuery {
    /// Index of the bucket a timestamp falls into, or `None` when outside
    /// `[start, end]`.
    #[must_use]
    pub fn bucket_index(&self, at: DateTime<Utc>) -> Option<usize> {
        if at < self.start || at > self.end || self.buckets == 0 {
            return None;
        }
        let window_ms = (self.end - self.start).num_milliseconds();
        if window_ms <= 0 {
            return None;
        }
        let offset_ms = (at - self.start).num_milliseconds();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = ((offset_ms as f64) / (window_ms as f64) * self.buckets as f64).floor() as usize;
        // `at == end` lands exactly on `buckets`; clamp into the last one.
        Some(idx.min(self.buckets - 1))
    }
}

/// Reduce observations into the fixed-length bucket array.
///
/// Per bucket: representative status is the worst by severity, latency is
/// the maximum, availability weights DEGRADED by `degraded_weight`, and
/// empty buckets stay MISSING with availability `-1`.
#[must_use]
pub fn aggregate(observations: &[Observation], query: &TimelineQuery) -> Vec<TimelineBucket> {
    let mut buckets = vec![TimelineBucket::empty(); query.buckets];
    let mut available = vec![0u64; query.buckets];
    let mut degraded = vec![0u64; query.buckets];

    for obs in observations {
        if let Some(filter) = query.time_filter
            && !filter.contains(obs.timestamp)
        {
            continue;
        }
        let Some(idx) = query.bucket_index(obs.timestamp) else {
            continue;
        };
        let bucket = &mut buckets[idx];
        bucket.status = if bucket.has_data() {
            bucket.status.worst(obs.status)
        } else {
            obs.status
        };
        bucket.latency_max_ms = bucket.latency_max_ms.max(obs.latency_ms);
        bucket.count += 1;
        *bucket
            .breakdown
            .entry(obs.sub_status.as_str().to_owned())
            .or_insert(0) += 1;
        match obs.status {
            Status::Available => available[idx] += 1,
            Status::Degraded => degraded[idx] += 1,
            _ => {}
        }
    }

    for (idx, bucket) in buckets.iter_mut().enumerate() {
        if bucket.count > 0 {
            #[allow(clippy::cast_precision_loss)]
            let availability = (available[idx] as f64).mul_add(
                100.0,
                degraded[idx] as f64 * 100.0 * query.degraded_weight,
            ) / bucket.count as f64;
            bucket.availability = availability;
        }
    }

    buckets
}
