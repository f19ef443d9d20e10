//! Multi-model group combination.
//!
//! Layers of a group share the query window, so their bucket arrays have
//! identical boundaries and combine index-wise. The current group status
//! is different: layers probe on their own cadence and may trail each
//! other, so their latest observations are aligned by timestamp with a
//! tolerance before the worst-status rule applies; a layer with nothing
//! recent enough contributes MISSING.

use std::time::Duration;

use chrono::{DateTime, Utc};

use relaymon_core::{MISSING_AVAILABILITY, Status, TimelineBucket};

use crate::api::schemas::GroupBucket;

/// Alignment tolerance: half the median probe step, clamped to
/// `[10s, 120s]`.
#[must_use]
pub fn alignment_tolerance(median_step: Duration) -> Duration {
    (median_step / 2).clamp(Duration::from_secs(10), Duration::from_secs(120))
}

/// Median of the layers' probe intervals.
#[must_use]
pub fn median_interval(intervals: &[Duration]) -> Duration {
    if intervals.is_empty() {
        return Duration::from_secs(60);
    }
    let mut sorted = intervals.to_vec();
    sorted.sort_unstable();
    sorted[sorted.len() / 2]
}

/// Worst current status across layers, treating layers whose latest
/// observation trails the newest one by more than `tolerance` as MISSING.
#[must_use]
pub fn group_status(
    layers: &[(Option<DateTime<Utc>>, Status)],
    tolerance: Duration,
) -> Status {
    let Some(newest) = layers.iter().filter_map(|(at, _)| *at).max() else {
        return Status::Missing;
    };
    let tolerance = chrono::Duration::from_std(tolerance).unwrap_or(chrono::Duration::zero());
    let horizon = newest - tolerance;

    let mut worst = Status::Missing;
    for (at, status) in layers {
        let effective = match at {
            Some(at) if *at >= horizon => *status,
            _ => Status::Missing,
        };
        worst = worst.worst(effective);
    }
    worst
}

/// Point-wise combination of layer timelines: worst status and minimum
/// availability across the layers holding data at each index.
#[must_use]
pub fn group_timeline(layers: &[&[TimelineBucket]]) -> Vec<GroupBucket> {
    let len = layers.iter().map(|l| l.len()).max().unwrap_or(0);
    (0..len)
        .map(|idx| {
            let mut status = Status::Missing;
            let mut availability: Option<f64> = None;
            for layer in layers {
                let Some(bucket) = layer.get(idx) else {
                    continue;
                };
                if !bucket.has_data() {
                    continue;
                }
                status = status.worst(bucket.status);
                availability = Some(match availability {
                    Some(current) => current.min(bucket.availability),
                    None => bucket.availability,
                });
            }
            GroupBucket {
                status,
                availability: availability.unwrap_or(MISSING_AVAILABILITY),
            }
        })
        .collect()
}

/// Mean group availability over buckets with data, `-1` when none have.
#[must_use]
pub fn group_uptime(timeline: &[GroupBucket]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0u32;
    for bucket in timeline {
        if bucket.availability >= 0.0 {
            sum += bucket.availability;
            n += 1;
        }
    }
    if n == 0 { MISSING_AVAILABILITY } else { sum / f64::from(n) }
}
