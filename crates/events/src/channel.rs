//! Channel-level aggregation of model states.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use relaymon_core::{FsmState, Status, TransitionKind};
use relaymon_config::ChannelStrategy;

/// Aggregated state for one `(provider, service, channel)` triple.
///
/// Each model contributes its most recent observation verdict; the channel
/// goes DOWN when enough models are down at once and recovers only when
/// none are.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelState {
    pub state: FsmState,
    /// Model → currently down. MISSING / NOT_CONFIGURED observations do
    /// not change a model's entry.
    models: HashMap<String, bool>,
    /// Maintained incrementally; always recomputable from `models`.
    down_count: usize,
    pub last_transition: Option<DateTime<Utc>>,
}

impl ChannelState {
    /// Number of models currently down.
    #[must_use]
    pub fn down_models(&self) -> usize {
        self.down_count
    }

    /// Number of models the channel has seen.
    #[must_use]
    pub fn known_models(&self) -> usize {
        self.models.len()
    }

    /// Feed one model-level observation through the channel aggregator.
    pub fn apply(
        &mut self,
        model: &str,
        status: Status,
        down_threshold: u32,
        strategy: ChannelStrategy,
    ) -> Option<TransitionKind> {
        let is_down = match status {
            Status::Unavailable => true,
            Status::Available | Status::Degraded => false,
            Status::Missing | Status::NotConfigured => return None,
        };

        let previous = self.models.insert(model.to_owned(), is_down);
        match strategy {
            ChannelStrategy::Recompute => {
                // Stable under model-set churn: rescan instead of trusting
                // the running counter.
                self.down_count = self.models.values().filter(|down| **down).count();
            }
            ChannelStrategy::Incremental => match (previous, is_down) {
                (Some(false) | None, true) => self.down_count += 1,
                (Some(true), false) => self.down_count = self.down_count.saturating_sub(1),
                _ => {}
            },
        }

        let threshold = usize::try_from(down_threshold).unwrap_or(usize::MAX);
        if self.state == FsmState::Up && self.down_count >= threshold.max(1) {
            self.state = FsmState::Down;
            self.last_transition = Some(Utc::now());
            return Some(TransitionKind::Down);
        }
        if self.state == FsmState::Down && self.down_count == 0 {
            self.state = FsmState::Up;
            self.last_transition = Some(Utc::now());
            return Some(TransitionKind::Up);
        }
        None
    }

    /// Drop models that are no longer part of the fleet. Used when a
    /// config reload removes layers, so a vanished model cannot hold the
    /// channel DOWN forever.
    pub fn retain_models(&mut self, keep: impl Fn(&str) -> bool) {
        self.models.retain(|model, _| keep(model));
        self.down_count = self.models.values().filter(|down| **down).count();
    }
}
