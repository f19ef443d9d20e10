use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observation::SubStatus;

/// User-visible state of a monitored key in the event state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsmState {
    #[default]
    Up,
    Down,
}

impl std::fmt::Display for FsmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// Direction of an emitted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Down,
    Up,
}

/// A DOWN/UP transition emitted by the event state machine.
///
/// Each event is the unique transition at its sequence point: observations
/// that do not flip the state emit nothing, so consumers never see two
/// consecutive events of the same kind for one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// Canonical monitor key (model mode) or channel triple (channel mode).
    pub key: String,
    /// Transition direction.
    pub kind: TransitionKind,
    /// State before the transition.
    pub previous_state: FsmState,
    /// Consecutive-down counter at the transition point.
    pub consecutive_down: u32,
    /// Consecutive-up counter at the transition point.
    pub consecutive_up: u32,
    /// Sub-status of the observation that triggered the transition, when
    /// the transition was observation-driven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_status: Option<SubStatus>,
    /// When the transition occurred.
    pub at: DateTime<Utc>,
}

impl TransitionEvent {
    /// Create a transition event stamped with a fresh id and the current
    /// time.
    #[must_use]
    pub fn new(key: impl Into<String>, kind: TransitionKind, previous_state: FsmState) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            kind,
            previous_state,
            consecutive_down: 0,
            consecutive_up: 0,
            sub_status: None,
            at: Utc::now(),
        }
    }
}
