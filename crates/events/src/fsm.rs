//! Per-key DOWN/UP debouncer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use relaymon_core::{FsmState, Status, TransitionKind};

/// Mutable state tracked for one monitored key.
///
/// Updated by a single writer under the key's lock; readers receive
/// clones.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyState {
    pub state: FsmState,
    pub consecutive_down: u32,
    pub consecutive_up: u32,
    pub last_transition: Option<DateTime<Utc>>,
}

impl KeyState {
    /// Feed one observation status through the debouncer.
    ///
    /// Returns the transition this observation caused, if any. MISSING and
    /// NOT_CONFIGURED observations leave the state untouched.
    pub fn apply(
        &mut self,
        status: Status,
        down_threshold: u32,
        up_threshold: u32,
    ) -> Option<TransitionKind> {
        match status {
            Status::Unavailable => {
                self.consecutive_up = 0;
                self.consecutive_down = self.consecutive_down.saturating_add(1);
                if self.state == FsmState::Up && self.consecutive_down >= down_threshold {
                    self.state = FsmState::Down;
                    self.last_transition = Some(Utc::now());
                    return Some(TransitionKind::Down);
                }
                None
            }
            Status::Available | Status::Degraded => {
                self.consecutive_down = 0;
                self.consecutive_up = self.consecutive_up.saturating_add(1);
                if self.state == FsmState::Down && self.consecutive_up >= up_threshold {
                    self.state = FsmState::Up;
                    self.last_transition = Some(Utc::now());
                    return Some(TransitionKind::Up);
                }
                None
            }
            Status::Missing | Status::NotConfigured => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(states: &[Status], down: u32, up: u32) -> Vec<TransitionKind> {
        let mut key_state = KeyState::default();
        states
            .iter()
            .filter_map(|s| key_state.apply(*s, down, up))
            .collect()
    }

    #[test]
    fn down_after_threshold_up_after_recovery() {
        // Thresholds (2, 1): [U, U, A] emits down then up.
        let transitions = feed(
            &[Status::Unavailable, Status::Unavailable, Status::Available],
            2,
            1,
        );
        assert_eq!(transitions, vec![TransitionKind::Down, TransitionKind::Up]);
    }

    #[test]
    fn single_failure_below_threshold_is_silent() {
        let transitions = feed(&[Status::Unavailable, Status::Available], 2, 1);
        assert!(transitions.is_empty());
    }

    #[test]
    fn degraded_counts_as_up() {
        let transitions = feed(
            &[
                Status::Unavailable,
                Status::Unavailable,
                Status::Degraded,
            ],
            2,
            1,
        );
        assert_eq!(transitions, vec![TransitionKind::Down, TransitionKind::Up]);
    }

    #[test]
    fn missing_and_not_configured_do_not_move_the_state() {
        let mut key_state = KeyState::default();
        key_state.apply(Status::Unavailable, 2, 1);
        let counters = (key_state.consecutive_down, key_state.consecutive_up);
        assert!(key_state.apply(Status::Missing, 2, 1).is_none());
        assert!(key_state.apply(Status::NotConfigured, 2, 1).is_none());
        assert_eq!(
            (key_state.consecutive_down, key_state.consecutive_up),
            counters
        );
    }

    #[test]
    fn transitions_strictly_alternate() {
        // A long pseudo-random stream may cross many times, but transitions
        // must alternate DOWN, UP, DOWN, ... with no repeats.
        let mut stream = Vec::new();
        let mut seed = 0x2545_f491u32;
        for _ in 0..500 {
            seed = seed.wrapping_mul(48_271) % 0x7fff_ffff;
            stream.push(match seed % 4 {
                0 | 1 => Status::Available,
                2 => Status::Unavailable,
                _ => Status::Missing,
            });
        }
        let transitions = feed(&stream, 2, 2);
        for pair in transitions.windows(2) {
            assert_ne!(pair[0], pair[1], "two consecutive {:?}", pair[0]);
        }
        if let Some(first) = transitions.first() {
            assert_eq!(*first, TransitionKind::Down, "initial state is UP");
        }
    }

    #[test]
    fn repeated_failures_after_down_emit_nothing() {
        let transitions = feed(&[Status::Unavailable; 10], 2, 1);
        assert_eq!(transitions, vec![TransitionKind::Down]);
    }
}
