//! The event engine: routes observations into the configured state
//! machine and emits transitions onto the outbound queue.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use relaymon_config::{EventsConfig, EventsMode, ResolvedConfig};
use relaymon_core::{Observation, TransitionEvent};

use crate::channel::ChannelState;
use crate::fsm::KeyState;

/// Routes observations through the model-level or channel-level state
/// machine.
///
/// Mutations are serialized per key through an `Arc<Mutex<_>>` held in a
/// sharded map; no global lock is taken. Readers receive cloned snapshots
/// that may trail the writer by at most one probe cycle.
pub struct EventEngine {
    config: EventsConfig,
    model_states: DashMap<String, Arc<Mutex<KeyState>>>,
    channel_states: DashMap<String, Arc<Mutex<ChannelState>>>,
    tx: mpsc::Sender<TransitionEvent>,
}

impl EventEngine {
    /// Build the engine and its outbound queue. The receiver half goes to
    /// the notification dispatcher; delivery past the queue is best-effort.
    #[must_use]
    pub fn new(config: EventsConfig) -> (Self, mpsc::Receiver<TransitionEvent>) {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        (
            Self {
                config,
                model_states: DashMap::new(),
                channel_states: DashMap::new(),
                tx,
            },
            rx,
        )
    }

    /// Feed one observation through the configured state machine.
    pub fn observe(&self, observation: &Observation) {
        // Both modes track model-level targets; single-layer monitors carry
        // no model and do not participate in eventing.
        if observation.key.model.is_empty() {
            return;
        }
        match self.config.mode {
            EventsMode::Model => self.observe_model(observation),
            EventsMode::Channel => self.observe_channel(observation),
        }
    }

    fn observe_model(&self, observation: &Observation) {
        let key = observation.key.canonical();
        let state = self
            .model_states
            .entry(key.clone())
            .or_default()
            .clone();
        let mut guard = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let transition = guard.apply(
            observation.status,
            self.config.down_threshold,
            self.config.up_threshold,
        );
        if let Some(kind) = transition {
            let event = TransitionEvent {
                id: Uuid::new_v4(),
                key,
                kind,
                previous_state: match kind {
                    relaymon_core::TransitionKind::Down => relaymon_core::FsmState::Up,
                    relaymon_core::TransitionKind::Up => relaymon_core::FsmState::Down,
                },
                consecutive_down: guard.consecutive_down,
                consecutive_up: guard.consecutive_up,
                sub_status: Some(observation.sub_status),
                at: guard.last_transition.unwrap_or_else(Utc::now),
            };
            drop(guard);
            self.emit(event);
        }
    }

    fn observe_channel(&self, observation: &Observation) {
        let triple = observation.key.channel_key();
        let state = self
            .channel_states
            .entry(triple.clone())
            .or_default()
            .clone();
        let mut guard = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let transition = guard.apply(
            &observation.key.model,
            observation.status,
            self.config.channel_down_threshold,
            self.config.channel_strategy,
        );
        if let Some(kind) = transition {
            let down_models = u32::try_from(guard.down_models()).unwrap_or(u32::MAX);
            let event = TransitionEvent {
                id: Uuid::new_v4(),
                key: triple,
                kind,
                previous_state: match kind {
                    relaymon_core::TransitionKind::Down => relaymon_core::FsmState::Up,
                    relaymon_core::TransitionKind::Up => relaymon_core::FsmState::Down,
                },
                consecutive_down: down_models,
                consecutive_up: 0,
                sub_status: Some(observation.sub_status),
                at: guard.last_transition.unwrap_or_else(Utc::now),
            };
            drop(guard);
            self.emit(event);
        }
    }

    fn emit(&self, event: TransitionEvent) {
        info!(key = %event.key, kind = ?event.kind, "state transition");
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(key = %event.key, "event queue full, dropping transition");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!(key = %event.key, "event queue closed, dropping transition");
            }
        }
    }

    /// Snapshot of one model-level key.
    #[must_use]
    pub fn model_snapshot(&self, key: &str) -> Option<KeyState> {
        self.model_states.get(key).map(|state| {
            state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        })
    }

    /// Snapshot of one channel triple.
    #[must_use]
    pub fn channel_snapshot(&self, triple: &str) -> Option<ChannelState> {
        self.channel_states.get(triple).map(|state| {
            state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        })
    }

    /// Snapshots of every tracked model-level key, for dashboards.
    #[must_use]
    pub fn snapshots(&self) -> Vec<(String, KeyState)> {
        self.model_states
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry
                        .value()
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .clone(),
                )
            })
            .collect()
    }

    /// Forget keys that left the fleet and shrink channel model sets, so a
    /// removed layer cannot pin a channel DOWN.
    pub fn reconcile(&self, config: &ResolvedConfig) {
        let live: std::collections::HashSet<String> = config
            .monitors
            .iter()
            .map(|m| m.key.canonical())
            .collect();
        self.model_states.retain(|key, _| live.contains(key));

        self.channel_states.retain(|triple, state| {
            let models: Vec<String> = config
                .monitors
                .iter()
                .filter(|m| &m.key.channel_key() == triple && !m.key.model.is_empty())
                .map(|m| m.key.model.clone())
                .collect();
            if models.is_empty() {
                return false;
            }
            state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .retain_models(|model| models.iter().any(|m| m == model));
            true
        });
    }
}
