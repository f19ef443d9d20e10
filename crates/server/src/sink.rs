//! The observation pipeline: store append, then the event state machine.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use relaymon_core::Observation;
use relaymon_events::EventEngine;
use relaymon_probe::ObservationSink;
use relaymon_store::ObservationStore;

/// Persists each observation and forwards it to the event engine.
///
/// A failed append drops the observation entirely: the state machine is
/// not advanced either, and no retry is attempted since the next probe
/// supersedes the lost data point.
pub struct PipelineSink {
    store: Arc<dyn ObservationStore>,
    events: Arc<EventEngine>,
}

impl PipelineSink {
    #[must_use]
    pub fn new(store: Arc<dyn ObservationStore>, events: Arc<EventEngine>) -> Self {
        Self { store, events }
    }
}

#[async_trait]
impl ObservationSink for PipelineSink {
    async fn record(&self, observation: Observation) {
        if let Err(e) = self.store.append(&observation).await {
            warn!(key = %observation.key, error = %e, "dropping observation: append failed");
            return;
        }
        self.events.observe(&observation);
    }
}
