//! Probe execution and scheduling for relaymon.
//!
//! [`ProbeEngine`] turns one monitor into one observation (classification,
//! placeholder substitution, retries with jittered backoff); [`Scheduler`]
//! runs a staggered periodic loop per probed monitor under a fleet-wide
//! concurrency cap and hands completed observations to an
//! [`ObservationSink`].

pub mod classify;
pub mod engine;
pub mod scheduler;

pub use classify::{Verdict, classify_response, classify_transport_failure};
pub use engine::{ProbeEngine, ProbeError, backoff_delay};
pub use scheduler::{MetricsSnapshot, ObservationSink, Scheduler, SchedulerMetrics};
