//! Core types shared across the relaymon workspace.
//!
//! This crate defines the domain vocabulary of the monitor: target keys,
//! resolved monitor records, probe observations, derived timeline buckets,
//! and DOWN/UP transition events. It deliberately contains no I/O so that
//! every other crate can depend on it without pulling in a runtime.

pub mod event;
pub mod key;
pub mod monitor;
pub mod observation;
pub mod timeline;

pub use event::{FsmState, TransitionEvent, TransitionKind};
pub use key::MonitorKey;
pub use monitor::{
    Board, Category, HttpMethod, Monitor, RetryPolicy, SponsorLevel, default_board,
};
pub use observation::{Observation, Status, SubStatus, SNIPPET_MAX_BYTES};
pub use timeline::{MISSING_AVAILABILITY, Period, TimelineBucket, uptime_percent};
