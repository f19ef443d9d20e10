//! Observation store abstractions for relaymon.
//!
//! Defines the [`ObservationStore`] trait implemented by the SQLite and
//! PostgreSQL backends, the shared bucket aggregation both must agree on,
//! the retention sweeper, the daily archive writer, and an in-memory store
//! for tests.

pub mod archive;
pub mod bucket;
pub mod error;
pub mod memory;
pub mod retention;
pub mod store;

pub use archive::ArchiveWriter;
pub use bucket::{TimeFilter, TimelineQuery, aggregate};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use retention::{LoopHandle, RetentionSweeper};
pub use store::ObservationStore;
