//! Status aggregation: fingerprinted, TTL-cached snapshot computation.

pub mod cache;
pub mod fingerprint;
pub mod group;
pub mod snapshot;
pub mod sponsor;

pub use cache::SnapshotCache;
pub use fingerprint::{BoardFilter, Fingerprint};
pub use snapshot::{StatusParams, compute_snapshot};
