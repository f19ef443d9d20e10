//! relaymon server: HTTP status API, aggregation, announcements, and the
//! process wiring that connects the scheduler, store, and event engine.

pub mod aggregate;
pub mod announce;
pub mod api;
pub mod error;
pub mod sink;
pub mod store_factory;

pub use error::ServerError;
pub use sink::PipelineSink;
