//! PostgreSQL backend for the relaymon observation store.

mod migrations;
mod store;

pub use store::{PgStore, PgStoreOptions};
