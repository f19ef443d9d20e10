//! SQLite backend for the relaymon observation store.

mod migrations;
mod store;

pub use store::{MAX_BATCH_KEYS, SqliteStore};
