//! Declarative fleet configuration for relaymon.
//!
//! The fleet is described by a single TOML document containing global
//! defaults, feature toggles, storage settings, and the monitor list with
//! its parent/child inheritance tree. Loading runs three passes:
//!
//! 1. **Validate** — structural checks (key uniqueness, parent graph,
//!    field-level rules).
//! 2. **Normalize** — defaults, environment overrides, duration parsing,
//!    slugs, provider flag injection, body includes.
//! 3. **Inherit** — copy unset fields from group parents into children.
//!
//! The result is a [`ResolvedConfig`] holding immutable
//! [`relaymon_core::Monitor`] records, published to the rest of the process
//! through [`SharedConfig`] and refreshed by the [`ConfigWatcher`].

pub mod document;
pub mod duration;
pub mod env;
pub mod error;
pub mod include;
pub mod resolve;
pub mod resolved;
pub mod shared;
pub mod slug;
pub mod watcher;

pub use document::{FleetDocument, MonitorSpec};
pub use duration::{format_duration, parse_duration};
pub use error::ConfigError;
pub use resolve::{load_config, resolve};
pub use resolved::{
    AnnouncementsConfig, ArchiveConfig, CacheTtl, ChannelStrategy, EventsConfig, EventsMode,
    PostgresConfig, ResolvedConfig, RetentionConfig, SQLITE_MAX_BATCH_KEYS, SelftestConfig,
    SponsorPinConfig, StorageBackend, StorageConfig,
};
pub use shared::SharedConfig;
pub use watcher::{ConfigWatcher, ReloadHook};
