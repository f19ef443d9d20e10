use thiserror::Error;

/// Errors raised while loading or resolving the fleet configuration.
///
/// Every variant is fatal at initial load. During hot reload the previous
/// configuration is retained and the error is logged instead.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A duration string could not be parsed.
    #[error("monitor {monitor}: invalid duration for {field}: {value:?}")]
    InvalidDuration {
        monitor: String,
        field: &'static str,
        value: String,
    },

    /// A top-level duration string could not be parsed.
    #[error("invalid duration for {field}: {value:?}")]
    InvalidGlobalDuration { field: &'static str, value: String },

    /// Two monitors share the same `(provider, service, channel, model)`.
    #[error("duplicate monitor key: {0}")]
    DuplicateKey(String),

    /// A child's explicit path segment conflicts with its parent path.
    #[error("monitor {monitor}: {field} {value:?} conflicts with parent path {parent}")]
    ParentMismatch {
        monitor: String,
        field: &'static str,
        value: String,
        parent: String,
    },

    /// A child references a parent triple with no matching monitor.
    #[error("monitor {monitor}: parent {parent} does not exist")]
    ParentNotFound { monitor: String, parent: String },

    /// A monitor referenced as a parent has an empty model.
    #[error("monitor {monitor}: parent {parent} has no model and cannot anchor a group")]
    ParentWithoutModel { monitor: String, parent: String },

    /// The parent graph contains a cycle.
    #[error("parent cycle detected at {0}")]
    ParentCycle(String),

    /// An enum-valued field holds an unknown value.
    #[error("monitor {monitor}: {message}")]
    InvalidField { monitor: String, message: String },

    /// A numeric field is out of bounds.
    #[error("monitor {monitor}: {field} out of range: {message}")]
    OutOfRange {
        monitor: String,
        field: &'static str,
        message: String,
    },

    /// A URL failed scheme or shape validation.
    #[error("monitor {monitor}: invalid {field}: {message}")]
    InvalidUrl {
        monitor: String,
        field: &'static str,
        message: String,
    },

    /// A generated or declared provider slug is not URL-safe.
    #[error("invalid provider slug {slug:?}: {message}")]
    InvalidSlug { slug: String, message: String },

    /// `max_delay` ended up below `base_delay` after inheritance.
    #[error("monitor {monitor}: retry max_delay is below base_delay")]
    RetryDelayInverted { monitor: String },

    /// A body `!include` path escapes the config sandbox or cannot be read.
    #[error("monitor {monitor}: body include {path:?}: {message}")]
    BadInclude {
        monitor: String,
        path: String,
        message: String,
    },

    /// A monitor references an undefined body template.
    #[error("monitor {monitor}: unknown body template {name:?}")]
    UnknownBodyTemplate { monitor: String, name: String },

    /// The archive window does not fit inside the retention window.
    #[error(
        "storage: retention.days ({days}) must cover archive_days + backfill_days ({needed})"
    )]
    ArchiveExceedsRetention { days: u32, needed: u32 },

    /// A storage setting is invalid.
    #[error("storage: {0}")]
    Storage(String),
}
