use thiserror::Error;

/// Errors raised by observation store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to reach or open the backend.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The backend rejected an operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored row could not be decoded into an observation.
    #[error("corrupt observation row: {0}")]
    Corrupt(String),

    /// Archive file I/O failed.
    #[error("archive error: {0}")]
    Archive(String),
}
