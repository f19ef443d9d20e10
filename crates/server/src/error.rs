use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use relaymon_store::StoreError;

/// Errors that can occur while running the relaymon server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A store query failed while serving an API request.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An API request parameter failed validation.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// Announcements are enabled but no snapshot has ever been fetched.
    #[error("announcements unavailable: {0}")]
    AnnouncementsUnavailable(String),
}

impl ServerError {
    /// Convenience constructor for parameter validation failures.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": message, "field": field }),
            ),
            Self::Store(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": e.to_string() }),
            ),
            Self::AnnouncementsUnavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": message }),
            ),
            Self::Config(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": message }),
            ),
            Self::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": e.to_string() }),
            ),
        };
        (status, axum::Json(body)).into_response()
    }
}
