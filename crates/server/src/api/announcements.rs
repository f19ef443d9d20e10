//! `GET /api/announcements`.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderName;
use axum::http::header::CACHE_CONTROL;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::announce::AnnouncementItem;
use crate::api::AppState;
use crate::error::ServerError;

static X_DATA_STALE: HeaderName = HeaderName::from_static("x-data-stale");

#[derive(Debug, Serialize)]
struct FetchMeta {
    #[serde(rename = "fetchedAt", skip_serializing_if = "Option::is_none")]
    fetched_at: Option<DateTime<Utc>>,
    stale: bool,
    #[serde(rename = "ttlSeconds")]
    ttl_seconds: u64,
}

#[derive(Debug, Serialize)]
struct AnnouncementsResponse {
    enabled: bool,
    source: String,
    /// Served window in days.
    window: u32,
    fetch: FetchMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest: Option<AnnouncementItem>,
    items: Vec<AnnouncementItem>,
    version: String,
    #[serde(rename = "apiMaxAge")]
    api_max_age: u64,
}

/// Serve the announcement snapshot, marking stale fallbacks via header.
pub async fn announcements(State(state): State<AppState>) -> Result<Response, ServerError> {
    let config = state.announcements.config().clone();

    if !config.enabled {
        let body = AnnouncementsResponse {
            enabled: false,
            source: config.source,
            window: config.window_days,
            fetch: FetchMeta {
                fetched_at: None,
                stale: false,
                ttl_seconds: config.ttl.as_secs(),
            },
            latest: None,
            items: Vec::new(),
            version: String::new(),
            api_max_age: config.api_max_age,
        };
        return Ok(Json(body).into_response());
    }

    let snapshot = state.announcements.get().await?;
    let body = AnnouncementsResponse {
        enabled: true,
        source: config.source,
        window: config.window_days,
        fetch: FetchMeta {
            fetched_at: Some(snapshot.fetched_at),
            stale: snapshot.stale,
            ttl_seconds: config.ttl.as_secs(),
        },
        latest: snapshot.latest.clone(),
        items: snapshot.items.clone(),
        version: snapshot.version.clone(),
        api_max_age: config.api_max_age,
    };

    let mut response = Json(body).into_response();
    if let Ok(value) = format!("private, max-age={}", config.api_max_age).parse() {
        response.headers_mut().insert(CACHE_CONTROL, value);
    }
    if snapshot.stale
        && let Ok(value) = "true".parse()
    {
        response.headers_mut().insert(X_DATA_STALE.clone(), value);
    }
    Ok(response)
}
