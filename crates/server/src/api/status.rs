//! `GET /api/status`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header::CACHE_CONTROL;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use relaymon_core::Period;
use relaymon_config::ResolvedConfig;
use relaymon_store::TimeFilter;

use crate::aggregate::snapshot::StatusParams;
use crate::aggregate::{BoardFilter, compute_snapshot};
use crate::api::AppState;
use crate::error::ServerError;

/// Raw query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub period: Option<String>,
    pub align: Option<String>,
    pub time_filter: Option<String>,
    pub board: Option<String>,
    pub include_hidden: Option<bool>,
}

/// Serve one status snapshot, from cache when the fingerprint is fresh.
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, ServerError> {
    let config = state.shared.load();
    let params = parse_params(&query, &config)?;
    let ttl = config.cache_ttl.for_period(params.period);

    let key = params.fingerprint().key();
    let body = match state.cache.get(&key, config.revision) {
        Some(cached) => cached,
        None => {
            let snapshot = compute_snapshot(&config, state.store.as_ref(), &params).await?;
            let body = Arc::new(snapshot);
            state
                .cache
                .insert(key, body.clone(), ttl, config.revision);
            body
        }
    };

    let mut response = Json(body.as_ref()).into_response();
    if let Ok(value) = format!("private, max-age={}", ttl.as_secs()).parse() {
        response.headers_mut().insert(CACHE_CONTROL, value);
    }
    Ok(response)
}

fn parse_params(
    query: &StatusQuery,
    config: &ResolvedConfig,
) -> Result<StatusParams, ServerError> {
    let period = match query.period.as_deref() {
        None => Period::Min90,
        Some(raw) => raw
            .parse::<Period>()
            .map_err(|e| ServerError::validation("period", e))?,
    };

    let align_hour = match query.align.as_deref() {
        None => false,
        Some("hour") => {
            if period != Period::Hour24 {
                return Err(ServerError::validation(
                    "align",
                    "hour alignment only applies to period=24h",
                ));
            }
            true
        }
        Some(other) => {
            return Err(ServerError::validation(
                "align",
                format!("unknown alignment {other:?}"),
            ));
        }
    };

    let time_filter = match query.time_filter.as_deref() {
        None => None,
        Some(raw) => {
            if !matches!(period, Period::Day7 | Period::Day30) {
                return Err(ServerError::validation(
                    "time_filter",
                    "daily windows only apply to period=7d or 30d",
                ));
            }
            Some(TimeFilter::parse(raw).map_err(|e| ServerError::validation("time_filter", e))?)
        }
    };

    let board = match query.board.as_deref() {
        Some(raw) => raw
            .parse::<BoardFilter>()
            .map_err(|e| ServerError::validation("board", e))?,
        // The hot board is the default landing view while boards are on;
        // with the feature off every monitor is served.
        None if config.boards_enabled => BoardFilter::Hot,
        None => BoardFilter::All,
    };

    Ok(StatusParams {
        period,
        align_hour,
        time_filter_raw: query.time_filter.clone(),
        time_filter,
        board,
        include_hidden: query.include_hidden.unwrap_or(false),
    })
}
