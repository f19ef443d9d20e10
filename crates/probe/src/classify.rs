//! Probe outcome classification.
//!
//! One place maps an HTTP response (or transport failure) to the
//! `(Status, SubStatus)` pair stored on the observation. The ordering of
//! the checks is contractual: specific codes win over the generic 4xx
//! bucket, and the content check only applies to 2xx responses.

use std::time::Duration;

use relaymon_core::{Status, SubStatus};

/// Classification of one completed HTTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status: Status,
    pub sub_status: SubStatus,
}

impl Verdict {
    const fn new(status: Status, sub_status: SubStatus) -> Self {
        Self { status, sub_status }
    }
}

/// Classify a transport-level failure (connect error, per-attempt timeout,
/// TLS failure).
#[must_use]
pub fn classify_transport_failure() -> Verdict {
    Verdict::new(Status::Unavailable, SubStatus::NetworkError)
}

/// Classify a received HTTP response.
///
/// `body` is only inspected when `success_contains` is set and the
/// response is 2xx.
#[must_use]
pub fn classify_response(
    http_status: u16,
    body: &str,
    success_contains: Option<&str>,
    latency: Duration,
    slow_latency: Duration,
) -> Verdict {
    match http_status {
        500..=599 => Verdict::new(Status::Unavailable, SubStatus::ServerError),
        429 => Verdict::new(Status::Unavailable, SubStatus::RateLimit),
        401 | 403 => Verdict::new(Status::Unavailable, SubStatus::AuthError),
        400 | 422 => Verdict::new(Status::Unavailable, SubStatus::InvalidRequest),
        402 | 404..=421 | 423..=428 | 430..=499 => {
            Verdict::new(Status::Unavailable, SubStatus::ClientError)
        }
        200..=299 => {
            if let Some(needle) = success_contains
                && !body.contains(needle)
            {
                return Verdict::new(Status::Unavailable, SubStatus::ContentMismatch);
            }
            if latency > slow_latency {
                Verdict::new(Status::Degraded, SubStatus::SlowLatency)
            } else {
                Verdict::new(Status::Available, SubStatus::Ok)
            }
        }
        // 1xx and 3xx land here: the relay did not answer the probe.
        _ => Verdict::new(Status::Unavailable, SubStatus::ClientError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(code: u16) -> Verdict {
        classify_response(
            code,
            "",
            None,
            Duration::from_millis(100),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn code_families_map_to_sub_statuses() {
        assert_eq!(classify(500).sub_status, SubStatus::ServerError);
        assert_eq!(classify(503).sub_status, SubStatus::ServerError);
        assert_eq!(classify(429).sub_status, SubStatus::RateLimit);
        assert_eq!(classify(401).sub_status, SubStatus::AuthError);
        assert_eq!(classify(403).sub_status, SubStatus::AuthError);
        assert_eq!(classify(400).sub_status, SubStatus::InvalidRequest);
        assert_eq!(classify(422).sub_status, SubStatus::InvalidRequest);
        assert_eq!(classify(404).sub_status, SubStatus::ClientError);
        assert_eq!(classify(418).sub_status, SubStatus::ClientError);
        for code in [500, 429, 401, 400, 404] {
            assert_eq!(classify(code).status, Status::Unavailable);
        }
    }

    #[test]
    fn fast_ok_is_available() {
        let v = classify(200);
        assert_eq!(v.status, Status::Available);
        assert_eq!(v.sub_status, SubStatus::Ok);
    }

    #[test]
    fn slow_ok_is_degraded() {
        // slow_latency = 3s, response in 4200 ms.
        let v = classify_response(
            200,
            "",
            None,
            Duration::from_millis(4200),
            Duration::from_secs(3),
        );
        assert_eq!(v.status, Status::Degraded);
        assert_eq!(v.sub_status, SubStatus::SlowLatency);
    }

    #[test]
    fn latency_exactly_at_threshold_is_available() {
        let v = classify_response(
            200,
            "",
            None,
            Duration::from_secs(3),
            Duration::from_secs(3),
        );
        assert_eq!(v.status, Status::Available);
    }

    #[test]
    fn content_check_applies_to_2xx_only() {
        let v = classify_response(
            200,
            "{\"error\": \"quota\"}",
            Some("\"content\""),
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        assert_eq!(v.status, Status::Unavailable);
        assert_eq!(v.sub_status, SubStatus::ContentMismatch);

        let v = classify_response(
            200,
            "{\"content\": \"pong\"}",
            Some("\"content\""),
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        assert_eq!(v.status, Status::Available);

        // A 503 keeps its server_error verdict even with a matching body.
        let v = classify_response(
            503,
            "\"content\"",
            Some("\"content\""),
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        assert_eq!(v.sub_status, SubStatus::ServerError);
    }

    #[test]
    fn content_mismatch_wins_over_slow_latency() {
        let v = classify_response(
            200,
            "nope",
            Some("pong"),
            Duration::from_secs(9),
            Duration::from_secs(3),
        );
        assert_eq!(v.sub_status, SubStatus::ContentMismatch);
    }

    #[test]
    fn redirects_count_as_client_error() {
        assert_eq!(classify(301).sub_status, SubStatus::ClientError);
        assert_eq!(classify(301).status, Status::Unavailable);
    }
}
