//! The probe engine: one monitor in, one observation out.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;
use reqwest::Client;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use relaymon_core::{HttpMethod, Monitor, Observation, RetryPolicy, Status, SubStatus};

use crate::classify::{classify_response, classify_transport_failure};

/// Placeholder substituted with the monitor's API key.
const API_KEY_PLACEHOLDER: &str = "{{API_KEY}}";
/// Placeholder substituted with the monitor's model.
const MODEL_PLACEHOLDER: &str = "{{MODEL}}";

/// Errors raised while constructing the engine's HTTP clients.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    #[error("invalid proxy {url:?}: {message}")]
    Proxy { url: String, message: String },
}

/// Executes HTTP probes.
///
/// One default client is shared by all monitors; monitors with a proxy get
/// a client per distinct proxy URL, built lazily and cached. Per-attempt
/// deadlines are applied per request, so clients carry no global timeout.
pub struct ProbeEngine {
    default_client: Client,
    proxy_clients: DashMap<String, Client>,
}

impl ProbeEngine {
    /// Build the engine and its default client.
    pub fn new() -> Result<Self, ProbeError> {
        Ok(Self {
            default_client: Client::builder().build()?,
            proxy_clients: DashMap::new(),
        })
    }

    /// Execute one probe to completion, retries included.
    ///
    /// Returns `None` when `cancel` fires first: a canceled probe emits no
    /// observation. Every other outcome, including transport failures and
    /// exhausted retries, yields exactly one observation.
    pub async fn probe(
        &self,
        monitor: &Monitor,
        cancel: &CancellationToken,
    ) -> Option<Observation> {
        // A monitor without a probe URL is recorded as NOT_CONFIGURED so
        // its history shows the gap rather than silently vanishing.
        if monitor.url.is_empty() {
            return Some(Observation::new(
                monitor.key.clone(),
                Status::NotConfigured,
                SubStatus::Ok,
                0,
            ));
        }

        let client = match self.client_for(monitor) {
            Ok(client) => client,
            Err(e) => {
                warn!(key = %monitor.key, error = %e, "probe client unavailable");
                let mut obs = Observation::new(
                    monitor.key.clone(),
                    Status::Unavailable,
                    SubStatus::NetworkError,
                    0,
                );
                obs.error = Some(e.to_string());
                return Some(obs);
            }
        };

        let mut last = None;
        for attempt in 0..=monitor.retry.count {
            let outcome = tokio::select! {
                outcome = self.attempt(&client, monitor) => outcome,
                () = cancel.cancelled() => return None,
            };
            let unavailable = outcome.status == Status::Unavailable;
            last = Some(outcome);
            if !unavailable {
                break;
            }
            if attempt < monitor.retry.count {
                let delay = backoff_delay(&monitor.retry, attempt);
                debug!(key = %monitor.key, attempt, ?delay, "probe attempt failed, backing off");
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => return None,
                }
            }
        }
        last
    }

    /// One HTTP attempt with the monitor's per-attempt deadline.
    async fn attempt(&self, client: &Client, monitor: &Monitor) -> Observation {
        let url = substitute(&monitor.url, monitor);
        let mut request = match monitor.method {
            HttpMethod::Get => client.get(&url),
            HttpMethod::Post => client.post(&url),
            HttpMethod::Put => client.put(&url),
            HttpMethod::Head => client.head(&url),
        }
        .timeout(monitor.timeout);

        for (name, value) in &monitor.headers {
            request = request.header(name.as_str(), substitute(value, monitor));
        }
        if let Some(ref body) = monitor.body {
            request = request.body(substitute(body, monitor));
        }

        let started = Instant::now();
        let response = request.send().await;
        match response {
            Err(e) => {
                let latency = latency_ms(started.elapsed());
                let verdict = classify_transport_failure();
                let mut obs = Observation::new(
                    monitor.key.clone(),
                    verdict.status,
                    verdict.sub_status,
                    latency,
                );
                obs.error = Some(e.to_string());
                obs
            }
            Ok(response) => {
                let http_status = response.status().as_u16();
                // The body is part of the measured round trip: a relay that
                // answers headers quickly but trickles the payload is slow.
                let body = response.text().await.unwrap_or_default();
                let latency = started.elapsed();
                let verdict = classify_response(
                    http_status,
                    &body,
                    monitor.success_contains.as_deref(),
                    latency,
                    monitor.slow_latency,
                );
                let mut obs = Observation::new(
                    monitor.key.clone(),
                    verdict.status,
                    verdict.sub_status,
                    latency_ms(latency),
                );
                obs.http_status = Some(http_status);
                if verdict.status != Status::Available {
                    obs = obs.with_snippet(&body);
                }
                obs
            }
        }
    }

    fn client_for(&self, monitor: &Monitor) -> Result<Client, ProbeError> {
        let Some(ref proxy_url) = monitor.proxy else {
            return Ok(self.default_client.clone());
        };
        if let Some(client) = self.proxy_clients.get(proxy_url) {
            return Ok(client.clone());
        }
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| ProbeError::Proxy {
            url: proxy_url.clone(),
            message: e.to_string(),
        })?;
        let client = Client::builder().proxy(proxy).build()?;
        self.proxy_clients.insert(proxy_url.clone(), client.clone());
        Ok(client)
    }
}

/// Replace `{{API_KEY}}` and `{{MODEL}}` in a request part.
fn substitute(template: &str, monitor: &Monitor) -> String {
    let mut out = template.to_owned();
    if out.contains(API_KEY_PLACEHOLDER) {
        out = out.replace(
            API_KEY_PLACEHOLDER,
            monitor.api_key.as_deref().unwrap_or(""),
        );
    }
    if out.contains(MODEL_PLACEHOLDER) {
        out = out.replace(MODEL_PLACEHOLDER, &monitor.key.model);
    }
    out
}

/// Backoff before retry `attempt + 1`:
/// `min(max_delay, base_delay * 2^attempt) * (1 + U[-jitter, +jitter])`.
#[must_use]
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt.min(31)));
    let capped = exp.min(policy.max_delay);
    if policy.jitter <= 0.0 {
        return capped;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-policy.jitter..=policy.jitter);
    Duration::from_secs_f64((capped.as_secs_f64() * factor).max(0.0))
}

fn latency_ms(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}
