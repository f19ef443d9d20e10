use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::key::MonitorKey;

/// HTTP method used for a probe request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Head,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Head => "HEAD",
        }
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "HEAD" => Ok(Self::Head),
            other => Err(format!("unknown http method: {other}")),
        }
    }
}

/// Lifecycle board a monitor is assigned to.
///
/// `Cold` means "stopped but history retained": the scheduler skips the
/// monitor while the store keeps serving its past observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    #[default]
    Hot,
    Secondary,
    Cold,
}

impl Board {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Secondary => "secondary",
            Self::Cold => "cold",
        }
    }
}

impl std::str::FromStr for Board {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(Self::Hot),
            "secondary" => Ok(Self::Secondary),
            "cold" => Ok(Self::Cold),
            other => Err(format!("unknown board: {other}")),
        }
    }
}

/// Default board assignment applied after inheritance.
#[must_use]
pub fn default_board() -> Board {
    Board::Hot
}

/// Sponsor tier of the entity operating a monitored endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SponsorLevel {
    #[default]
    None,
    Basic,
    Advanced,
    Enterprise,
}

impl SponsorLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Advanced => "advanced",
            Self::Enterprise => "enterprise",
        }
    }
}

impl std::str::FromStr for SponsorLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown sponsor level: {other}")),
        }
    }
}

/// Coarse classification of the kind of relay behind a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Official,
    ThirdParty,
    SelfHosted,
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "official" => Ok(Self::Official),
            "third_party" => Ok(Self::ThirdParty),
            "self_hosted" => Ok(Self::SelfHosted),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Retry policy for UNAVAILABLE probe outcomes.
///
/// Attempt `k` (zero-based) sleeps `min(max_delay, base_delay * 2^k)` scaled
/// by a uniform jitter factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub count: u32,
    /// Backoff base delay.
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Backoff ceiling.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Jitter ratio in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            count: 0,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            jitter: 0.0,
        }
    }
}

/// Serialize `Duration` fields as integer milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

/// A fully resolved monitor definition.
///
/// Produced by the config resolver after Validate, Normalize, and Inherit
/// have run: every duration string has been parsed, provider-level flags
/// injected, and parent fields copied into children. Records are owned by
/// exactly one config revision and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    /// Target identity.
    pub key: MonitorKey,
    /// Channel triple of the parent, for children in a multi-model group.
    #[serde(default)]
    pub parent: Option<String>,
    /// Declaration index within the fleet document; orders group layers.
    pub order: usize,

    // ---- Probe request ----
    /// Probe URL after normalization.
    pub url: String,
    /// HTTP method.
    #[serde(default)]
    pub method: HttpMethod,
    /// Request headers; values may contain `{{API_KEY}}` / `{{MODEL}}`
    /// placeholders substituted at probe time.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request body template.
    #[serde(default)]
    pub body: Option<String>,
    /// API key substituted for `{{API_KEY}}`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Substring that must appear in a 2xx body for the probe to count as
    /// successful.
    #[serde(default)]
    pub success_contains: Option<String>,
    /// Explicit environment variable to read the API key from.
    #[serde(default)]
    pub env_var_name: Option<String>,
    /// Optional per-monitor proxy URL (http, https, or socks5).
    #[serde(default)]
    pub proxy: Option<String>,

    // ---- Timings ----
    /// Probe cadence.
    #[serde(with = "duration_millis")]
    pub interval: Duration,
    /// Latency above which a successful probe is classified DEGRADED.
    #[serde(with = "duration_millis")]
    pub slow_latency: Duration,
    /// Per-attempt deadline.
    #[serde(with = "duration_millis")]
    pub timeout: Duration,

    /// Retry policy for failed attempts.
    #[serde(default)]
    pub retry: RetryPolicy,

    // ---- Presentation & lifecycle ----
    /// URL-safe provider slug.
    pub slug: String,
    /// Display name for the monitor; falls back to the channel name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Display name for the provider.
    #[serde(default)]
    pub provider_display_name: Option<String>,
    /// Relay classification.
    #[serde(default)]
    pub category: Option<Category>,
    /// Sponsor group identifier.
    #[serde(default)]
    pub sponsor: Option<String>,
    /// Sponsor tier.
    #[serde(default)]
    pub sponsor_level: SponsorLevel,
    /// Board assignment.
    #[serde(default)]
    pub board: Board,
    /// Reason the monitor was moved to the cold board.
    #[serde(default)]
    pub cold_reason: Option<String>,
    /// Excluded everywhere: not probed, not surfaced.
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub disabled_reason: Option<String>,
    /// Probed but not surfaced in API responses.
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub hidden_reason: Option<String>,
    /// Badge identifiers resolved against the badge definitions.
    #[serde(default)]
    pub badges: Vec<String>,
    /// Risk annotation injected from provider-level configuration.
    #[serde(default)]
    pub risk: Option<String>,
    /// Price range advertised by the relay, non-negative.
    #[serde(default)]
    pub price_min: Option<f64>,
    #[serde(default)]
    pub price_max: Option<f64>,
    /// Date the monitor was first listed.
    #[serde(default)]
    pub listed_since: Option<NaiveDate>,
    /// Free-form provider metadata carried through to the API.
    #[serde(default)]
    pub provider_metadata: HashMap<String, String>,
}

impl Monitor {
    /// Whether the scheduler should probe this monitor.
    ///
    /// Cold-board suspension only applies when the boards feature is
    /// enabled; `boards_enabled = false` leaves cold monitors probed.
    #[must_use]
    pub fn probed(&self, boards_enabled: bool) -> bool {
        if self.disabled {
            return false;
        }
        !(boards_enabled && self.board == Board::Cold)
    }

    /// Identifier used by the API and by client-side favorites: the slug
    /// plus the non-provider key segments.
    #[must_use]
    pub fn id(&self) -> String {
        if self.key.model.is_empty() {
            format!("{}/{}/{}", self.slug, self.key.service, self.key.channel)
        } else {
            format!(
                "{}/{}/{}/{}",
                self.slug, self.key.service, self.key.channel, self.key.model
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(board: Board, disabled: bool) -> Monitor {
        Monitor {
            key: MonitorKey::new("demo", "cc", "vip", ""),
            parent: None,
            order: 0,
            url: "https://example.com/v1/probe".into(),
            method: HttpMethod::Post,
            headers: HashMap::new(),
            body: None,
            api_key: None,
            success_contains: None,
            env_var_name: None,
            proxy: None,
            interval: Duration::from_secs(60),
            slow_latency: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            slug: "demo".into(),
            display_name: None,
            provider_display_name: None,
            category: None,
            sponsor: None,
            sponsor_level: SponsorLevel::None,
            board,
            cold_reason: None,
            disabled,
            disabled_reason: None,
            hidden: false,
            hidden_reason: None,
            badges: Vec::new(),
            risk: None,
            price_min: None,
            price_max: None,
            listed_since: None,
            provider_metadata: HashMap::new(),
        }
    }

    #[test]
    fn disabled_is_never_probed() {
        assert!(!monitor(Board::Hot, true).probed(true));
        assert!(!monitor(Board::Hot, true).probed(false));
    }

    #[test]
    fn cold_board_suspension_requires_boards_feature() {
        assert!(!monitor(Board::Cold, false).probed(true));
        assert!(monitor(Board::Cold, false).probed(false));
        assert!(monitor(Board::Secondary, false).probed(true));
    }

    #[test]
    fn id_omits_empty_model() {
        let mut m = monitor(Board::Hot, false);
        assert_eq!(m.id(), "demo/cc/vip");
        m.key.model = "m1".into();
        assert_eq!(m.id(), "demo/cc/vip/m1");
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn sponsor_levels_are_ordered() {
        assert!(SponsorLevel::Enterprise > SponsorLevel::Advanced);
        assert!(SponsorLevel::Advanced > SponsorLevel::Basic);
        assert!(SponsorLevel::Basic > SponsorLevel::None);
    }
}
