use serde::{Deserialize, Serialize};

/// Identity of a monitored target.
///
/// A target is the quadruple `(provider, service, channel, model)`. The
/// `model` segment is empty for a single-layer ("parent") monitor; children
/// in a multi-model group carry a non-empty model and share the triple of
/// their parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorKey {
    pub provider: String,
    pub service: String,
    pub channel: String,
    /// Empty for parent (single-layer) monitors.
    #[serde(default)]
    pub model: String,
}

impl MonitorKey {
    /// Create a new monitor key.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        service: impl Into<String>,
        channel: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            service: service.into(),
            channel: channel.into(),
            model: model.into(),
        }
    }

    /// Return the canonical string form: `provider/service/channel/model`.
    ///
    /// The trailing segment is empty for parents, so the canonical form of a
    /// parent ends in `/`. This keeps parent and child keys distinct even
    /// when a child model happens to equal another channel name.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.provider, self.service, self.channel, self.model
        )
    }

    /// Return the channel triple `provider/service/channel` shared by every
    /// layer of a multi-model group.
    #[must_use]
    pub fn channel_key(&self) -> String {
        format!("{}/{}/{}", self.provider, self.service, self.channel)
    }

    /// Whether this key addresses a parent (single-layer) monitor.
    #[must_use]
    pub fn is_parent(&self) -> bool {
        self.model.is_empty()
    }

    /// Parse a canonical `provider/service/channel[/model]` string.
    ///
    /// Returns `None` when the path does not have three or four segments or
    /// when any of the first three segments is empty.
    #[must_use]
    pub fn parse(path: &str) -> Option<Self> {
        let mut parts = path.split('/');
        let provider = parts.next()?;
        let service = parts.next()?;
        let channel = parts.next()?;
        let model = parts.next().unwrap_or("");
        if parts.next().is_some() {
            return None;
        }
        if provider.is_empty() || service.is_empty() || channel.is_empty() {
            return None;
        }
        Some(Self::new(provider, service, channel, model))
    }
}

impl std::fmt::Display for MonitorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_roundtrip() {
        let key = MonitorKey::new("demo", "cc", "vip", "m1");
        assert_eq!(key.canonical(), "demo/cc/vip/m1");
        assert_eq!(MonitorKey::parse("demo/cc/vip/m1"), Some(key));
    }

    #[test]
    fn parent_key_has_empty_model() {
        let key = MonitorKey::new("demo", "cc", "vip", "");
        assert!(key.is_parent());
        assert_eq!(key.canonical(), "demo/cc/vip/");
        assert_eq!(key.channel_key(), "demo/cc/vip");
    }

    #[test]
    fn parse_triple_form() {
        let key = MonitorKey::parse("demo/cc/vip").expect("triple parses");
        assert!(key.is_parent());
    }

    #[test]
    fn parse_rejects_bad_paths() {
        assert!(MonitorKey::parse("demo/cc").is_none());
        assert!(MonitorKey::parse("demo//vip").is_none());
        assert!(MonitorKey::parse("a/b/c/d/e").is_none());
    }
}
