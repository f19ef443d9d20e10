//! Validation pass: structural checks over the raw fleet document.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use relaymon_core::{Board, Category, HttpMethod, SponsorLevel};
use url::Url;

use crate::document::{FleetDocument, MonitorSpec};
use crate::error::ConfigError;

/// Maps each referenced channel triple to the index of the monitor acting
/// as the group root for that triple.
#[derive(Debug, Default)]
pub struct ParentIndex {
    by_triple: HashMap<String, usize>,
}

impl ParentIndex {
    /// Index of the root monitor for a triple, when one was resolved.
    #[must_use]
    pub fn root_of(&self, triple: &str) -> Option<usize> {
        self.by_triple.get(triple).copied()
    }
}

/// Run the validation pass.
///
/// Mutates the document only in step (0): children with empty path segments
/// receive the segments of their declared parent path. Every other rule is
/// read-only and fails with the first violation.
pub fn validate(
    doc: &mut FleetDocument,
    warnings: &mut Vec<String>,
) -> Result<ParentIndex, ConfigError> {
    // (0) Fill child path segments from the parent path; reject overrides.
    for monitor in &mut doc.monitors {
        let Some(parent) = monitor.parent.clone() else {
            continue;
        };
        let segments: Vec<&str> = parent.split('/').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::InvalidField {
                monitor: monitor.display_key(),
                message: format!("parent path {parent:?} must be provider/service/channel"),
            });
        }
        fill_segment(monitor, "provider", segments[0], &parent)?;
        fill_segment(monitor, "service", segments[1], &parent)?;
        fill_segment(monitor, "channel", segments[2], &parent)?;
    }

    // (1) Quadruple uniqueness.
    let mut seen = HashSet::new();
    for monitor in &doc.monitors {
        if !seen.insert(monitor.display_key()) {
            return Err(ConfigError::DuplicateKey(monitor.display_key()));
        }
    }

    // (2) Build the parent index over referenced triples. A triple's root is
    // the first declared monitor on that triple without a `parent` of its
    // own; when only children carry the triple, the first child stands in so
    // the cycle check below can reject the loop.
    let referenced: HashSet<String> = doc
        .monitors
        .iter()
        .filter_map(|m| m.parent.as_ref())
        .cloned()
        .collect();

    let mut index = ParentIndex::default();
    for triple in &referenced {
        let on_triple: Vec<usize> = doc
            .monitors
            .iter()
            .enumerate()
            .filter(|(_, m)| &m.triple() == triple)
            .map(|(i, _)| i)
            .collect();
        let roots: Vec<usize> = on_triple
            .iter()
            .copied()
            .filter(|&i| doc.monitors[i].parent.is_none())
            .collect();

        let root = match roots.as_slice() {
            [] => {
                let Some(&first) = on_triple.first() else {
                    let child = doc
                        .monitors
                        .iter()
                        .find(|m| m.parent.as_deref() == Some(triple))
                        .map_or_else(|| triple.clone(), MonitorSpec::display_key);
                    return Err(ConfigError::ParentNotFound {
                        monitor: child,
                        parent: triple.clone(),
                    });
                };
                first
            }
            [only] => *only,
            [first, ..] => {
                warnings.push(format!(
                    "multiple parents declared for {triple}; using {}",
                    doc.monitors[*first].display_key()
                ));
                *first
            }
        };

        // (3) A monitor anchoring a group must carry its own model.
        if doc.monitors[root].model.is_empty() {
            let child = doc
                .monitors
                .iter()
                .find(|m| m.parent.as_deref() == Some(triple.as_str()))
                .map_or_else(|| triple.clone(), MonitorSpec::display_key);
            return Err(ConfigError::ParentWithoutModel {
                monitor: child,
                parent: triple.clone(),
            });
        }

        index.by_triple.insert(triple.clone(), root);
    }

    // (4) Cycle rejection: DFS with three-color marking over child → root
    // edges.
    detect_cycles(doc, &index)?;

    // (5) Field-level checks.
    for monitor in &doc.monitors {
        check_fields(monitor, warnings)?;
    }

    Ok(index)
}

fn fill_segment(
    monitor: &mut MonitorSpec,
    field: &'static str,
    value: &str,
    parent: &str,
) -> Result<(), ConfigError> {
    let slot = match field {
        "provider" => &mut monitor.provider,
        "service" => &mut monitor.service,
        _ => &mut monitor.channel,
    };
    if slot.is_empty() {
        *slot = value.to_owned();
        return Ok(());
    }
    if slot != value {
        let current = slot.clone();
        return Err(ConfigError::ParentMismatch {
            monitor: monitor.display_key(),
            field,
            value: current,
            parent: parent.to_owned(),
        });
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

fn detect_cycles(doc: &FleetDocument, index: &ParentIndex) -> Result<(), ConfigError> {
    let mut colors = vec![Color::White; doc.monitors.len()];
    for start in 0..doc.monitors.len() {
        if colors[start] != Color::White {
            continue;
        }
        let mut node = start;
        let mut path = Vec::new();
        loop {
            colors[node] = Color::Gray;
            path.push(node);
            let next = doc.monitors[node]
                .parent
                .as_ref()
                .and_then(|t| index.root_of(t));
            match next {
                Some(next) if colors[next] == Color::Gray => {
                    return Err(ConfigError::ParentCycle(doc.monitors[next].display_key()));
                }
                Some(next) if colors[next] == Color::White => node = next,
                _ => break,
            }
        }
        for visited in path {
            colors[visited] = Color::Black;
        }
    }
    Ok(())
}

fn check_fields(monitor: &MonitorSpec, warnings: &mut Vec<String>) -> Result<(), ConfigError> {
    let key = monitor.display_key();
    let invalid = |message: String| ConfigError::InvalidField {
        monitor: key.clone(),
        message,
    };

    if let Some(ref method) = monitor.method {
        method.parse::<HttpMethod>().map_err(&invalid)?;
    }
    if let Some(ref category) = monitor.category {
        category.parse::<Category>().map_err(&invalid)?;
    }
    if let Some(ref level) = monitor.sponsor_level {
        level.parse::<SponsorLevel>().map_err(&invalid)?;
    }
    if let Some(ref board) = monitor.board {
        board.parse::<Board>().map_err(&invalid)?;
    }

    for (field, price) in [("price_min", monitor.price_min), ("price_max", monitor.price_max)] {
        if let Some(p) = price
            && p < 0.0
        {
            return Err(ConfigError::OutOfRange {
                monitor: key.clone(),
                field,
                message: format!("{p} is negative"),
            });
        }
    }
    if let Some(jitter) = monitor.retry_jitter
        && !(0.0..=1.0).contains(&jitter)
    {
        return Err(ConfigError::OutOfRange {
            monitor: key,
            field: "retry_jitter",
            message: format!("{jitter} outside [0, 1]"),
        });
    }
    if let Some(ref date) = monitor.listed_since {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| ConfigError::InvalidField {
            monitor: monitor.display_key(),
            message: format!("listed_since {date:?}: {e}"),
        })?;
    }

    if let Some(ref raw) = monitor.url {
        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
            monitor: monitor.display_key(),
            field: "url",
            message: e.to_string(),
        })?;
        match url.scheme() {
            "https" => {}
            "http" => warnings.push(format!(
                "{}: url {raw} is not HTTPS",
                monitor.display_key()
            )),
            other => {
                return Err(ConfigError::InvalidUrl {
                    monitor: monitor.display_key(),
                    field: "url",
                    message: format!("scheme {other:?} not allowed"),
                });
            }
        }
    }

    if let Some(ref raw) = monitor.proxy {
        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
            monitor: monitor.display_key(),
            field: "proxy",
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https" | "socks5") {
            return Err(ConfigError::InvalidUrl {
                monitor: monitor.display_key(),
                field: "proxy",
                message: format!("scheme {:?} not allowed", url.scheme()),
            });
        }
        if url.host_str().is_none() || url.port_or_known_default().is_none() {
            return Err(ConfigError::InvalidUrl {
                monitor: monitor.display_key(),
                field: "proxy",
                message: "host:port required".into(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(provider: &str, channel: &str, model: &str) -> MonitorSpec {
        MonitorSpec {
            provider: provider.into(),
            service: "cc".into(),
            channel: channel.into(),
            model: model.into(),
            ..MonitorSpec::default()
        }
    }

    #[test]
    fn child_segments_filled_from_parent_path() {
        let mut doc = FleetDocument {
            monitors: vec![
                spec("demo", "vip", "m0"),
                MonitorSpec {
                    model: "m1".into(),
                    parent: Some("demo/cc/vip".into()),
                    ..MonitorSpec::default()
                },
            ],
            ..FleetDocument::default()
        };
        let mut warnings = Vec::new();
        let index = validate(&mut doc, &mut warnings).expect("valid");
        assert_eq!(doc.monitors[1].provider, "demo");
        assert_eq!(doc.monitors[1].channel, "vip");
        assert_eq!(index.root_of("demo/cc/vip"), Some(0));
    }

    #[test]
    fn explicit_segment_mismatch_rejected() {
        let mut doc = FleetDocument {
            monitors: vec![
                spec("demo", "vip", "m0"),
                MonitorSpec {
                    provider: "other".into(),
                    model: "m1".into(),
                    parent: Some("demo/cc/vip".into()),
                    ..MonitorSpec::default()
                },
            ],
            ..FleetDocument::default()
        };
        let err = validate(&mut doc, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ParentMismatch { .. }));
    }

    #[test]
    fn duplicate_quadruple_rejected() {
        let mut doc = FleetDocument {
            monitors: vec![spec("demo", "vip", "m0"), spec("demo", "vip", "m0")],
            ..FleetDocument::default()
        };
        let err = validate(&mut doc, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateKey(_)));
    }

    #[test]
    fn missing_parent_rejected() {
        let mut doc = FleetDocument {
            monitors: vec![MonitorSpec {
                model: "m1".into(),
                parent: Some("demo/cc/vip".into()),
                ..MonitorSpec::default()
            }],
            ..FleetDocument::default()
        };
        let err = validate(&mut doc, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ParentNotFound { .. }));
    }

    #[test]
    fn parent_without_model_rejected() {
        let mut doc = FleetDocument {
            monitors: vec![
                spec("demo", "vip", ""),
                MonitorSpec {
                    model: "m1".into(),
                    parent: Some("demo/cc/vip".into()),
                    ..MonitorSpec::default()
                },
            ],
            ..FleetDocument::default()
        };
        let err = validate(&mut doc, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ParentWithoutModel { .. }));
    }

    #[test]
    fn all_children_triple_forms_cycle() {
        // Two children reference their own triple; no root exists, so the
        // stand-in root is itself a child and the DFS finds the loop.
        let mut doc = FleetDocument {
            monitors: vec![
                MonitorSpec {
                    model: "m1".into(),
                    parent: Some("demo/cc/vip".into()),
                    ..MonitorSpec::default()
                },
                MonitorSpec {
                    model: "m2".into(),
                    parent: Some("demo/cc/vip".into()),
                    ..MonitorSpec::default()
                },
            ],
            ..FleetDocument::default()
        };
        let err = validate(&mut doc, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ParentCycle(_)));
    }

    #[test]
    fn multiple_roots_warn_first_wins() {
        let mut doc = FleetDocument {
            monitors: vec![
                spec("demo", "vip", "m0"),
                spec("demo", "vip", "m0b"),
                MonitorSpec {
                    model: "m1".into(),
                    parent: Some("demo/cc/vip".into()),
                    ..MonitorSpec::default()
                },
            ],
            ..FleetDocument::default()
        };
        let mut warnings = Vec::new();
        let index = validate(&mut doc, &mut warnings).expect("valid");
        assert_eq!(index.root_of("demo/cc/vip"), Some(0));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn bad_enum_and_bounds_rejected() {
        for bad in [
            MonitorSpec {
                method: Some("TRACE".into()),
                ..spec("demo", "vip", "")
            },
            MonitorSpec {
                board: Some("warm".into()),
                ..spec("demo", "vip", "")
            },
            MonitorSpec {
                retry_jitter: Some(1.5),
                ..spec("demo", "vip", "")
            },
            MonitorSpec {
                price_min: Some(-1.0),
                ..spec("demo", "vip", "")
            },
            MonitorSpec {
                listed_since: Some("01/02/2026".into()),
                ..spec("demo", "vip", "")
            },
            MonitorSpec {
                url: Some("ftp://example.com".into()),
                ..spec("demo", "vip", "")
            },
            MonitorSpec {
                proxy: Some("socks4://example.com:1080".into()),
                ..spec("demo", "vip", "")
            },
        ] {
            let mut doc = FleetDocument {
                monitors: vec![bad],
                ..FleetDocument::default()
            };
            assert!(validate(&mut doc, &mut Vec::new()).is_err());
        }
    }

    #[test]
    fn plain_http_url_warns() {
        let mut doc = FleetDocument {
            monitors: vec![MonitorSpec {
                url: Some("http://example.com/probe".into()),
                ..spec("demo", "vip", "")
            }],
            ..FleetDocument::default()
        };
        let mut warnings = Vec::new();
        validate(&mut doc, &mut warnings).expect("valid");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("not HTTPS"));
    }
}
