//! Sponsor pin computation.
//!
//! The pin configuration travels to the client in `meta`; the server uses
//! the same rules to float pinned monitors to the front of its own initial
//! ordering so both sides agree.

use relaymon_core::{Board, SponsorLevel};
use relaymon_config::SponsorPinConfig;

/// What pin eligibility needs to know about one monitor or group.
#[derive(Debug, Clone)]
pub struct PinCandidate {
    pub id: String,
    pub sponsor: Option<String>,
    pub level: SponsorLevel,
    pub uptime: f64,
    pub board: Board,
}

/// Ids selected for pinning, in pin order.
///
/// Eligibility: sponsor level at or above the floor, uptime at or above
/// the floor, and not on the cold board. Per-sponsor budgets scale with
/// tier; ties break on higher level, then higher uptime, then
/// lexicographic id.
#[must_use]
pub fn compute_pins(candidates: &[PinCandidate], config: &SponsorPinConfig) -> Vec<String> {
    let mut eligible: Vec<&PinCandidate> = candidates
        .iter()
        .filter(|c| {
            c.sponsor.is_some()
                && c.level >= config.min_level
                && c.level > SponsorLevel::None
                && c.uptime >= config.min_uptime
                && c.board != Board::Cold
        })
        .collect();

    eligible.sort_by(|a, b| {
        b.level
            .cmp(&a.level)
            .then_with(|| b.uptime.partial_cmp(&a.uptime).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut used: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
    let mut pinned = Vec::new();
    for candidate in eligible {
        if pinned.len() >= config.max_pinned as usize {
            break;
        }
        let sponsor = candidate.sponsor.as_deref().unwrap_or_default();
        let service_count = config.service_count.get(sponsor).copied().unwrap_or(1);
        let budget = match candidate.level {
            SponsorLevel::Enterprise => service_count,
            SponsorLevel::Advanced => service_count.saturating_sub(1).max(1),
            SponsorLevel::Basic => 1,
            SponsorLevel::None => 0,
        };
        let slot = used.entry(sponsor).or_insert(0);
        if *slot >= budget {
            continue;
        }
        *slot += 1;
        pinned.push(candidate.id.clone());
    }
    pinned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, sponsor: &str, level: SponsorLevel, uptime: f64) -> PinCandidate {
        PinCandidate {
            id: id.into(),
            sponsor: Some(sponsor.into()),
            level,
            uptime,
            board: Board::Hot,
        }
    }

    fn config() -> SponsorPinConfig {
        SponsorPinConfig {
            min_level: SponsorLevel::Basic,
            min_uptime: 95.0,
            service_count: [("acme".to_owned(), 3u32)].into_iter().collect(),
            max_pinned: 4,
        }
    }

    #[test]
    fn floors_exclude_candidates() {
        let pins = compute_pins(
            &[
                candidate("a", "acme", SponsorLevel::None, 99.0),
                candidate("b", "acme", SponsorLevel::Basic, 90.0),
                PinCandidate {
                    board: Board::Cold,
                    ..candidate("c", "acme", SponsorLevel::Enterprise, 99.0)
                },
            ],
            &config(),
        );
        assert!(pins.is_empty());
    }

    #[test]
    fn tier_budgets_apply_per_sponsor() {
        // Enterprise sponsor "acme" has service_count 3 and may pin 3;
        // a fourth acme candidate is skipped.
        let pins = compute_pins(
            &[
                candidate("a1", "acme", SponsorLevel::Enterprise, 99.0),
                candidate("a2", "acme", SponsorLevel::Enterprise, 98.0),
                candidate("a3", "acme", SponsorLevel::Enterprise, 97.0),
                candidate("a4", "acme", SponsorLevel::Enterprise, 96.0),
            ],
            &config(),
        );
        assert_eq!(pins, vec!["a1", "a2", "a3"]);
    }

    #[test]
    fn advanced_budget_is_one_less_floored_at_one() {
        let mut cfg = config();
        cfg.service_count.insert("beta".into(), 1);
        let pins = compute_pins(
            &[
                candidate("b1", "beta", SponsorLevel::Advanced, 99.0),
                candidate("b2", "beta", SponsorLevel::Advanced, 98.0),
            ],
            &cfg,
        );
        // max(1, 1-1) = 1 slot.
        assert_eq!(pins, vec!["b1"]);
    }

    #[test]
    fn tie_break_level_then_uptime_then_id() {
        let pins = compute_pins(
            &[
                candidate("z", "acme", SponsorLevel::Basic, 99.0),
                candidate("m", "beta", SponsorLevel::Enterprise, 96.0),
                candidate("a", "gamma", SponsorLevel::Basic, 99.0),
                candidate("k", "delta", SponsorLevel::Basic, 99.5),
            ],
            &config(),
        );
        // Enterprise first, then by uptime, then id for the 99.0 tie.
        assert_eq!(pins, vec!["m", "k", "a", "z"]);
    }

    #[test]
    fn global_budget_caps_total_pins() {
        let mut cfg = config();
        cfg.max_pinned = 2;
        let pins = compute_pins(
            &[
                candidate("a", "s1", SponsorLevel::Enterprise, 99.0),
                candidate("b", "s2", SponsorLevel::Enterprise, 98.0),
                candidate("c", "s3", SponsorLevel::Enterprise, 97.0),
            ],
            &cfg,
        );
        assert_eq!(pins.len(), 2);
    }
}
