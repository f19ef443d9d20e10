//! Request fingerprints: the cache identity of a status query.

use sha2::{Digest, Sha256};

use relaymon_core::{Board, Period};

/// Board selection of a status query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoardFilter {
    #[default]
    Hot,
    Secondary,
    Cold,
    All,
}

impl BoardFilter {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Secondary => "secondary",
            Self::Cold => "cold",
            Self::All => "all",
        }
    }

    /// Whether a monitor's board passes the filter.
    #[must_use]
    pub fn matches(self, board: Board) -> bool {
        match self {
            Self::All => true,
            Self::Hot => board == Board::Hot,
            Self::Secondary => board == Board::Secondary,
            Self::Cold => board == Board::Cold,
        }
    }
}

impl std::str::FromStr for BoardFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(Self::Hot),
            "secondary" => Ok(Self::Secondary),
            "cold" => Ok(Self::Cold),
            "all" => Ok(Self::All),
            other => Err(format!("unknown board filter: {other}")),
        }
    }
}

/// The parameter tuple determining a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub period: Period,
    pub align_hour: bool,
    pub time_filter: Option<String>,
    pub board: BoardFilter,
    pub include_hidden: bool,
}

impl Fingerprint {
    /// Stable cache key: SHA-256 over the canonical parameter string.
    #[must_use]
    pub fn key(&self) -> String {
        let canonical = format!(
            "period={};align={};filter={};board={};hidden={}",
            self.period,
            self.align_hour,
            self.time_filter.as_deref().unwrap_or(""),
            self.board.as_str(),
            self.include_hidden,
        );
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(period: Period, filter: Option<&str>) -> Fingerprint {
        Fingerprint {
            period,
            align_hour: false,
            time_filter: filter.map(str::to_owned),
            board: BoardFilter::Hot,
            include_hidden: false,
        }
    }

    #[test]
    fn identical_queries_share_a_key() {
        assert_eq!(fp(Period::Hour24, None).key(), fp(Period::Hour24, None).key());
    }

    #[test]
    fn any_parameter_changes_the_key() {
        let base = fp(Period::Hour24, None);
        assert_ne!(base.key(), fp(Period::Day7, None).key());
        assert_ne!(base.key(), fp(Period::Hour24, Some("09:00-18:00")).key());

        let mut hidden = fp(Period::Hour24, None);
        hidden.include_hidden = true;
        assert_ne!(base.key(), hidden.key());

        let mut aligned = fp(Period::Hour24, None);
        aligned.align_hour = true;
        assert_ne!(base.key(), aligned.key());

        let mut cold = fp(Period::Hour24, None);
        cold.board = BoardFilter::Cold;
        assert_ne!(base.key(), cold.key());
    }

    #[test]
    fn board_filter_matching() {
        assert!(BoardFilter::All.matches(Board::Cold));
        assert!(BoardFilter::Hot.matches(Board::Hot));
        assert!(!BoardFilter::Hot.matches(Board::Secondary));
        assert!(BoardFilter::Cold.matches(Board::Cold));
    }
}
