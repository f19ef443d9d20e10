//! Parsing of human-readable duration strings.
//!
//! The fleet document expresses timings as strings such as `"300ms"`,
//! `"5s"`, `"1m"`, `"1h"`, or compound forms like `"1m30s"`. Fractional
//! values (`"1.5s"`) are accepted per segment.

use std::time::Duration;

/// Parse a duration string into a [`Duration`].
///
/// Supported units: `ms`, `s`, `m`, `h`, `d`. Segments concatenate
/// (`"1h30m"`). Returns `Err` with a short description on empty input,
/// unknown units, or trailing garbage.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".into());
    }

    let mut total_ms = 0.0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| format!("missing unit in {input:?}"))?;
        if digits_end == 0 {
            return Err(format!("expected number in {input:?}"));
        }
        let value: f64 = rest[..digits_end]
            .parse()
            .map_err(|_| format!("bad number in {input:?}"))?;
        rest = &rest[digits_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        let multiplier_ms = match unit {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            "d" => 86_400_000.0,
            other => return Err(format!("unknown unit {other:?} in {input:?}")),
        };
        total_ms += value * multiplier_ms;
    }

    if !total_ms.is_finite() || total_ms < 0.0 {
        return Err(format!("duration out of range: {input:?}"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(Duration::from_millis(total_ms.round() as u64))
}

/// Render a [`Duration`] back to the canonical string form used when
/// re-serializing normalized documents.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms == 0 {
        return "0s".into();
    }
    if ms % 3_600_000 == 0 {
        return format!("{}h", ms / 3_600_000);
    }
    if ms % 60_000 == 0 {
        return format!("{}m", ms / 60_000);
    }
    if ms % 1_000 == 0 {
        return format!("{}s", ms / 1_000);
    }
    format!("{ms}ms")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
    }

    #[test]
    fn parses_compound_forms() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(
            parse_duration("1h15m30s").unwrap(),
            Duration::from_secs(4530)
        );
    }

    #[test]
    fn parses_fractional_values() {
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("0.5m").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("10s trailing").is_err());
    }

    #[test]
    fn format_roundtrips_common_values() {
        for s in ["300ms", "5s", "90s", "1m", "1h"] {
            let d = parse_duration(s).unwrap();
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }
}
