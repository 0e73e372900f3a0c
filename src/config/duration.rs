//! # Duration Parsing
//!
//! Handles parsing duration strings such as the sync period.
//!
//! A duration is a sequence of `<number><unit>` segments, as accepted by Go's
//! `time.ParseDuration`, plus a `d` (day) unit: `30s`, `1h30m`, `1.5h`,
//! `500ms`, `1d12h`.

use anyhow::Result;
use regex::Regex;
use std::time::Duration;

const NUMBER: &str = r"(?:\d+(?:\.\d*)?|\.\d+)";
// Longer units first, `ms` must win over `m`
const UNIT: &str = "(?:ns|us|µs|ms|s|m|h|d)";

/// Parse a duration string into std::time::Duration
/// Supports formats: "30s", "5m", "10h", "1d", "1h30m", "1.5h", "500ms"
/// Returns Duration or error if format is invalid
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let duration_regex = Regex::new(&format!("^(?:{NUMBER}{UNIT})+$"))
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;
    let segment_regex = Regex::new(&format!("(?P<number>{NUMBER})(?P<unit>{UNIT})"))
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    let interval_lower = duration_trimmed.to_lowercase();
    if !duration_regex.is_match(&interval_lower) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{duration_trimmed}'. Expected a sequence of <number><unit> (e.g., '30s', '10h', '1h30m')"
        ));
    }

    // Summed in nanoseconds, so `500ms` and `0.5s` stay exact
    let mut nanoseconds = 0.0_f64;
    for captures in segment_regex.captures_iter(&interval_lower) {
        let (Some(number_match), Some(unit_match)) =
            (captures.name("number"), captures.name("unit"))
        else {
            return Err(anyhow::anyhow!(
                "Failed to extract number and unit from duration '{duration_trimmed}'"
            ));
        };

        let number: f64 = number_match.as_str().parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid duration number '{}' in '{duration_trimmed}': {e}",
                number_match.as_str()
            )
        })?;

        let unit_nanoseconds = match unit_match.as_str() {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "d" => 86400e9,
            unit => {
                return Err(anyhow::anyhow!(
                    "Invalid unit '{unit}' in duration '{duration_trimmed}'. Expected: ns, us, ms, s, m, h, or d"
                ));
            }
        };

        nanoseconds += number * unit_nanoseconds;
    }

    let duration = Duration::try_from_secs_f64(nanoseconds / 1e9)
        .map_err(|e| anyhow::anyhow!("Duration '{duration_trimmed}' is out of range: {e}"))?;

    if duration.is_zero() {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{duration_trimmed}'"
        ));
    }

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kubernetes_duration_units() {
        assert_eq!(parse_kubernetes_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_kubernetes_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_kubernetes_duration("10h").unwrap(), Duration::from_secs(36000));
        assert_eq!(parse_kubernetes_duration("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_kubernetes_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_compound_and_fractional_durations() {
        assert_eq!(parse_kubernetes_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_kubernetes_duration("90m30s").unwrap(), Duration::from_secs(5430));
        assert_eq!(parse_kubernetes_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_kubernetes_duration("1d12h").unwrap(), Duration::from_secs(129_600));
        assert_eq!(parse_kubernetes_duration("1m0.5s").unwrap(), Duration::from_millis(60_500));
    }

    #[test]
    fn test_parse_kubernetes_duration_is_case_insensitive() {
        assert_eq!(parse_kubernetes_duration(" 2H ").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_kubernetes_duration_rejects_malformed() {
        assert!(parse_kubernetes_duration("").is_err());
        assert!(parse_kubernetes_duration("0s").is_err());
        assert!(parse_kubernetes_duration("0h0m").is_err());
        assert!(parse_kubernetes_duration("10").is_err());
        assert!(parse_kubernetes_duration("1h 30m").is_err());
        assert!(parse_kubernetes_duration("h").is_err());
        assert!(parse_kubernetes_duration("-5m").is_err());
        assert!(parse_kubernetes_duration("1y").is_err());
        assert!(parse_kubernetes_duration("99999999999999999999d").is_err());
    }
}
