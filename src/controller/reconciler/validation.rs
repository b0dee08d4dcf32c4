//! # Validation
//!
//! Parsing and validation of the duration strings used by the CRD and CLI.

use anyhow::Result;
use regex::Regex;
use std::time::Duration;

/// Upper bound on accepted durations: 36500 days, roughly a century.
/// Keeps expiry arithmetic on issued tokens within timestamp range.
const MAX_DURATION_SECS: u64 = 36_500 * 86_400;

/// Parse a Kubernetes-style duration string into a `Duration`
/// Supports formats: "30s", "5m", "12h", "30d"
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let trimmed = duration_str.trim();

    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    // <number><unit> with unit one of s, m, h, d (case insensitive)
    let duration_regex = Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    let lowered = trimmed.to_lowercase();
    let captures = duration_regex.captures(&lowered).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid duration format '{}'. Expected format: <number><unit> (e.g., '30s', '5m', '12h', '30d')",
            trimmed
        )
    })?;

    let number: u64 = captures
        .name("number")
        .map(|m| m.as_str())
        .unwrap_or_default()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid duration number in '{trimmed}': {e}"))?;

    if number == 0 {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{trimmed}'"
        ));
    }

    let unit_seconds = match captures.name("unit").map(|m| m.as_str()).unwrap_or_default() {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        unit => {
            return Err(anyhow::anyhow!(
                "Invalid unit '{unit}' in duration '{trimmed}'. Expected: s, m, h, or d"
            ));
        }
    };

    let seconds = number
        .checked_mul(unit_seconds)
        .filter(|&total| total <= MAX_DURATION_SECS)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Duration '{trimmed}' is out of range; the maximum supported duration is 36500d"
            )
        })?;

    Ok(Duration::from_secs(seconds))
}

/// Parse a declared token lifetime into whole seconds
///
/// An empty string or a bare "0" means the token never expires and yields
/// zero. Any other value must be a valid duration string; a malformed
/// lifetime is an error the caller reports against the offending user.
pub fn parse_token_lifetime(lifetime: &str) -> Result<u64> {
    let trimmed = lifetime.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return Ok(0);
    }
    Ok(parse_duration(trimmed)?.as_secs())
}
