//! Parsing of the human-readable quantities used in service configuration:
//! CPU (`"0.25 vCPU"`), memory and storage (`"4 GB"`), durations
//! (`"30 seconds"`) and log retention periods (`"1 month"`).

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::error::ConfigurationError;

static VCPU_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*vCPU\s*$").expect("valid regex"));

static GB_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*GB\s*$").expect("valid regex"));

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*(second|seconds|minute|minutes|hour|hours|day|days)\s*$")
        .expect("valid regex")
});

/// Retention periods accepted by `logging.retention`, with their length in days.
/// `forever` maps to 0, meaning logs never expire.
pub const RETENTION_PERIODS: [(&str, u32); 23] = [
    ("1 day", 1),
    ("3 days", 3),
    ("5 days", 5),
    ("1 week", 7),
    ("2 weeks", 14),
    ("1 month", 30),
    ("2 months", 60),
    ("3 months", 90),
    ("4 months", 120),
    ("5 months", 150),
    ("6 months", 180),
    ("1 year", 365),
    ("13 months", 400),
    ("18 months", 545),
    ("2 years", 731),
    ("3 years", 1096),
    ("5 years", 1827),
    ("6 years", 2192),
    ("7 years", 2557),
    ("8 years", 2922),
    ("9 years", 3288),
    ("10 years", 3653),
    ("forever", 0),
];

pub const DEFAULT_RETENTION: &str = "1 month";

/// Scale a decimal quantity by 1024, rejecting values that do not land on a whole unit.
fn scaled_by_1024(raw: &str, number: &str) -> Result<u32, ConfigurationError> {
    let value: f64 = number
        .parse()
        .map_err(|_| ConfigurationError::InvalidSize(raw.to_string()))?;
    let scaled = value * 1024.0;
    if scaled <= 0.0 || scaled.fract() != 0.0 || scaled > u32::MAX as f64 {
        return Err(ConfigurationError::InvalidSize(raw.to_string()));
    }
    Ok(scaled as u32)
}

/// Parse `"0.25 vCPU"` into CPU units (1 vCPU = 1024 units).
pub fn parse_vcpu(raw: &str) -> Result<u32, ConfigurationError> {
    let caps = VCPU_PATTERN
        .captures(raw)
        .ok_or_else(|| ConfigurationError::InvalidSize(raw.to_string()))?;
    scaled_by_1024(raw, &caps[1])
}

/// Parse `"0.5 GB"` into MiB (1 GB = 1024 MiB).
pub fn parse_gb(raw: &str) -> Result<u32, ConfigurationError> {
    let caps = GB_PATTERN
        .captures(raw)
        .ok_or_else(|| ConfigurationError::InvalidSize(raw.to_string()))?;
    scaled_by_1024(raw, &caps[1])
}

/// Render a number of 1/1024 units the way users write it: `1`, `0.25`, `0.5`.
pub fn format_scaled(units: u32) -> String {
    let value = units as f64 / 1024.0;
    if value.fract() == 0.0 {
        format!("{}", value as u64)
    } else {
        format!("{}", value)
    }
}

/// Parse `"30 seconds"`, `"5 minutes"`, `"1 hour"` or `"1 day"`.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigurationError> {
    let caps = DURATION_PATTERN
        .captures(raw)
        .ok_or_else(|| ConfigurationError::InvalidDuration(raw.to_string()))?;
    let amount: u64 = caps[1]
        .parse()
        .map_err(|_| ConfigurationError::InvalidDuration(raw.to_string()))?;
    let unit_secs = match &caps[2] {
        "second" | "seconds" => 1,
        "minute" | "minutes" => 60,
        "hour" | "hours" => 3600,
        _ => 86_400,
    };
    let secs = amount
        .checked_mul(unit_secs)
        .ok_or_else(|| ConfigurationError::InvalidDuration(raw.to_string()))?;
    Ok(Duration::from_secs(secs))
}

/// Parse an optional duration, falling back to `default_secs`.
pub fn parse_duration_or(raw: Option<&str>, default_secs: u64) -> Result<Duration, ConfigurationError> {
    match raw {
        Some(raw) => parse_duration(raw),
        None => Ok(Duration::from_secs(default_secs)),
    }
}

pub fn format_duration(duration: &Duration) -> String {
    match duration.as_secs() {
        1 => "1 second".to_string(),
        secs => format!("{} seconds", secs),
    }
}

/// Look up a retention period, returning its length in days.
pub fn retention_days(raw: &str) -> Result<u32, ConfigurationError> {
    RETENTION_PERIODS
        .iter()
        .find(|(name, _)| *name == raw.trim())
        .map(|(_, days)| *days)
        .ok_or_else(|| ConfigurationError::InvalidRetention(raw.to_string()))
}

/// Serde adapter rendering durations as `"30 seconds"`.
pub mod human_duration {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vcpu() {
        assert_eq!(parse_vcpu("0.25 vCPU"), Ok(256));
        assert_eq!(parse_vcpu("1 vCPU"), Ok(1024));
        assert_eq!(parse_vcpu("16 vCPU"), Ok(16384));
        assert!(parse_vcpu("1 cpu").is_err());
        assert!(parse_vcpu("0 vCPU").is_err());
    }

    #[test]
    fn test_parse_gb() {
        assert_eq!(parse_gb("0.5 GB"), Ok(512));
        assert_eq!(parse_gb("4 GB"), Ok(4096));
        assert!(parse_gb("4GiB").is_err());
        assert!(parse_gb("0.0001 GB").is_err());
    }

    #[test]
    fn test_format_scaled() {
        assert_eq!(format_scaled(256), "0.25");
        assert_eq!(format_scaled(512), "0.5");
        assert_eq!(format_scaled(2048), "2");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30 seconds"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("5 minutes"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1 hour"), Ok(Duration::from_secs(3600)));
        assert!(matches!(
            parse_duration("soon"),
            Err(ConfigurationError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert_eq!(
            parse_duration("1000000000000000000 days"),
            Err(ConfigurationError::InvalidDuration(
                "1000000000000000000 days".to_string()
            ))
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(&Duration::from_secs(30)), "30 seconds");
        assert_eq!(format_duration(&Duration::from_secs(1)), "1 second");
    }

    #[test]
    fn test_retention_days() {
        assert_eq!(retention_days("1 month"), Ok(30));
        assert_eq!(retention_days("forever"), Ok(0));
        assert!(retention_days("11 days").is_err());
    }
}
