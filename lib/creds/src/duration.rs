//! Human-readable durations ("500ms", "5s", "1m", "2h", "1d") for configuration files.

use serde::{Deserialize, Deserializer, Serializer, de};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DurationError {
    #[error("duration {0:?} must end with ms, s, m, h or d")]
    MissingUnit(String),

    #[error("invalid number in duration {0:?}")]
    InvalidNumber(String),

    #[error("duration {0:?} is too large")]
    Overflow(String),
}

/// Parses `"<n><unit>"`. A bare `"0"` is accepted as zero.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let s = s.trim().to_lowercase();
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let (num, unit_millis) = if let Some(num) = s.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1_000)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60 * 1_000)
    } else if let Some(num) = s.strip_suffix('h') {
        (num, 60 * 60 * 1_000)
    } else if let Some(num) = s.strip_suffix('d') {
        (num, 24 * 60 * 60 * 1_000)
    } else {
        return Err(DurationError::MissingUnit(s));
    };

    let num: u64 = num
        .trim()
        .parse()
        .map_err(|_| DurationError::InvalidNumber(s.clone()))?;
    let millis = num
        .checked_mul(unit_millis)
        .ok_or_else(|| DurationError::Overflow(s.clone()))?;

    Ok(Duration::from_millis(millis))
}

/// Formats with the largest unit that divides the duration evenly.
pub fn format_duration(d: Duration) -> String {
    const UNITS: [(u128, &str); 4] = [
        (24 * 60 * 60 * 1_000, "d"),
        (60 * 60 * 1_000, "h"),
        (60 * 1_000, "m"),
        (1_000, "s"),
    ];

    let millis = d.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    for (size, unit) in UNITS {
        if millis % size == 0 {
            return format!("{}{}", millis / size, unit);
        }
    }
    format!("{}ms", millis)
}

/// For `#[serde(with = "crate::duration")]`.
pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(*d))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}
