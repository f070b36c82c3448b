//! Human-readable TTL values such as `"30s"`, `"5m"`, `"2h"`, `"1d"` or `"permanent"`.

use super::ConfigError;
use crate::cache::Retention;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A TTL as written in the configuration file: a string or a number of seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TtlSetting {
    /// Seconds; `0` and negative values mean permanent.
    Seconds(i64),
    /// Text form, e.g. `"2h"`.
    Text(String),
}

impl Default for TtlSetting {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl TtlSetting {
    /// Resolves the setting; `None` means "use the layer kind's default".
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` for malformed values or unknown units.
    pub fn retention(&self) -> Result<Option<Retention>, ConfigError> {
        match self {
            Self::Seconds(s) if *s <= 0 => Ok(Some(Retention::Permanent)),
            Self::Seconds(s) => Ok(Some(Retention::For(Duration::from_secs(s.unsigned_abs())))),
            Self::Text(text) => parse_ttl(text),
        }
    }
}

/// Parses a TTL string.
///
/// Bare numbers are seconds. `"permanent"`, `"0"` and `"-1"` mean permanent;
/// an empty string means "use the default".
///
/// # Errors
/// Returns `ConfigError::Validation` for malformed values or unknown units.
pub fn parse_ttl(raw: &str) -> Result<Option<Retention>, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if matches!(value.to_lowercase().as_str(), "permanent" | "0" | "-1") {
        return Ok(Some(Retention::Permanent));
    }

    let split = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let amount: u64 = number
        .parse()
        .map_err(|_| ConfigError::Validation(format!("invalid ttl '{}': expected a number with an optional unit", raw)))?;

    let seconds_per_unit = match unit.trim().to_lowercase().as_str() {
        "" | "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        other => return Err(ConfigError::Validation(format!("invalid ttl '{}': unknown time unit '{}'", raw, other))),
    };

    let seconds = amount
        .checked_mul(seconds_per_unit)
        .ok_or_else(|| ConfigError::Validation(format!("invalid ttl '{}': value too large", raw)))?;
    if seconds == 0 {
        return Ok(Some(Retention::Permanent));
    }
    Ok(Some(Retention::For(Duration::from_secs(seconds))))
}
