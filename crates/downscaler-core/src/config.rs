//! Schedule configuration and the optional TOML config file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Working-day window, validated once at startup.
///
/// Hours use a 24h clock and are inclusive at both ends: with `start = 9`
/// and `end = 18`, 09:xx through 18:xx are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    start_hour: u8,
    end_hour: u8,
    consultant_mode: bool,
}

impl ScheduleConfig {
    /// Build a schedule, rejecting bounds outside `[1, 24]` or `end < start`.
    pub fn new(start_hour: i64, end_hour: i64, consultant_mode: bool) -> Result<Self, ConfigError> {
        if !(1..=24).contains(&start_hour) {
            return Err(ConfigError::StartOutOfRange(start_hour));
        }
        if !(1..=24).contains(&end_hour) {
            return Err(ConfigError::EndOutOfRange(end_hour));
        }
        let (start, end) = (start_hour as u8, end_hour as u8);
        if end < start {
            return Err(ConfigError::EndBeforeStart { start, end });
        }
        Ok(Self {
            start_hour: start,
            end_hour: end,
            consultant_mode,
        })
    }

    pub fn start_hour(&self) -> u8 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u8 {
        self.end_hour
    }

    pub fn consultant_mode(&self) -> bool {
        self.consultant_mode
    }
}

/// Contents of the optional `--config` TOML file.
///
/// Every field mirrors a command-line flag. Flags given explicitly on the
/// command line take precedence over values read here.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub consultant_mode: Option<bool>,
    pub asg_name: Option<String>,
    pub autodetect: Option<bool>,
    pub interval: Option<String>,
    pub verbose: Option<bool>,
    pub region: Option<String>,
    pub initial_capacity: Option<u32>,
    pub configmap_state: Option<bool>,
    pub configmap_state_name: Option<String>,
    pub configmap_namespace: Option<String>,
    pub state_file: Option<String>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::File { reason, .. } => ConfigError::File {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::File {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Parse an interval such as `"60s"`, `"5m"`, `"1h30m"` or `"250ms"`.
///
/// A bare number is read as seconds. Zero-length intervals are rejected.
pub fn parse_interval(s: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidInterval(s.to_string());
    let s = s.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return if secs == 0 {
            Err(invalid())
        } else {
            Ok(Duration::from_secs(secs))
        };
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        };
        total = total.checked_add(unit).ok_or_else(invalid)?;
        rest = &rest[unit_len..];
    }

    if total.is_zero() {
        return Err(invalid());
    }
    Ok(total)
}
