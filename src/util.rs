use std::str::FromStr;

use crate::config::ConfigError;

pub const DISCORD_TOKEN: &str = "DISCORD_TOKEN";
pub const CHANNEL_ID: &str = "CHANNEL_ID";
pub const UPDATE_INTERVAL: &str = "UPDATE_INTERVAL";
pub const UPTIME_CHECK_INTERVAL: &str = "UPTIME_CHECK_INTERVAL";
pub const UPDATE_SPREAD_SECONDS: &str = "UPDATE_SPREAD_SECONDS";
pub const PROBE_TIMEOUT: &str = "PROBE_TIMEOUT";
pub const MAX_CONCURRENT_PROBES: &str = "MAX_CONCURRENT_PROBES";
pub const STORAGE_BACKEND: &str = "STORAGE_BACKEND";
pub const DB_PATH: &str = "DB_PATH";
pub const RETENTION_DAYS: &str = "RETENTION_DAYS";
pub const MESSAGE_IDS_FILE: &str = "MESSAGE_IDS_FILE";
pub const API_ADDR: &str = "API_ADDR";
pub const API_TOKEN: &str = "API_TOKEN";
pub const LOG_LEVEL: &str = "LOG_LEVEL";

/// Reads an environment variable, treating empty values as unset.
pub fn get_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Parses an optional raw value. A value that is present but malformed is an
/// error rather than a silent fallback.
pub fn parse_value<T: FromStr>(
    name: &'static str,
    raw: Option<String>,
) -> Result<Option<T>, ConfigError> {
    match raw.filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { name, value }),
        None => Ok(None),
    }
}

/// Formats a byte count the way `free -h` would, e.g. `15.6GB`.
pub fn bytes_to_human(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value < 1024.0 {
            return format!("{value:.1}{unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1}PB")
}
