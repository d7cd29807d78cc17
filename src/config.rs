use crate::error::ConfigError;
use std::env;

/// Common de facto SCORM 1.2 ceiling for `cmi.suspend_data`.
pub const DEFAULT_SUSPEND_LIMIT_12: usize = 4096;
/// SCORM 2004 guarantees at least this many characters of suspend data.
pub const DEFAULT_SUSPEND_LIMIT_2004: usize = 64_000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Absent means attempts live in process memory only.
    pub database_url: Option<String>,
    pub port: u16,
    pub suspend_limit_12: usize,
    pub suspend_limit_2004: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 8081,
            suspend_limit_12: DEFAULT_SUSPEND_LIMIT_12,
            suspend_limit_2004: DEFAULT_SUSPEND_LIMIT_2004,
        }
    }
}

impl Config {
    /// Reads settings from the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            port: parse_or("PORT", lookup("PORT"), defaults.port)?,
            suspend_limit_12: parse_or(
                "SUSPEND_DATA_LIMIT_12",
                lookup("SUSPEND_DATA_LIMIT_12"),
                defaults.suspend_limit_12,
            )?,
            suspend_limit_2004: parse_or(
                "SUSPEND_DATA_LIMIT_2004",
                lookup("SUSPEND_DATA_LIMIT_2004"),
                defaults.suspend_limit_2004,
            )?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
