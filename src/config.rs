//! Runtime configuration read from the process environment.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::api::{normalize_base_url, DEFAULT_TIMEOUT};

pub const ENV_API_URL: &str = "MENU_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "MENU_API_TIMEOUT_SECS";
pub const ENV_LOG_DIR: &str = "MENU_LOG_DIR";
pub const ENV_DB_FILE: &str = "MENU_DB_FILE";

/// Where the flat-file JSON server listens during local development.
pub const DEFAULT_API_URL: &str = "http://localhost:3001";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got {value:?}")]
    InvalidTimeout { name: &'static str, value: String },
    #[error("{name} must not be empty")]
    Empty { name: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub timeout: Duration,
    /// Directory for rolling log files; console only when unset.
    pub log_dir: Option<PathBuf>,
    /// Serve the menu from this `db.json` instead of the HTTP API.
    pub db_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            log_dir: None,
            db_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset and blank values fall back
    /// to the defaults, except an explicitly blank API URL.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            if url.trim().is_empty() {
                return Err(ConfigError::Empty { name: ENV_API_URL });
            }
            config.api_url = normalize_base_url(&url);
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS).filter(|v| !v.trim().is_empty()) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidTimeout {
                    name: ENV_TIMEOUT_SECS,
                    value: raw.clone(),
                })?;
            config.timeout = Duration::from_secs(secs);
        }

        config.log_dir = lookup(ENV_LOG_DIR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        config.db_file = lookup(ENV_DB_FILE)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.api_url, "http://localhost:3001");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn reads_and_normalizes_values() {
        let config = Config::from_lookup(lookup(&[
            (ENV_API_URL, "menu.example.uz/api/"),
            (ENV_TIMEOUT_SECS, " 5 "),
            (ENV_LOG_DIR, "/var/log/menu"),
            (ENV_DB_FILE, ""),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://menu.example.uz/api");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/menu")));
        assert_eq!(config.db_file, None);
    }

    #[test]
    fn rejects_bad_timeout_and_blank_url() {
        let err = Config::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { .. }));
        let err = Config::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { .. }));
        let err = Config::from_lookup(lookup(&[(ENV_API_URL, "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Empty { name: ENV_API_URL });
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        std::env::set_var(ENV_API_URL, "127.0.0.1:4000");
        std::env::set_var(ENV_DB_FILE, "fixtures/db.json");
        let config = Config::from_env();
        std::env::remove_var(ENV_API_URL);
        std::env::remove_var(ENV_DB_FILE);

        let config = config.unwrap();
        assert_eq!(config.api_url, "http://127.0.0.1:4000");
        assert_eq!(config.db_file, Some(PathBuf::from("fixtures/db.json")));
    }

    #[test]
    #[serial]
    fn from_env_without_variables_uses_defaults() {
        for key in [ENV_API_URL, ENV_TIMEOUT_SECS, ENV_LOG_DIR, ENV_DB_FILE] {
            std::env::remove_var(key);
        }
        assert_eq!(Config::from_env().unwrap(), Config::default());
    }
}
