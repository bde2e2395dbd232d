use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

pub const ENV_TOKENS: &str = "TOKENS";
pub const ENV_NOTIFICATION_URLS: &str = "NOTIFICATION_URLS";
pub const ENV_MAX_RETRIES: &str = "MAX_RETRIES";
pub const ENV_RETRY_BACKOFF_MS: &str = "RETRY_BACKOFF_MS";
pub const ENV_BASE_URL: &str = "SKLAND_BASE_URL";
pub const ENV_DEDUPE_STORE_PATH: &str = "DEDUPE_STORE_PATH";
pub const ENV_NOTIFICATION_TITLE: &str = "NOTIFICATION_TITLE";

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_URL: &str = "https://zonai.skland.com";
pub const DEFAULT_NOTIFICATION_TITLE: &str = "Skland daily attendance";

/// Result returned by [`AttendanceConfig::from_env`], capturing any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: AttendanceConfig,
    pub warnings: Vec<String>,
}

/// Errors that make the configuration unusable for a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Runtime configuration resolved from the process environment.
#[derive(Debug, Clone)]
pub struct AttendanceConfig {
    pub tokens: Vec<String>,
    pub notification_urls: Vec<String>,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub base_url: String,
    pub dedupe_store_path: Option<PathBuf>,
    pub notification_title: String,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            notification_urls: Vec::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::ZERO,
            base_url: DEFAULT_BASE_URL.to_string(),
            dedupe_store_path: None,
            notification_title: DEFAULT_NOTIFICATION_TITLE.to_string(),
        }
    }
}

impl AttendanceConfig {
    pub fn from_env() -> Result<ConfigLoadResult, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary key lookup.
    ///
    /// Invalid numeric values never fail the load; they are reported as warnings and the
    /// default is kept. Only a malformed API base URL is fatal.
    pub fn from_lookup<F>(lookup: F) -> Result<ConfigLoadResult, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let mut config = AttendanceConfig {
            tokens: split_and_trim(lookup(ENV_TOKENS).as_deref()),
            notification_urls: split_and_trim(lookup(ENV_NOTIFICATION_URLS).as_deref()),
            ..AttendanceConfig::default()
        };

        if let Some(raw) = non_empty(lookup(ENV_MAX_RETRIES)) {
            match raw.parse::<i64>() {
                Ok(value) if value > 0 => {
                    config.max_retries = u32::try_from(value).unwrap_or(u32::MAX);
                }
                _ => warnings.push(format!(
                    "Ignoring {ENV_MAX_RETRIES}={raw:?}; expected a positive integer, using {DEFAULT_MAX_RETRIES}."
                )),
            }
        }

        if let Some(raw) = non_empty(lookup(ENV_RETRY_BACKOFF_MS)) {
            match raw.parse::<u64>() {
                Ok(ms) => config.retry_backoff = Duration::from_millis(ms),
                Err(_) => warnings.push(format!(
                    "Ignoring {ENV_RETRY_BACKOFF_MS}={raw:?}; expected milliseconds, retrying without backoff."
                )),
            }
        }

        if let Some(raw) = non_empty(lookup(ENV_BASE_URL)) {
            Url::parse(&raw).map_err(|err| ConfigError::Invalid {
                var: ENV_BASE_URL,
                reason: err.to_string(),
            })?;
            config.base_url = raw.trim_end_matches('/').to_string();
        }

        config.dedupe_store_path = non_empty(lookup(ENV_DEDUPE_STORE_PATH)).map(PathBuf::from);

        if let Some(title) = non_empty(lookup(ENV_NOTIFICATION_TITLE)) {
            config.notification_title = title;
        }

        Ok(ConfigLoadResult { config, warnings })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Split a comma separated list, trimming entries and dropping empty ones.
pub fn split_and_trim(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
