//! # Environment Configuration
//!
//! Immutable snapshot of the `CLS_*` environment variables, taken once when
//! the process-wide tracker is created. Values set here override the
//! corresponding setter calls made by the host.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 0.1.0: Initial release

use crate::core::error::Error;
use log::warn;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Prefix shared by every variable the library reads
pub const ENV_PREFIX: &str = "CLS";

/// Collector used when `CLS_API_URL` is not set
pub const DEFAULT_API_URL: &str = "https://api.cls.dev/";

pub const DEFAULT_QUEUE_MAX_EVENTS: usize = 1000;
pub const DEFAULT_QUEUE_MAX_BYTES: usize = 1024 * 1024;
pub const DEFAULT_BATCH_MAX_EVENTS: usize = 100;
pub const DEFAULT_BATCH_MAX_BYTES: usize = 256 * 1024;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on dispatch attempts, whatever the environment asks for
const MAX_ATTEMPTS_CEILING: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Collector base URL, always ending in `/`
    pub api_url: String,
    pub project_key: Option<String>,
    pub user_id: Option<String>,
    pub invocation_id: Option<String>,
    pub debug: Option<bool>,
    pub noninteractive: Option<bool>,
    /// Root directory for persisted settings; platform config dir when unset
    pub settings_dir: Option<PathBuf>,
    /// `env_logger` filter that replaces the debug switch
    pub log_filter: Option<String>,
    pub queue_max_events: usize,
    pub queue_max_bytes: usize,
    pub batch_max_events: usize,
    pub batch_max_bytes: usize,
    pub max_attempts: u32,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: DEFAULT_API_URL.to_string(),
            project_key: None,
            user_id: None,
            invocation_id: None,
            debug: None,
            noninteractive: None,
            settings_dir: None,
            log_filter: None,
            queue_max_events: DEFAULT_QUEUE_MAX_EVENTS,
            queue_max_bytes: DEFAULT_QUEUE_MAX_BYTES,
            batch_max_events: DEFAULT_BATCH_MAX_EVENTS,
            batch_max_bytes: DEFAULT_BATCH_MAX_BYTES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values count as unset. Values that fail to parse are logged and
    /// replaced by their defaults; loading never fails.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}_{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Config::default();

        Config {
            api_url: normalize_api_url(get("API_URL").unwrap_or(defaults.api_url)),
            project_key: get("PROJECT_KEY"),
            user_id: get("USER_ID"),
            invocation_id: get("INVOCATION_ID"),
            debug: get("DEBUG").map(|v| parse_flag(&v)),
            noninteractive: get("NONINTERACTIVE").map(|v| parse_flag(&v)),
            settings_dir: get("SETTINGS_DIR").map(PathBuf::from),
            log_filter: get("LOG"),
            queue_max_events: or_default(
                parse_positive("CLS_QUEUE_MAX_EVENTS", get("QUEUE_MAX_EVENTS")),
                defaults.queue_max_events,
            ),
            queue_max_bytes: or_default(
                parse_positive("CLS_QUEUE_MAX_BYTES", get("QUEUE_MAX_BYTES")),
                defaults.queue_max_bytes,
            ),
            batch_max_events: or_default(
                parse_positive("CLS_BATCH_MAX_EVENTS", get("BATCH_MAX_EVENTS")),
                defaults.batch_max_events,
            ),
            batch_max_bytes: or_default(
                parse_positive("CLS_BATCH_MAX_BYTES", get("BATCH_MAX_BYTES")),
                defaults.batch_max_bytes,
            ),
            max_attempts: or_default(
                parse_positive("CLS_DISPATCH_MAX_ATTEMPTS", get("DISPATCH_MAX_ATTEMPTS")),
                defaults.max_attempts,
            )
            .min(MAX_ATTEMPTS_CEILING),
            request_timeout: Duration::from_secs(or_default(
                parse_positive("CLS_REQUEST_TIMEOUT_SECS", get("REQUEST_TIMEOUT_SECS")),
                defaults.request_timeout.as_secs(),
            )),
        }
    }
}

/// `"0"` and `"false"` switch a flag off, anything else switches it on
pub fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    !(value == "0" || value.eq_ignore_ascii_case("false"))
}

fn normalize_api_url(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

fn parse_positive<T>(key: &'static str, raw: Option<String>) -> Result<Option<T>, Error>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value = raw.parse::<T>().map_err(|e| Error::Config {
        key,
        reason: format!("{raw:?} ({e})"),
    })?;
    if value <= T::default() {
        return Err(Error::Config {
            key,
            reason: format!("{raw:?} must be greater than zero"),
        });
    }
    Ok(Some(value))
}

fn or_default<T>(parsed: Result<Option<T>, Error>, default: T) -> T {
    match parsed {
        Ok(value) => value.unwrap_or(default),
        Err(e) => {
            warn!("{e}; using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        assert_eq!(config_from(&[]), Config::default());
    }

    #[test]
    fn test_api_url_gets_trailing_slash() {
        let config = config_from(&[("CLS_API_URL", "http://localhost:8000/api")]);
        assert_eq!(config.api_url, "http://localhost:8000/api/");
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = config_from(&[("CLS_PROJECT_KEY", ""), ("CLS_DEBUG", "  ")]);
        assert_eq!(config.project_key, None);
        assert_eq!(config.debug, None);
    }

    #[test]
    fn test_flag_parsing() {
        assert!(parse_flag("1"));
        assert!(parse_flag("true"));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("FALSE"));

        let config = config_from(&[("CLS_DEBUG", "false"), ("CLS_NONINTERACTIVE", "1")]);
        assert_eq!(config.debug, Some(false));
        assert_eq!(config.noninteractive, Some(true));
    }

    #[test]
    fn test_malformed_limits_fall_back_to_defaults() {
        let config = config_from(&[
            ("CLS_QUEUE_MAX_EVENTS", "lots"),
            ("CLS_BATCH_MAX_EVENTS", "0"),
            ("CLS_QUEUE_MAX_BYTES", "2048"),
        ]);
        assert_eq!(config.queue_max_events, DEFAULT_QUEUE_MAX_EVENTS);
        assert_eq!(config.batch_max_events, DEFAULT_BATCH_MAX_EVENTS);
        assert_eq!(config.queue_max_bytes, 2048);
    }

    #[test]
    fn test_attempts_are_clamped() {
        let config = config_from(&[("CLS_DISPATCH_MAX_ATTEMPTS", "500")]);
        assert_eq!(config.max_attempts, MAX_ATTEMPTS_CEILING);
    }

    #[test]
    fn test_request_timeout_seconds() {
        let config = config_from(&[("CLS_REQUEST_TIMEOUT_SECS", "12")]);
        assert_eq!(config.request_timeout, Duration::from_secs(12));
    }
}
