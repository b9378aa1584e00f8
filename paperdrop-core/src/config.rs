//! Process configuration, read once at startup.
//!
//! Everything comes from environment variables. [`Config::from_lookup`] takes
//! the lookup as a closure so callers (and tests) can supply any source.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::allowlist::AllowList;
use crate::error::ConfigError;

pub const ENV_BASE_URL: &str = "PAPERLESS_BASE_URL";
pub const ENV_AUTH_TOKEN: &str = "PAPERLESS_AUTH_TOKEN";
pub const ENV_CONSUME_FOLDER: &str = "CONSUME_FOLDER";
pub const ENV_ALLOW_LIST: &str = "FILE_CONSUME_WHITELIST";
pub const ENV_STABILITY_INTERVAL: &str = "FILE_STABILITY_CHECK_INTERVAL_SECONDS";
pub const ENV_STABILITY_COUNT: &str = "FILE_STABILITY_CHECK_COUNT";
pub const ENV_RETRY_DELAY: &str = "HTTP_UPLOAD_RETRY_DELAY_SECONDS";
pub const ENV_VERBOSE: &str = "VERBOSE";
pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";

pub const DEFAULT_STABILITY_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_STABILITY_COUNT: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:2112";

/// Immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub auth_token: String,
    pub watch_dir: PathBuf,
    pub allow_list: AllowList,
    pub stability_interval: Duration,
    pub stability_count: u32,
    pub retry_delay: Duration,
    pub verbose: bool,
    pub metrics_addr: SocketAddr,
    /// Optional variables that were set but could not be parsed, and so fell
    /// back to their defaults. The caller decides how loudly to report them.
    pub fallbacks: Vec<Fallback>,
}

/// An optional variable whose value was ignored in favour of the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub key: &'static str,
    pub value: String,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve each variable. Empty values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut fallbacks = Vec::new();

        let base_url = get(ENV_BASE_URL).ok_or(ConfigError::Missing(ENV_BASE_URL))?;
        let auth_token = get(ENV_AUTH_TOKEN).ok_or(ConfigError::Missing(ENV_AUTH_TOKEN))?;
        let watch_dir = get(ENV_CONSUME_FOLDER)
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing(ENV_CONSUME_FOLDER))?;

        let allow_list = match get(ENV_ALLOW_LIST) {
            Some(raw) => AllowList::parse(&raw)?,
            None => AllowList::allow_all(),
        };

        let stability_interval = optional(
            &get,
            ENV_STABILITY_INTERVAL,
            parse_duration,
            DEFAULT_STABILITY_INTERVAL,
            &mut fallbacks,
        );
        let stability_count = optional(
            &get,
            ENV_STABILITY_COUNT,
            |raw| raw.trim().parse::<u32>().ok().filter(|n| *n > 0),
            DEFAULT_STABILITY_COUNT,
            &mut fallbacks,
        );
        let retry_delay = optional(
            &get,
            ENV_RETRY_DELAY,
            parse_duration,
            DEFAULT_RETRY_DELAY,
            &mut fallbacks,
        );
        let verbose = optional(&get, ENV_VERBOSE, parse_bool, false, &mut fallbacks);

        let metrics_addr = match get(ENV_METRICS_ADDR) {
            Some(raw) => raw
                .trim()
                .parse::<SocketAddr>()
                .map_err(|_| ConfigError::ListenAddr {
                    key: ENV_METRICS_ADDR,
                    value: raw.clone(),
                })?,
            None => DEFAULT_METRICS_ADDR
                .parse()
                .map_err(|_| ConfigError::ListenAddr {
                    key: ENV_METRICS_ADDR,
                    value: DEFAULT_METRICS_ADDR.to_string(),
                })?,
        };

        Ok(Self {
            base_url,
            auth_token,
            watch_dir,
            allow_list,
            stability_interval,
            stability_count,
            retry_delay,
            verbose,
            metrics_addr,
            fallbacks,
        })
    }

    /// Serializable view with the token masked.
    pub fn redacted(&self) -> RedactedConfig {
        RedactedConfig {
            base_url: self.base_url.clone(),
            auth_token: mask(&self.auth_token),
            watch_dir: self.watch_dir.display().to_string(),
            allow_list: self.allow_list.patterns().to_vec(),
            stability_interval_ms: self.stability_interval.as_millis(),
            stability_count: self.stability_count,
            retry_delay_ms: self.retry_delay.as_millis(),
            verbose: self.verbose,
            metrics_addr: self.metrics_addr.to_string(),
        }
    }
}

/// What `paperdrop config` prints.
#[derive(Debug, Clone, Serialize)]
pub struct RedactedConfig {
    pub base_url: String,
    pub auth_token: String,
    pub watch_dir: String,
    pub allow_list: Vec<String>,
    pub stability_interval_ms: u128,
    pub stability_count: u32,
    pub retry_delay_ms: u128,
    pub verbose: bool,
    pub metrics_addr: String,
}

fn optional<G, T, P>(
    get: &G,
    key: &'static str,
    parse: P,
    default: T,
    fallbacks: &mut Vec<Fallback>,
) -> T
where
    G: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    let Some(raw) = get(key) else {
        return default;
    };
    match parse(&raw) {
        Some(value) => value,
        None => {
            fallbacks.push(Fallback { key, value: raw });
            default
        }
    }
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if token.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

/// Parse a duration such as `2s`, `500ms` or `1m30s`. A bare number, which
/// may be fractional, is read as seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<f64>() {
        Ok(secs) => Duration::try_from_secs_f64(secs).ok(),
        Err(_) => humantime::parse_duration(raw).ok(),
    }
}

/// Accepts the usual spellings of a boolean flag.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
