use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_api_url: String,

    // Linkding
    pub linkding_url: String,
    pub linkding_token: String,
    pub default_tag: Option<String>,
    pub http_timeout: Duration,

    // Polling
    pub poll_timeout: Duration,
    pub poll_retry_delay: Duration,

    // Logging
    pub log_level: String,
    /// `LOG_LEVEL` as given when it named no known level and `info` was used instead.
    pub unknown_log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load from the process environment, after merging a `.env` file if one exists.
    pub fn load() -> Result<Self> {
        merge_env_file(Path::new(".env"))?;
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = require(get("TELEGRAM_BOT_TOKEN"), "TELEGRAM_BOT_TOKEN")?;
        let telegram_api_url = get("TELEGRAM_API_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string());

        let linkding_url =
            require(get("LINKDING_URL"), "LINKDING_URL")?.trim_end_matches('/').to_string();
        let linkding_token = require(get("LINKDING_TOKEN"), "LINKDING_TOKEN")?;
        let default_tag = get("LINKDING_DEFAULT_TAG").map(|s| s.trim().to_string());
        let http_timeout = Duration::from_secs(parse_u64(&get, "HTTP_TIMEOUT_SECS")?.unwrap_or(10));

        let poll_timeout = Duration::from_secs(parse_u64(&get, "POLL_TIMEOUT_SECS")?.unwrap_or(30));
        let poll_retry_delay =
            Duration::from_millis(parse_u64(&get, "POLL_RETRY_DELAY_MS")?.unwrap_or(3000));

        let (log_level, unknown_log_level) = match get("LOG_LEVEL") {
            None => ("info".to_string(), None),
            Some(raw) => match normalize_log_level(&raw) {
                Some(level) => (level.to_string(), None),
                None => ("info".to_string(), Some(raw)),
            },
        };
        let log_file = get("LOG_FILE").map(PathBuf::from);

        Ok(Self {
            telegram_bot_token,
            telegram_api_url,
            linkding_url,
            linkding_token,
            default_tag,
            http_timeout,
            poll_timeout,
            poll_retry_delay,
            log_level,
            unknown_log_level,
            log_file,
        })
    }
}

fn require(v: Option<String>, key: &str) -> Result<String> {
    v.ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

/// Map a `LOG_LEVEL` value onto a tracing level. `fatal` and `panic` have no
/// tracing equivalent and become `error`.
fn normalize_log_level(raw: &str) -> Option<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "fatal" | "panic" => Some("error"),
        _ => None,
    }
}

/// Merge `path` into the process environment without overriding variables
/// that are already set. A missing file is fine; a malformed one is not.
fn merge_env_file(path: &Path) -> Result<()> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(Error::Config(format!("{}: {e}", path.display()))),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
