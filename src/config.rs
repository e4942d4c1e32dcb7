//! Client configuration, loaded from `CAMPUSRIDE_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Connection settings for the API client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend origin; a trailing slash is tolerated.
    pub base_url: String,
    /// Where the bearer token is persisted between runs. `None` keeps the
    /// session in memory only.
    pub token_path: Option<PathBuf>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Config pointed at `base_url`, with an in-memory session and default
    /// timeout. Used by tests and embedders that manage their own state.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token_path: None,
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    /// Build a config from environment variables, defaulting to a local
    /// backend and a token file under the user's home directory.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("CAMPUSRIDE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let token_path = std::env::var_os("CAMPUSRIDE_TOKEN_FILE")
            .map(PathBuf::from)
            .or_else(default_token_path);
        Self {
            base_url,
            token_path,
            timeout: Duration::from_secs(env_parse(
                "CAMPUSRIDE_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
        }
    }
}

/// `~/.campusride/session`, when a home directory is known.
#[must_use]
pub fn default_token_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".campusride").join("session"))
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
