//! Tracker configuration.
//!
//! Every timing value the dashboard pages used to hard-code is exposed
//! here with the repository value as its default. Configs can be built in
//! code (usually from a [`PageKind`] preset) or parsed from TOML.
//!
//! # Example TOML
//!
//! ```toml
//! page_key = "tasksync.screening.task_id"
//! poll_interval_ms = 2000
//!
//! [api]
//! base_url = "http://localhost:8000/api"
//! request_timeout_ms = 30000
//!
//! [push]
//! url = "ws://localhost:8000/ws"
//! max_retry = 3
//! reconnect_delay_ms = 3000
//! ```
//!
//! Omitting `[push]` disables the push channel; the tracker then polls only.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::constants::{
    DEFAULT_MAX_RETRY, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_STALL_THRESHOLD,
    DEFAULT_RECONNECT_DELAY_MS, DEFAULT_REQUEST_TIMEOUT_MS, RAG_ANALYSIS_PAGE_KEY,
    SCREENING_PAGE_KEY,
};
use crate::error::ConfigError;

/// The dashboard pages that run background tasks.
///
/// Each page tracks at most one task, under its own storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    /// Bulk resume screening upload.
    Screening,
    /// RAG analysis query.
    RagAnalysis,
}

impl PageKind {
    /// Returns the identity store key of this page.
    pub fn storage_key(&self) -> &'static str {
        match self {
            Self::Screening => SCREENING_PAGE_KEY,
            Self::RagAnalysis => RAG_ANALYSIS_PAGE_KEY,
        }
    }
}

/// Configuration of one page's [`TaskTracker`](crate::tracker::TaskTracker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Identity store key. Must be distinct per page.
    pub page_key: String,

    /// Interval between status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Consecutive poll failures before the poll channel reports a stall.
    #[serde(default = "default_poll_stall_threshold")]
    pub poll_stall_threshold: u32,

    /// REST endpoint settings.
    pub api: ApiConfig,

    /// Push endpoint settings. `None` disables the push channel.
    #[serde(default)]
    pub push: Option<PushConfig>,
}

/// REST endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL the task routes are resolved against.
    pub base_url: Url,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

/// Push endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    pub url: Url,

    /// Consecutive failed connection attempts before downgrading to polling.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    /// Fixed delay between reconnect attempts.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_poll_stall_threshold() -> u32 {
    DEFAULT_POLL_STALL_THRESHOLD
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_max_retry() -> u32 {
    DEFAULT_MAX_RETRY
}

fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

impl ApiConfig {
    /// Creates API settings with the default timeout.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    /// Returns the per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl PushConfig {
    /// Creates push settings with the repository retry policy.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            max_retry: DEFAULT_MAX_RETRY,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }

    /// Returns the reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl TrackerConfig {
    /// Creates a config for `page` with repository defaults and no push channel.
    ///
    /// # Examples
    ///
    /// ```
    /// use tasksync::config::{ApiConfig, PageKind, TrackerConfig};
    ///
    /// let api = ApiConfig::new("http://localhost:8000/api".parse().unwrap());
    /// let config = TrackerConfig::for_page(PageKind::RagAnalysis, api);
    /// assert_eq!(config.page_key, "tasksync.rag.task_id");
    /// assert_eq!(config.poll_interval().as_millis(), 2000);
    /// assert!(config.push.is_none());
    /// ```
    pub fn for_page(page: PageKind, api: ApiConfig) -> Self {
        Self {
            page_key: page.storage_key().to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_stall_threshold: DEFAULT_POLL_STALL_THRESHOLD,
            api,
            push: None,
        }
    }

    /// Enables the push channel.
    pub fn with_push(mut self, push: PushConfig) -> Self {
        self.push = Some(push);
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns the poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parses and validates a TOML config.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::Validation`]
    /// for invalid values.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml`](Self::from_toml).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Checks semantic constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_key.trim().is_empty() {
            return Err(ConfigError::validation("page_key must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::validation("poll_interval_ms must be > 0"));
        }
        if self.poll_stall_threshold == 0 {
            return Err(ConfigError::validation("poll_stall_threshold must be > 0"));
        }
        if self.api.request_timeout_ms == 0 {
            return Err(ConfigError::validation("api.request_timeout_ms must be > 0"));
        }
        if !matches!(self.api.base_url.scheme(), "http" | "https") {
            return Err(ConfigError::validation(format!(
                "api.base_url must use http or https, got: {}",
                self.api.base_url.scheme()
            )));
        }
        if let Some(push) = &self.push {
            if !matches!(push.url.scheme(), "ws" | "wss") {
                return Err(ConfigError::validation(format!(
                    "push.url must use ws or wss, got: {}",
                    push.url.scheme()
                )));
            }
            if push.max_retry == 0 {
                return Err(ConfigError::validation("push.max_retry must be >= 1"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FULL: &str = r#"
page_key = "tasksync.screening.task_id"
poll_interval_ms = 1500

[api]
base_url = "http://localhost:8000/api"

[push]
url = "ws://localhost:8000/ws"
"#;

    #[test]
    fn parses_with_defaults() {
        let config = TrackerConfig::from_toml(FULL).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(1500));
        assert_eq!(config.poll_stall_threshold, DEFAULT_POLL_STALL_THRESHOLD);
        assert_eq!(config.api.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        let push = config.push.unwrap();
        assert_eq!(push.max_retry, 3);
        assert_eq!(push.reconnect_delay(), Duration::from_millis(3000));
    }

    #[test]
    fn push_section_is_optional() {
        let config = TrackerConfig::from_toml(
            r#"
page_key = "k"
[api]
base_url = "https://tasks.example.com/"
"#,
        )
        .unwrap();
        assert!(config.push.is_none());
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn rejects_http_push_url() {
        let err = TrackerConfig::from_toml(&FULL.replace("ws://", "http://")).unwrap_err();
        assert!(err.to_string().contains("push.url"));
    }

    #[test]
    fn rejects_zero_values() {
        let err = TrackerConfig::from_toml(&FULL.replace("1500", "0")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));

        let mut config = TrackerConfig::from_toml(FULL).unwrap();
        if let Some(push) = config.push.as_mut() {
            push.max_retry = 0;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_page_key() {
        let err = TrackerConfig::from_toml(&FULL.replace("tasksync.screening.task_id", " "))
            .unwrap_err();
        assert!(err.to_string().contains("page_key"));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = TrackerConfig::from_toml("page_key = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn page_presets_use_distinct_keys() {
        assert_ne!(
            PageKind::Screening.storage_key(),
            PageKind::RagAnalysis.storage_key()
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let err = TrackerConfig::load(Path::new("/nonexistent/tasksync.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
