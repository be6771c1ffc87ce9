//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::SourceDefinition;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and session behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Crawl cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Result aggregation settings
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Selector-driven source definitions
    #[serde(default)]
    pub sources: Vec<SourceDefinition>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.detail_timeout_secs == 0 {
            return Err(AppError::validation(
                "crawler.detail_timeout_secs must be > 0",
            ));
        }
        if self.crawler.session_timeout_secs == 0 {
            return Err(AppError::validation(
                "crawler.session_timeout_secs must be > 0",
            ));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.max_pages == 0 {
            return Err(AppError::validation("crawler.max_pages must be > 0"));
        }
        if self.crawler.max_results == 0 {
            return Err(AppError::validation("crawler.max_results must be > 0"));
        }
        if self.crawler.max_body_bytes == 0 {
            return Err(AppError::validation("crawler.max_body_bytes must be > 0"));
        }
        if self.aggregator.listener_queue_capacity == 0 {
            return Err(AppError::validation(
                "aggregator.listener_queue_capacity must be > 0",
            ));
        }
        if let EvictionPolicy::TruncateAbove { max_bytes: 0 } = self.cache.eviction {
            return Err(AppError::validation(
                "cache.eviction.max_bytes must be > 0",
            ));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !names.insert(source.name.as_str()) {
                return Err(AppError::validation(format!(
                    "Duplicate source name '{}'",
                    source.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a source definition by name.
    pub fn source(&self, name: &str) -> Option<&SourceDefinition> {
        self.sources.iter().find(|s| s.name == name)
    }
}

/// HTTP client and session behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Timeout for a single results page fetch, in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Timeout for a single detail page fetch, in seconds
    #[serde(default = "defaults::detail_timeout")]
    pub detail_timeout_secs: u64,

    /// Upper bound on the lifetime of one query session, in seconds
    #[serde(default = "defaults::session_timeout")]
    pub session_timeout_secs: u64,

    /// Number of sessions allowed to run at the same time
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Global cap on result pages per session (sources may ask for fewer)
    #[serde(default = "defaults::max_pages")]
    pub max_pages: usize,

    /// Result count ceiling per session
    #[serde(default = "defaults::max_results")]
    pub max_results: usize,

    /// Detail crawls allowed per session
    #[serde(default = "defaults::max_crawls")]
    pub max_crawls: usize,

    /// Largest response body accepted from a source, in bytes
    #[serde(default = "defaults::max_body_bytes")]
    pub max_body_bytes: u64,
}

impl CrawlerConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            detail_timeout_secs: defaults::detail_timeout(),
            session_timeout_secs: defaults::session_timeout(),
            max_concurrent: defaults::max_concurrent(),
            max_pages: defaults::max_pages(),
            max_results: defaults::max_results(),
            max_crawls: defaults::max_crawls(),
            max_body_bytes: defaults::max_body_bytes(),
        }
    }
}

/// Crawl cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When false, `put` is a no-op and every lookup misses
    #[serde(default = "defaults::cache_enabled")]
    pub enabled: bool,

    /// Directory for the on-disk store; in-memory store when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// How long a failed detail URL is remembered, in seconds
    #[serde(default = "defaults::failed_ttl")]
    pub failed_ttl_secs: u64,

    /// What to do when the cache grows
    #[serde(default)]
    pub eviction: EvictionPolicy,
}

impl CacheConfig {
    pub fn failed_ttl(&self) -> Duration {
        Duration::from_secs(self.failed_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::cache_enabled(),
            dir: None,
            failed_ttl_secs: defaults::failed_ttl(),
            eviction: EvictionPolicy::default(),
        }
    }
}

/// Crawl cache growth policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Grow until explicitly cleared
    #[default]
    Unbounded,

    /// Truncate the whole cache once it holds more than `max_bytes`
    TruncateAbove { max_bytes: u64 },
}

/// Result aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Pending listener notifications kept per view before coalescing
    #[serde(default = "defaults::listener_queue_capacity")]
    pub listener_queue_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            listener_queue_capacity: defaults::listener_queue_capacity(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter (`error`, `warn`, `info`, `debug`, `trace`)
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; search-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn detail_timeout() -> u64 {
        10
    }
    pub fn session_timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        6
    }
    pub fn max_pages() -> usize {
        3
    }
    pub fn max_results() -> usize {
        200
    }
    pub fn max_crawls() -> usize {
        20
    }
    pub fn max_body_bytes() -> u64 {
        8 * 1024 * 1024
    }

    // Cache defaults
    pub fn cache_enabled() -> bool {
        true
    }
    pub fn failed_ttl() -> u64 {
        600
    }

    // Aggregator defaults
    pub fn listener_queue_capacity() -> usize {
        256
    }

    // Logging defaults
    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.crawler.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_truncate_threshold() {
        let mut config = Config::default();
        config.cache.eviction = EvictionPolicy::TruncateAbove { max_bytes: 0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [crawler]
            max_pages = 2

            [cache]
            enabled = false

            [cache.eviction]
            policy = "truncate_above"
            max_bytes = 1048576
            "#,
        )
        .unwrap();

        assert_eq!(config.crawler.max_pages, 2);
        assert_eq!(config.crawler.max_concurrent, 6);
        assert!(!config.cache.enabled);
        assert_eq!(
            config.cache.eviction,
            EvictionPolicy::TruncateAbove {
                max_bytes: 1_048_576
            }
        );
        assert_eq!(config.aggregator.listener_queue_capacity, 256);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let config = Config::load_or_default("/nonexistent/search-crawler.toml");
        assert_eq!(config.crawler.timeout_secs, 10);
        assert_eq!(config.cache.eviction, EvictionPolicy::Unbounded);
    }
}
