// src/error.rs

//! Unified error handling for the search crawler.
//!
//! Environmental failures (a page that did not load, an item that did not
//! parse, a cache file that could not be written) are absorbed where they
//! happen and only logged. The variants that reach callers are the ones that
//! indicate misuse or bad configuration.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A single fetch failed
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// A single fetch exceeded its deadline
    #[error("Fetch timed out for {url}")]
    Timeout { url: String },

    /// Page or item content could not be parsed
    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    /// Source answered with an anti-automation page
    #[error("Source '{source_name}' is blocking automated requests")]
    Blocked { source_name: String },

    /// Crawl cache backend failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Filter was constructed with unusable arguments
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// View handle does not belong to the table it was used with
    #[error("View {0} is not registered with this table")]
    ViewNotRegistered(u64),

    /// API used in a way its contract does not allow
    #[error("Contract violation: {0}")]
    Contract(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error for a URL.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a parse error with context.
    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a contract violation error.
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract(message.into())
    }

    /// Whether this error is a transient, per-unit failure that the pipeline
    /// drops instead of propagating.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Fetch { .. } | Self::Timeout { .. } | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_fetch() {
        let err = AppError::fetch("https://example.com/q", "connection refused");
        assert_eq!(
            err.to_string(),
            "Fetch failed for https://example.com/q: connection refused"
        );
    }

    #[test]
    fn test_display_blocked() {
        let err = AppError::Blocked {
            source_name: "mirror".into(),
        };
        assert_eq!(
            err.to_string(),
            "Source 'mirror' is blocking automated requests"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::fetch("u", "x").is_transient());
        assert!(AppError::Timeout { url: "u".into() }.is_transient());
        assert!(!AppError::parse("row", "bad").is_transient());
        assert!(!AppError::ViewNotRegistered(3).is_transient());
        assert!(!AppError::contract("twice").is_transient());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppError>();
    }
}
