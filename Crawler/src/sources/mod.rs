//! Source adapters.
//!
//! A [`SourceAdapter`] knows how to talk to one remote site: how to build its
//! query URLs, how to read its results and details pages, and how to recognize
//! an anti-automation page. The rest of the pipeline never branches on which
//! site it is talking to; adapters are looked up by name in a
//! [`SourceRegistry`].

mod selectors;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Config, CrawlableCandidate, Listing, SearchResult};
use crate::utils::http::RequestBody;

pub use selectors::SelectorSource;

/// Per-source strategy for URL construction and page parsing.
///
/// Parsing is synchronous and pure; the query performer owns all I/O.
pub trait SourceAdapter: Send + Sync {
    /// Unique source name, stamped on every result.
    fn name(&self) -> &str;

    /// Number of result pages the source serves per query.
    fn max_pages(&self) -> usize {
        1
    }

    /// Extra request headers sent with every fetch.
    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Build the results page URL for a 1-based page number.
    fn build_query_url(&self, page: usize, keywords: &str) -> Result<String>;

    /// Body of the results page request. `Some` turns the query into a POST.
    fn build_query_body(&self, _page: usize, _keywords: &str) -> Result<Option<RequestBody>> {
        Ok(None)
    }

    /// Parse a results page. Item-level failures go in [`Listing::items`];
    /// an `Err` here means the page as a whole is unusable.
    fn parse_listing(&self, bytes: &[u8]) -> Result<Listing>;

    /// URL of the candidate's details page, `None` to resolve it from its
    /// listing hints alone.
    fn build_detail_url(&self, candidate: &CrawlableCandidate) -> Option<String> {
        Some(candidate.details_url.clone())
    }

    /// Turn a candidate into a result, with the details page bytes when one
    /// was fetched.
    fn parse_detail(
        &self,
        candidate: &CrawlableCandidate,
        bytes: Option<&[u8]>,
    ) -> Result<SearchResult>;

    /// Whether the response is an anti-automation challenge.
    fn is_blocked(&self, _bytes: &[u8]) -> bool {
        false
    }
}

/// Adapters keyed by source name.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    adapters: BTreeMap<String, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a [`SelectorSource`] for every source definition in the config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        for definition in &config.sources {
            registry.register(Arc::new(SelectorSource::new(definition.clone())?))?;
        }
        log::debug!("Registered {} source(s)", registry.len());
        Ok(registry)
    }

    /// Register an adapter. Names must be unique.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> Result<()> {
        let name = adapter.name().to_string();
        if self.adapters.contains_key(&name) {
            return Err(AppError::config(format!(
                "Source '{name}' is already registered"
            )));
        }
        self.adapters.insert(name, adapter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Registered names in ascending order.
    pub fn names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// Resolve the named adapters, or every adapter when `names` is empty.
    pub fn select(&self, names: &[String]) -> Result<Vec<Arc<dyn SourceAdapter>>> {
        if names.is_empty() {
            return Ok(self.adapters.values().cloned().collect());
        }
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| AppError::config(format!("Unknown source '{name}'")))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockAdapter;

    #[test]
    fn test_register_and_select() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MockAdapter::new("b"))).unwrap();
        registry.register(Arc::new(MockAdapter::new("a"))).unwrap();

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.select(&[]).unwrap().len(), 2);

        let picked = registry.select(&["b".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name(), "b");

        assert!(registry.select(&["zzz".to_string()]).is_err());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MockAdapter::new("a"))).unwrap();
        let err = registry.register(Arc::new(MockAdapter::new("a"))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_from_config() {
        let config: Config = toml::from_str(
            r#"
            [[sources]]
            name = "archive"
            query_url = "https://archive.example/search?q={keywords}"

            [sources.listing]
            row_selector = "li"
            title_selector = "a"
            locator_selector = "a.dl"
            "#,
        )
        .unwrap();
        let registry = SourceRegistry::from_config(&config).unwrap();
        assert_eq!(registry.names(), vec!["archive"]);
    }
}
