//! Search result and crawl candidate data structures.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// An enriched, immutable search hit.
///
/// Results are shared as `Arc<SearchResult>` between the table and every
/// view that accepts them, so they are never modified once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Stable identifier
    pub uid: String,

    /// Human readable name
    pub display_name: String,

    /// Name of the source that produced this result
    pub source: String,

    /// Canonical details page URL
    pub details_url: String,

    /// Primary resource locator (download link, magnet, stream URL)
    pub locator: String,

    /// Size in bytes (0 when unknown)
    pub size: u64,

    /// When this result was created
    pub created: DateTime<Utc>,

    /// License reference, if the source exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Content hash (e.g. BitTorrent info-hash), if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl SearchResult {
    /// Create a result with a derived uid and the current timestamp.
    pub fn new(
        source: impl Into<String>,
        display_name: impl Into<String>,
        details_url: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let details_url = details_url.into();
        let locator = locator.into();
        Self {
            uid: derive_uid(&source, &details_url, &locator),
            display_name: display_name.into(),
            source,
            details_url,
            locator,
            size: 0,
            created: Utc::now(),
            license: None,
            hash: None,
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    /// Set the content hash; stored lowercase.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into().to_lowercase());
        self
    }
}

/// Derive a short stable identifier from a result's identity fields.
pub fn derive_uid(source: &str, details_url: &str, locator: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(details_url.as_bytes());
    hasher.update([0u8]);
    hasher.update(locator.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// An incomplete hit that still needs its details page crawled.
///
/// Candidates never leave the query performer: each one either becomes
/// exactly one [`SearchResult`] or is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlableCandidate {
    /// Name of the source that listed this item
    pub source: String,

    /// Details page URL
    pub details_url: String,

    /// Source specific item identifier
    pub item_id: String,

    /// Values already visible on the listing page (title, size, ...)
    pub hints: BTreeMap<String, String>,

    /// Content hash known from the listing, used as a secondary cache key
    pub hash: Option<String>,
}

impl CrawlableCandidate {
    pub fn new(
        source: impl Into<String>,
        details_url: impl Into<String>,
        item_id: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            details_url: details_url.into(),
            item_id: item_id.into(),
            hints: BTreeMap::new(),
            hash: None,
        }
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into().to_lowercase());
        self
    }

    /// Look up a listing hint.
    pub fn hint(&self, key: &str) -> Option<&str> {
        self.hints.get(key).map(String::as_str)
    }
}

/// One parsed entry of a results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingItem {
    /// Needs a detail crawl before it can be shown
    Candidate(CrawlableCandidate),

    /// The listing already carried everything
    Complete(SearchResult),
}

/// The parse of one results page.
#[derive(Debug, Default)]
pub struct Listing {
    /// Per-item parse outcomes, in page order
    pub items: Vec<Result<ListingItem>>,

    /// Whether the source has another page after this one
    pub has_more: bool,
}

impl Listing {
    pub fn new(items: Vec<Result<ListingItem>>, has_more: bool) -> Self {
        Self { items, has_more }
    }

    /// An empty final page.
    pub fn exhausted() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_is_deterministic() {
        let a = SearchResult::new("x", "foo", "https://x/1", "magnet:?xt=1");
        let b = SearchResult::new("x", "bar", "https://x/1", "magnet:?xt=1");
        assert_eq!(a.uid, b.uid);
        assert_eq!(a.uid.len(), 16);
    }

    #[test]
    fn test_uid_depends_on_source() {
        let a = SearchResult::new("x", "foo", "https://x/1", "l");
        let b = SearchResult::new("y", "foo", "https://x/1", "l");
        assert_ne!(a.uid, b.uid);
    }

    #[test]
    fn test_builder_methods() {
        let result = SearchResult::new("x", "foo", "https://x/1", "l")
            .with_size(42)
            .with_hash("ABCDEF")
            .with_license("CC-BY")
            .with_uid("custom");
        assert_eq!(result.size, 42);
        assert_eq!(result.hash.as_deref(), Some("abcdef"));
        assert_eq!(result.license.as_deref(), Some("CC-BY"));
        assert_eq!(result.uid, "custom");
    }

    #[test]
    fn test_candidate_hints() {
        let candidate = CrawlableCandidate::new("x", "https://x/item/7", "7")
            .with_hint("title", "Foo")
            .with_hash("AA");
        assert_eq!(candidate.hint("title"), Some("Foo"));
        assert_eq!(candidate.hint("size"), None);
        assert_eq!(candidate.hash.as_deref(), Some("aa"));
    }
}
