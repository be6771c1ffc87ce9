//! Result filters and grouping keys.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::models::SearchResult;
use crate::utils::text::{matches_any_keyword, normalize_name, tokenize_keywords};

/// Grouping identity. Results with equal keys share one group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FilterKey(String);

impl FilterKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a filter derives a [`FilterKey`] from a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grouping {
    /// Everything in one group
    #[default]
    Single,
    /// Normalized display name
    Name,
    /// Source name
    Source,
    /// Result uid, i.e. no merging
    Uid,
    /// Content hash, falling back to the uid
    Hash,
}

impl Grouping {
    pub fn key(self, result: &SearchResult) -> FilterKey {
        match self {
            Self::Single => FilterKey::default(),
            Self::Name => FilterKey::new(normalize_name(&result.display_name)),
            Self::Source => FilterKey::new(result.source.as_str()),
            Self::Uid => FilterKey::new(result.uid.as_str()),
            Self::Hash => FilterKey::new(result.hash.as_deref().unwrap_or(&result.uid)),
        }
    }
}

impl FromStr for Grouping {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "name" => Ok(Self::Name),
            "source" => Ok(Self::Source),
            "uid" => Ok(Self::Uid),
            "hash" => Ok(Self::Hash),
            other => Err(AppError::InvalidFilter(format!("unknown grouping '{other}'"))),
        }
    }
}

/// Predicate plus key function. Filters hold no per-view state, so one
/// filter can back any number of views.
pub trait SearchFilter: Send + Sync {
    fn accept(&self, result: &SearchResult) -> bool;

    fn key(&self, result: &SearchResult) -> FilterKey;
}

/// Accepts every result.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll {
    grouping: Grouping,
}

impl AcceptAll {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grouped_by(grouping: Grouping) -> Self {
        Self { grouping }
    }
}

impl SearchFilter for AcceptAll {
    fn accept(&self, _result: &SearchResult) -> bool {
        true
    }

    fn key(&self, result: &SearchResult) -> FilterKey {
        self.grouping.key(result)
    }
}

/// Accepts results from a fixed set of sources.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    sources: BTreeSet<String>,
    grouping: Grouping,
}

impl SourceFilter {
    pub fn new<I, S>(sources: I, grouping: Grouping) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: BTreeSet<String> = sources.into_iter().map(Into::into).collect();
        if sources.is_empty() {
            return Err(AppError::InvalidFilter(
                "source filter needs at least one source".into(),
            ));
        }
        Ok(Self { sources, grouping })
    }
}

impl SearchFilter for SourceFilter {
    fn accept(&self, result: &SearchResult) -> bool {
        self.sources.contains(&result.source)
    }

    fn key(&self, result: &SearchResult) -> FilterKey {
        self.grouping.key(result)
    }
}

/// Accepts results whose name matches any of the search keywords, exactly or
/// within a fuzzy edit distance.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    keywords: Vec<String>,
    grouping: Grouping,
}

impl KeywordFilter {
    pub fn new(keywords: &str, grouping: Grouping) -> Result<Self> {
        let keywords = tokenize_keywords(keywords);
        if keywords.is_empty() {
            return Err(AppError::InvalidFilter(
                "keyword filter needs at least one non-stopword keyword".into(),
            ));
        }
        Ok(Self { keywords, grouping })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl SearchFilter for KeywordFilter {
    fn accept(&self, result: &SearchResult) -> bool {
        matches_any_keyword(&self.keywords, &result.display_name)
    }

    fn key(&self, result: &SearchResult) -> FilterKey {
        self.grouping.key(result)
    }
}

/// Filter built from two closures.
pub struct FnFilter<A, K> {
    accept: A,
    key: K,
}

impl<A, K> FnFilter<A, K>
where
    A: Fn(&SearchResult) -> bool + Send + Sync,
    K: Fn(&SearchResult) -> FilterKey + Send + Sync,
{
    pub fn new(accept: A, key: K) -> Self {
        Self { accept, key }
    }
}

impl<A, K> SearchFilter for FnFilter<A, K>
where
    A: Fn(&SearchResult) -> bool + Send + Sync,
    K: Fn(&SearchResult) -> FilterKey + Send + Sync,
{
    fn accept(&self, result: &SearchResult) -> bool {
        (self.accept)(result)
    }

    fn key(&self, result: &SearchResult) -> FilterKey {
        (self.key)(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(source: &str, name: &str) -> SearchResult {
        SearchResult::new(source, name, format!("https://{source}/{name}"), "l")
    }

    #[test]
    fn test_grouping_keys() {
        let r = result("x", "Foo_Bar").with_hash("ABC");
        assert_eq!(Grouping::Single.key(&r), FilterKey::default());
        assert_eq!(Grouping::Name.key(&r).as_str(), "foo bar");
        assert_eq!(Grouping::Source.key(&r).as_str(), "x");
        assert_eq!(Grouping::Uid.key(&r).as_str(), r.uid);
        assert_eq!(Grouping::Hash.key(&r).as_str(), "abc");

        let unhashed = result("x", "Foo");
        assert_eq!(Grouping::Hash.key(&unhashed).as_str(), unhashed.uid);
    }

    #[test]
    fn test_grouping_from_str() {
        assert_eq!("Name".parse::<Grouping>().unwrap(), Grouping::Name);
        assert!(matches!(
            "rank".parse::<Grouping>(),
            Err(AppError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_source_filter() {
        let filter = SourceFilter::new(["x"], Grouping::Name).unwrap();
        assert!(filter.accept(&result("x", "foo")));
        assert!(!filter.accept(&result("y", "foo")));

        let empty: [&str; 0] = [];
        assert!(SourceFilter::new(empty, Grouping::Name).is_err());
    }

    #[test]
    fn test_keyword_filter() {
        let filter = KeywordFilter::new("the ubuntu", Grouping::Single).unwrap();
        assert_eq!(filter.keywords(), ["ubuntu".to_string()]);
        assert!(filter.accept(&result("x", "Ubuntu 24.04 Desktop")));
        assert!(!filter.accept(&result("x", "A completely different download")));

        assert!(matches!(
            KeywordFilter::new("the of and", Grouping::Single),
            Err(AppError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_fn_filter() {
        let filter = FnFilter::new(
            |r: &SearchResult| r.size > 10,
            |r: &SearchResult| FilterKey::new(r.source.clone()),
        );
        assert!(filter.accept(&result("x", "a").with_size(11)));
        assert!(!filter.accept(&result("x", "a")));
        assert_eq!(filter.key(&result("x", "a")).as_str(), "x");
    }
}
