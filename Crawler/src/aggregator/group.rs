use std::sync::Arc;

use crate::aggregator::FilterKey;
use crate::models::SearchResult;

/// Results sharing one [`FilterKey`], in arrival order.
#[derive(Debug, Clone)]
pub struct SearchGroup {
    key: FilterKey,
    results: Vec<Arc<SearchResult>>,
}

impl SearchGroup {
    pub(crate) fn new(key: FilterKey) -> Self {
        Self {
            key,
            results: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, result: Arc<SearchResult>) {
        self.results.push(result);
    }

    pub fn key(&self) -> &FilterKey {
        &self.key
    }

    pub fn results(&self) -> &[Arc<SearchResult>] {
        &self.results
    }

    /// The first result that arrived.
    pub fn first(&self) -> Option<&Arc<SearchResult>> {
        self.results.first()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
