//! Test doubles shared by the unit tests.
//!
//! [`MockAdapter`] reads a tiny line format instead of HTML:
//!
//! ```text
//! item <id> <title>          candidate needing a detail crawl
//! hashed <id> <hash> <title> candidate with a content hash
//! done <id> <title>          complete result
//! bad                        malformed item
//! more                       another page follows
//! blocked                    anti-automation page (listing or detail)
//! locator <url>              detail page body
//! ```
//!
//! Anything else, including non UTF-8 bytes, is a malformed item or page.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{CrawlableCandidate, Listing, ListingItem, SearchResult};
use crate::sources::SourceAdapter;
use crate::utils::http::{RequestBody, Transport};

#[derive(Debug, Clone)]
pub enum MockResponse {
    Body(String),
    Delayed(Duration, String),
    Fail,
    Hang,
}

/// Scripted [`Transport`] that records every requested URL.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, MockResponse>>,
    calls: Mutex<Vec<String>>,
    posted: Mutex<Vec<(String, RequestBody)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: impl Into<String>, response: MockResponse) -> Self {
        self.set(url, response);
        self
    }

    pub fn body(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.respond(url, MockResponse::Body(body.into()))
    }

    pub fn set(&self, url: impl Into<String>, response: MockResponse) {
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        responses.insert(url.into(), response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|u| *u == url).count()
    }

    /// POST requests received so far, with their bodies.
    pub fn posted(&self) -> Vec<(String, RequestBody)> {
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn answer(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        let response = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned();

        match response {
            Some(MockResponse::Body(body)) => Ok(body.into_bytes()),
            Some(MockResponse::Delayed(delay, body)) => {
                tokio::time::sleep(delay).await;
                Ok(body.into_bytes())
            }
            Some(MockResponse::Fail) => Err(AppError::fetch(url, "connection reset")),
            Some(MockResponse::Hang) => {
                tokio::time::sleep(timeout + Duration::from_secs(60)).await;
                Err(AppError::Timeout {
                    url: url.to_string(),
                })
            }
            None => Err(AppError::fetch(url, "404 Not Found")),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        _headers: &[(String, String)],
    ) -> Result<Vec<u8>> {
        self.answer(url, timeout).await
    }

    async fn post(
        &self,
        url: &str,
        timeout: Duration,
        _headers: &[(String, String)],
        body: &RequestBody,
    ) -> Result<Vec<u8>> {
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((url.to_string(), body.clone()));
        self.answer(url, timeout).await
    }
}

/// [`Transport`] that answers every URL with the same body after a delay
/// and tracks how many fetches were in flight at once.
pub struct GaugeTransport {
    delay: Duration,
    body: String,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl GaugeTransport {
    pub fn new(delay: Duration, body: impl Into<String>) -> Self {
        Self {
            delay,
            body: body.into(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Highest number of concurrent fetches observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for GaugeTransport {
    async fn fetch(
        &self,
        _url: &str,
        _timeout: Duration,
        _headers: &[(String, String)],
    ) -> Result<Vec<u8>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.body.clone().into_bytes())
    }
}

/// Line-format [`SourceAdapter`].
pub struct MockAdapter {
    name: String,
    max_pages: usize,
    detail: bool,
    post: bool,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_pages: 1,
            detail: true,
            post: false,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Resolve candidates from their listing hints instead of crawling.
    pub fn without_detail(mut self) -> Self {
        self.detail = false;
        self
    }

    /// Send queries as JSON POSTs.
    pub fn with_post_body(mut self) -> Self {
        self.post = true;
        self
    }

    pub fn query_url(&self, page: usize) -> String {
        format!("https://{}.test/search?page={page}", self.name)
    }

    pub fn item_url(&self, id: &str) -> String {
        format!("https://{}.test/item/{id}", self.name)
    }
}

impl SourceAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_pages(&self) -> usize {
        self.max_pages
    }

    fn build_query_url(&self, page: usize, _keywords: &str) -> Result<String> {
        Ok(self.query_url(page))
    }

    fn build_query_body(&self, page: usize, keywords: &str) -> Result<Option<RequestBody>> {
        Ok(self.post.then(|| {
            RequestBody::json(format!(r#"{{"q":"{keywords}","page":{page}}}"#))
        }))
    }

    fn parse_listing(&self, bytes: &[u8]) -> Result<Listing> {
        let text = std::str::from_utf8(bytes).map_err(|e| AppError::parse(&self.name, e))?;
        let mut items = Vec::new();
        let mut has_more = false;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let mut parts = line.splitn(2, ' ');
            let kind = parts.next().unwrap_or_default();
            let rest = parts.next().unwrap_or_default();
            match kind {
                "more" => has_more = true,
                "item" | "done" => {
                    let (id, title) = rest.split_once(' ').unwrap_or((rest, rest));
                    let details_url = self.item_url(id);
                    if kind == "done" {
                        let locator = format!("{details_url}/download");
                        items.push(Ok(ListingItem::Complete(SearchResult::new(
                            self.name.as_str(),
                            title,
                            details_url,
                            locator,
                        ))));
                    } else {
                        items.push(Ok(ListingItem::Candidate(
                            CrawlableCandidate::new(self.name.as_str(), details_url, id)
                                .with_hint("title", title),
                        )));
                    }
                }
                "hashed" => {
                    let mut fields = rest.splitn(3, ' ');
                    let id = fields.next().unwrap_or_default();
                    let hash = fields.next().unwrap_or_default();
                    let title = fields.next().unwrap_or(id);
                    items.push(Ok(ListingItem::Candidate(
                        CrawlableCandidate::new(self.name.as_str(), self.item_url(id), id)
                            .with_hint("title", title)
                            .with_hash(hash),
                    )));
                }
                _ => items.push(Err(AppError::parse(&self.name, format!("bad line '{line}'")))),
            }
        }
        Ok(Listing::new(items, has_more))
    }

    fn build_detail_url(&self, candidate: &CrawlableCandidate) -> Option<String> {
        self.detail.then(|| candidate.details_url.clone())
    }

    fn parse_detail(
        &self,
        candidate: &CrawlableCandidate,
        bytes: Option<&[u8]>,
    ) -> Result<SearchResult> {
        let title = candidate.hint("title").unwrap_or(&candidate.item_id);
        let locator = match bytes {
            None => format!("{}/download", candidate.details_url),
            Some(bytes) => {
                let text =
                    std::str::from_utf8(bytes).map_err(|e| AppError::parse(&self.name, e))?;
                text.trim()
                    .strip_prefix("locator ")
                    .ok_or_else(|| AppError::parse(&self.name, "details page without locator"))?
                    .to_string()
            }
        };
        let mut result = SearchResult::new(
            self.name.as_str(),
            title,
            candidate.details_url.as_str(),
            locator,
        );
        if let Some(hash) = &candidate.hash {
            result = result.with_hash(hash.as_str());
        }
        Ok(result)
    }

    fn is_blocked(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"blocked")
    }
}
