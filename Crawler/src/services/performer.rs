// src/services/performer.rs

//! One keyword query against one source.
//!
//! A session walks the source's result pages in order. Complete listing items
//! are kept as they are; candidates get their details page resolved through
//! the crawl cache or the network, one at a time. Each page's results are
//! handed to the registered callback as one batch once the page is done.
//!
//! Nothing that goes wrong with a single page or item fails the session: a
//! failed page ends it early, a failed item is dropped, and an
//! anti-automation answer sets the blocked flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::CrawlCache;
use crate::error::{AppError, Result};
use crate::models::{CrawlableCandidate, CrawlerConfig, ListingItem, SearchResult};
use crate::sources::SourceAdapter;
use crate::utils::http::{RequestBody, Transport};

/// Caller-chosen identifier shared by all sessions of one user search.
pub type SearchToken = u64;

type ResultsCallback = Arc<dyn Fn(Vec<Arc<SearchResult>>) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&AppError) + Send + Sync>;

/// Per-session limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformerOptions {
    /// Cap on result pages, applied on top of the adapter's own cap
    pub max_pages: usize,
    /// Result ceiling; the batch that crosses it is truncated
    pub max_results: usize,
    /// Detail fetches allowed per session (cache hits are free)
    pub max_crawls: usize,
    pub page_timeout: Duration,
    pub detail_timeout: Duration,
    /// Bound on the whole session
    pub session_timeout: Duration,
}

impl PerformerOptions {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            max_results: config.max_results,
            max_crawls: config.max_crawls,
            page_timeout: config.page_timeout(),
            detail_timeout: config.detail_timeout(),
            session_timeout: config.session_timeout(),
        }
    }
}

impl Default for PerformerOptions {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// What a finished session did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOutcome {
    pub token: SearchToken,
    pub source: String,
    pub pages_fetched: usize,
    pub batches_emitted: usize,
    pub results_emitted: usize,
    /// Listing items that failed to parse
    pub items_skipped: usize,
    /// Candidates that did not become results
    pub candidates_dropped: usize,
    /// Detail pages fetched from the network
    pub crawls: usize,
    pub blocked: bool,
    pub timed_out: bool,
    pub stopped: bool,
}

enum Resolution {
    Resolved(SearchResult),
    Dropped,
    Blocked,
}

struct PerformerInner {
    token: SearchToken,
    keywords: String,
    adapter: Arc<dyn SourceAdapter>,
    transport: Arc<dyn Transport>,
    cache: CrawlCache,
    options: PerformerOptions,
    started: AtomicBool,
    stopped: AtomicBool,
    blocked: AtomicBool,
    on_results: Mutex<Option<ResultsCallback>>,
    on_error: Mutex<Option<ErrorCallback>>,
}

/// A single query session. Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct QueryPerformer {
    inner: Arc<PerformerInner>,
}

impl QueryPerformer {
    pub fn new(
        token: SearchToken,
        keywords: impl Into<String>,
        adapter: Arc<dyn SourceAdapter>,
        transport: Arc<dyn Transport>,
        cache: CrawlCache,
        options: PerformerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(PerformerInner {
                token,
                keywords: keywords.into(),
                adapter,
                transport,
                cache,
                options,
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                blocked: AtomicBool::new(false),
                on_results: Mutex::new(None),
                on_error: Mutex::new(None),
            }),
        }
    }

    pub fn token(&self) -> SearchToken {
        self.inner.token
    }

    pub fn keywords(&self) -> &str {
        &self.inner.keywords
    }

    pub fn source_name(&self) -> &str {
        self.inner.adapter.name()
    }

    /// Register the batch callback, replacing any previous one.
    pub fn on_results<F>(&self, callback: F)
    where
        F: Fn(Vec<Arc<SearchResult>>) + Send + Sync + 'static,
    {
        let mut slot = self
            .inner
            .on_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(callback));
    }

    /// Register a callback for results pages that could not be fetched or
    /// parsed, replacing any previous one. The session carries on without
    /// the page either way.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&AppError) + Send + Sync + 'static,
    {
        let mut slot = self
            .inner
            .on_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(callback));
    }

    /// Spawn the session on the current Tokio runtime.
    pub fn perform(&self) -> Result<JoinHandle<SessionOutcome>> {
        let handle = Handle::try_current().map_err(|_| {
            AppError::contract("QueryPerformer::perform requires a Tokio runtime")
        })?;
        self.claim_start()?;
        let this = self.clone();
        Ok(handle.spawn(async move { this.execute().await }))
    }

    /// Run the session to completion on the calling task.
    pub async fn run(&self) -> Result<SessionOutcome> {
        self.claim_start()?;
        Ok(self.execute().await)
    }

    /// Request cooperative cancellation. In-flight fetches finish; nothing
    /// is emitted afterwards.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub fn is_blocked(&self) -> bool {
        self.inner.blocked.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    fn claim_start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(AppError::contract(format!(
                "session for '{}' was already started",
                self.source_name()
            )));
        }
        Ok(())
    }

    fn mark_blocked(&self) {
        log::warn!(
            "[{}] source is blocking automated requests",
            self.source_name()
        );
        self.inner.blocked.store(true, Ordering::Release);
    }

    /// True when the session must not continue; trips the stop flag when the
    /// session deadline has passed.
    fn should_stop(&self, deadline: Instant, outcome: &mut SessionOutcome) -> bool {
        if self.is_stopped() {
            return true;
        }
        if Instant::now() >= deadline {
            log::warn!("[{}] session timed out", self.source_name());
            outcome.timed_out = true;
            self.stop();
            return true;
        }
        false
    }

    async fn execute(&self) -> SessionOutcome {
        let inner = &self.inner;
        let adapter = inner.adapter.as_ref();
        let options = &inner.options;
        let deadline = Instant::now() + options.session_timeout;
        let headers = adapter.headers();
        let page_cap = adapter.max_pages().min(options.max_pages);

        let mut outcome = SessionOutcome {
            token: inner.token,
            source: adapter.name().to_string(),
            ..SessionOutcome::default()
        };
        log::info!(
            "[{}] search '{}' started ({} page(s) max)",
            adapter.name(),
            inner.keywords,
            page_cap
        );

        for page in 1..=page_cap {
            if self.should_stop(deadline, &mut outcome) {
                break;
            }

            let request = adapter
                .build_query_url(page, &inner.keywords)
                .and_then(|url| Ok((url, adapter.build_query_body(page, &inner.keywords)?)));
            let (url, body) = match request {
                Ok(request) => request,
                Err(e) => {
                    log::warn!("[{}] cannot build page {page} request: {e}", adapter.name());
                    self.report_error(&e);
                    break;
                }
            };
            let bytes = match self
                .fetch(&url, body.as_ref(), options.page_timeout, deadline, &headers)
                .await
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("[{}] page {page} failed: {e}", adapter.name());
                    self.report_error(&e);
                    self.should_stop(deadline, &mut outcome);
                    break;
                }
            };
            outcome.pages_fetched += 1;

            if adapter.is_blocked(&bytes) {
                self.mark_blocked();
                break;
            }

            let listing = match adapter.parse_listing(&bytes) {
                Ok(listing) => listing,
                Err(e) => {
                    log::warn!("[{}] page {page} unparseable: {e}", adapter.name());
                    self.report_error(&e);
                    break;
                }
            };

            let mut batch: Vec<Arc<SearchResult>> = Vec::new();
            let mut end_after_page = false;
            for item in listing.items {
                match item {
                    Err(e) => {
                        log::warn!("[{}] skipping item on page {page}: {e}", adapter.name());
                        outcome.items_skipped += 1;
                    }
                    Ok(ListingItem::Complete(result)) => batch.push(Arc::new(result)),
                    Ok(ListingItem::Candidate(candidate)) => {
                        if end_after_page || self.should_stop(deadline, &mut outcome) {
                            outcome.candidates_dropped += 1;
                            continue;
                        }
                        match self
                            .resolve(&candidate, &headers, deadline, &mut outcome)
                            .await
                        {
                            Resolution::Resolved(result) => batch.push(Arc::new(result)),
                            Resolution::Dropped => outcome.candidates_dropped += 1,
                            Resolution::Blocked => {
                                outcome.candidates_dropped += 1;
                                end_after_page = true;
                            }
                        }
                    }
                }
            }

            if self.should_stop(deadline, &mut outcome) {
                break;
            }

            let room = options.max_results.saturating_sub(outcome.results_emitted);
            batch.truncate(room);
            if !batch.is_empty() {
                outcome.results_emitted += batch.len();
                outcome.batches_emitted += 1;
                self.emit(batch);
            }

            if end_after_page || !listing.has_more {
                break;
            }
            if outcome.results_emitted >= options.max_results {
                log::debug!("[{}] result ceiling reached", adapter.name());
                break;
            }
        }

        outcome.blocked = self.is_blocked();
        outcome.stopped = self.is_stopped();
        log::info!(
            "[{}] search finished: {} result(s) from {} page(s), {} dropped, {} crawl(s)",
            adapter.name(),
            outcome.results_emitted,
            outcome.pages_fetched,
            outcome.candidates_dropped,
            outcome.crawls
        );
        outcome
    }

    /// Turn a candidate into a result via the cache or a detail fetch.
    async fn resolve(
        &self,
        candidate: &CrawlableCandidate,
        headers: &[(String, String)],
        deadline: Instant,
        outcome: &mut SessionOutcome,
    ) -> Resolution {
        let inner = &self.inner;
        let adapter = inner.adapter.as_ref();
        let cache = &inner.cache;

        let Some(detail_url) = adapter.build_detail_url(candidate) else {
            return match adapter.parse_detail(candidate, None) {
                Ok(result) => Resolution::Resolved(result),
                Err(e) => {
                    log::warn!("[{}] dropping {}: {e}", adapter.name(), candidate.details_url);
                    Resolution::Dropped
                }
            };
        };

        let hash_key = candidate.hash.as_deref().map(CrawlCache::hash_key);
        let mut cached = cache.get(&detail_url).await;
        if cached.is_none() {
            if let Some(key) = &hash_key {
                cached = cache.get(key).await;
            }
        }

        let bytes = match cached {
            Some(bytes) => bytes,
            None => {
                if outcome.crawls >= inner.options.max_crawls {
                    log::debug!(
                        "[{}] crawl limit reached, dropping {detail_url}",
                        adapter.name()
                    );
                    return Resolution::Dropped;
                }
                if cache.recently_failed(&detail_url).await {
                    log::debug!("[{}] {detail_url} failed recently, skipping", adapter.name());
                    return Resolution::Dropped;
                }

                outcome.crawls += 1;
                let bytes = match self
                    .fetch(&detail_url, None, inner.options.detail_timeout, deadline, headers)
                    .await
                {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log::warn!("[{}] detail fetch failed: {e}", adapter.name());
                        cache.mark_failed(&detail_url).await;
                        return Resolution::Dropped;
                    }
                };
                if adapter.is_blocked(&bytes) {
                    self.mark_blocked();
                    return Resolution::Blocked;
                }

                cache.put(&detail_url, &bytes).await;
                if let Some(key) = &hash_key {
                    cache.put(key, &bytes).await;
                }
                bytes
            }
        };

        match adapter.parse_detail(candidate, Some(&bytes)) {
            Ok(result) => Resolution::Resolved(result),
            Err(e) => {
                log::warn!("[{}] dropping {detail_url}: {e}", adapter.name());
                cache.remove(&detail_url).await;
                if let Some(key) = &hash_key {
                    cache.remove(key).await;
                }
                Resolution::Dropped
            }
        }
    }

    /// Fetch bounded by the per-call timeout and what is left of the session.
    async fn fetch(
        &self,
        url: &str,
        body: Option<&RequestBody>,
        per_call: Duration,
        deadline: Instant,
        headers: &[(String, String)],
    ) -> Result<Vec<u8>> {
        let timeout = per_call.min(deadline.saturating_duration_since(Instant::now()));
        if timeout.is_zero() {
            return Err(AppError::Timeout {
                url: url.to_string(),
            });
        }
        let transport = self.inner.transport.as_ref();
        let request = async {
            match body {
                Some(body) => transport.post(url, timeout, headers, body).await,
                None => transport.fetch(url, timeout, headers).await,
            }
        };
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout {
                url: url.to_string(),
            }),
        }
    }

    fn report_error(&self, error: &AppError) {
        let callback = self
            .inner
            .on_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(error);
        }
    }

    fn emit(&self, batch: Vec<Arc<SearchResult>>) {
        let callback = self
            .inner
            .on_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(callback) => callback(batch),
            None => log::debug!(
                "[{}] no results callback, discarding {} result(s)",
                self.source_name(),
                batch.len()
            ),
        }
    }
}
