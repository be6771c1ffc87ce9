// src/pipeline/search.rs

//! End-to-end keyword search across every selected source.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::aggregator::SearchTable;
use crate::cache::CrawlCache;
use crate::error::{AppError, Result};
use crate::models::Config;
use crate::services::{
    PerformerOptions, QueryPerformer, SearchManager, SearchToken, SessionOutcome,
};
use crate::sources::SourceRegistry;
use crate::utils::http::{HttpTransport, Transport};
use crate::utils::text::tokenize_keywords;

/// Everything a search needs, constructed once and passed around.
///
/// Every search run through the same context shares one session pool, so
/// `crawler.max_concurrent` bounds the whole process, not each search.
#[derive(Clone)]
pub struct SearchContext {
    pub config: Arc<Config>,
    pub registry: SourceRegistry,
    pub transport: Arc<dyn Transport>,
    pub cache: CrawlCache,
    pub table: SearchTable,
    pub manager: SearchManager,
}

impl SearchContext {
    pub fn new(
        config: Config,
        registry: SourceRegistry,
        transport: Arc<dyn Transport>,
        cache: CrawlCache,
    ) -> Self {
        let table = SearchTable::with_config(&config.aggregator);
        let manager = SearchManager::new(table.clone(), config.crawler.max_concurrent);
        Self {
            config: Arc::new(config),
            registry,
            transport,
            cache,
            table,
            manager,
        }
    }

    /// Validate the configuration and build the HTTP transport, on-disk or
    /// in-memory cache and source registry it describes.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let registry = SourceRegistry::from_config(&config)?;
        let transport = Arc::new(HttpTransport::new(&config.crawler)?);
        let cache = CrawlCache::from_config(&config.cache);
        Ok(Self::new(config, registry, transport, cache))
    }
}

/// What one search did, per source.
#[derive(Debug, Clone)]
pub struct SearchSummary {
    pub token: SearchToken,
    pub keywords: String,
    pub outcomes: Vec<SessionOutcome>,
    pub total_results: usize,
    pub blocked_sources: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Run one search against `sources` (every registered source when empty)
/// and wait for all sessions to finish. Results land in `ctx.table`.
pub async fn run_search(
    ctx: &SearchContext,
    keywords: &str,
    sources: &[String],
) -> Result<SearchSummary> {
    if tokenize_keywords(keywords).is_empty() {
        return Err(AppError::validation(format!(
            "no searchable keywords in '{keywords}'"
        )));
    }

    let adapters = ctx.registry.select(sources)?;
    if adapters.is_empty() {
        return Err(AppError::config("No sources configured"));
    }

    let started_at = Utc::now();
    let manager = &ctx.manager;
    let token = manager.next_token();
    log::info!(
        "Searching {} source(s) for '{}' (token {token})",
        adapters.len(),
        keywords.trim()
    );

    let options = PerformerOptions::from_config(&ctx.config.crawler);
    for adapter in adapters {
        let performer = QueryPerformer::new(
            token,
            keywords.trim(),
            adapter,
            Arc::clone(&ctx.transport),
            ctx.cache.clone(),
            options.clone(),
        );
        manager.perform(performer)?;
    }

    let mut outcomes = manager.wait(token).await;
    outcomes.sort_by(|a, b| a.source.cmp(&b.source));

    let total_results = outcomes.iter().map(|o| o.results_emitted).sum();
    let blocked_sources: Vec<String> = outcomes
        .iter()
        .filter(|o| o.blocked)
        .map(|o| o.source.clone())
        .collect();
    for source in &blocked_sources {
        log::warn!("Source '{source}' blocked this search; try again later or use a mirror");
    }

    let finished_at = Utc::now();
    log::info!(
        "Search finished: {} result(s) in {} ms",
        total_results,
        (finished_at - started_at).num_milliseconds()
    );

    Ok(SearchSummary {
        token,
        keywords: keywords.trim().to_string(),
        outcomes,
        total_results,
        blocked_sources,
        started_at,
        finished_at,
    })
}
