// src/models/mod.rs

//! Domain models for the search crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod result;
mod source;

// Re-export all public types
pub use config::{
    AggregatorConfig, CacheConfig, Config, CrawlerConfig, EvictionPolicy, LoggingConfig,
};
pub use result::{CrawlableCandidate, Listing, ListingItem, SearchResult, derive_uid};
pub use source::{DetailSelectors, ListingSelectors, QueryMethod, SourceDefinition};
