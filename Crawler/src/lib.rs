// src/lib.rs

//! Search Crawler Library
//!
//! Runs keyword queries against many sources at once, crawls detail pages
//! through a shared cache, and aggregates results into live grouped views.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod sources;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
