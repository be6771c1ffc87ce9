//! Pipeline entry points.
//!
//! - `run_search`: query every selected source and aggregate the results

pub mod search;

pub use search::{SearchContext, SearchSummary, run_search};
