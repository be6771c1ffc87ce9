//! Service layer for the search pipeline.
//!
//! - Query sessions against a single source (`QueryPerformer`)
//! - A bounded session pool grouped by search token (`SearchManager`)

mod manager;
mod performer;

pub use manager::{SearchListener, SearchManager};
pub use performer::{PerformerOptions, QueryPerformer, SearchToken, SessionOutcome};
