//! Live result aggregation.
//!
//! - [`SearchTable`]: every result since the last clear, shared by all sessions
//! - [`SearchView`]: a filtered, grouped projection with change notification
//! - [`SearchFilter`]: accept predicate plus grouping key
//! - [`SearchGroup`]: results sharing one key, in arrival order

mod filter;
mod group;
mod table;
mod view;

pub use filter::{
    AcceptAll, FilterKey, FnFilter, Grouping, KeywordFilter, SearchFilter, SourceFilter,
};
pub use group::SearchGroup;
pub use table::SearchTable;
pub use view::{SearchView, ViewId, ViewListener};
