//! Storage abstractions for crawl cache persistence.
//!
//! The crawl cache only needs a byte-oriented key/value store. Two backends
//! are provided:
//!
//! - [`LocalStore`]: one file per key under a root directory
//! - [`MemoryStore`]: an in-process map, for tests and throwaway runs
//!
//! ## Directory Structure
//!
//! ```text
//! {root}/
//! ├── 3f2a...e1.bin         # sha256(key) -> raw bytes
//! └── 9c07...4d.bin
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;

/// Trait for byte-oriented key/value backends.
///
/// Implementations must be safe to call from many tasks at once and must not
/// hold a store-wide lock across I/O.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the bytes stored under `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `bytes` under `key`, replacing any previous value.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every entry.
    async fn clear(&self) -> Result<()>;

    /// Number of stored entries.
    async fn count(&self) -> Result<u64>;

    /// Total stored payload size in bytes.
    async fn size(&self) -> Result<u64>;
}
