//! Local filesystem storage implementation.
//!
//! Every key maps to `{root}/{sha256(key)}.bin`. Writes go to a unique
//! temporary file that is then renamed into place, so concurrent writers of
//! the same key never expose a torn file and readers never need a lock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::CacheStore;

const ENTRY_EXTENSION: &str = "bin";

/// Local filesystem storage backend.
pub struct LocalStore {
    root_dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a key.
    fn path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root_dir.join(format!("{digest}.{ENTRY_EXTENSION}"))
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root_dir).await?;

        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{n}.tmp"));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Io(e));
        }
        Ok(())
    }

    /// Collect the sizes of all entry files, ignoring temp files.
    async fn entry_sizes(&self) -> Result<Vec<u64>> {
        let mut dir = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut sizes = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            // An entry may vanish between listing and stat.
            match entry.metadata().await {
                Ok(meta) if meta.is_file() => sizes.push(meta.len()),
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(AppError::Io(e)),
            }
        }
        Ok(sizes)
    }
}

#[async_trait]
impl CacheStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.write_bytes(&path, bytes).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut removed = 0usize;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(AppError::Io(e)),
            }
        }
        log::info!(
            "Cleared {} cache entries from {}",
            removed,
            self.root_dir.display()
        );
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.entry_sizes().await?.len() as u64)
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.entry_sizes().await?.iter().sum())
    }
}
