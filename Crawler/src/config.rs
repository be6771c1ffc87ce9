// src/config.rs

//! Configuration loading utilities.

use std::path::Path;

use crate::error::Result;
use crate::models::Config;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "search-crawler.toml";

/// Load configuration from a TOML file.
///
/// A missing file falls back to defaults; a file that exists but does not
/// parse is an error, so a typo never silently drops every source.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::warn!(
            "Config file {} not found, using default configuration",
            path.display()
        );
        return Ok(Config::default());
    }
    let config = Config::load(path)?;
    log::debug!(
        "Loaded {} source definition(s) from {}",
        config.sources.len(),
        path.display()
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[crawler\nmax_pages = ").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_loads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[crawler]\nmax_pages = 1\n").unwrap();
        assert_eq!(load_config(&path).unwrap().crawler.max_pages, 1);
    }
}
