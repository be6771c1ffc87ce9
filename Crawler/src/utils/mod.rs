//! Utility functions and helpers.

pub mod http;
pub mod text;

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static MAGNET_HASH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)magnet:\?xt=urn:btih:([a-f0-9]{40})").ok());

static HUMAN_SIZE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([0-9][0-9.,]*)\s*(b|bytes?|kb|kib|mb|mib|gb|gib|tb|tib)?\s*$").ok()
});

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Form-encode search keywords for use in a query string.
pub fn encode_keywords(keywords: &str) -> String {
    url::form_urlencoded::byte_serialize(keywords.trim().as_bytes()).collect()
}

/// Extract a lowercase BitTorrent info-hash from a magnet link.
pub fn parse_info_hash(locator: &str) -> Option<String> {
    let pattern = MAGNET_HASH.as_ref()?;
    pattern
        .captures(locator)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Parse a human readable size ("1.4 GB", "700 MiB", "5120") into bytes.
///
/// Units are binary multiples; commas are treated as thousands separators.
pub fn parse_size(text: &str) -> Option<u64> {
    let pattern = HUMAN_SIZE.as_ref()?;
    let caps = pattern.captures(text)?;
    let number: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let unit = caps
        .get(2)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();

    let multiplier: f64 = match unit.as_str() {
        "" | "b" | "byte" | "bytes" => 1.0,
        "kb" | "kib" => 1024.0,
        "mb" | "mib" => 1024.0 * 1024.0,
        "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        "tb" | "tib" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((number * multiplier).round() as u64)
}

/// Extract an item identifier from a URL: a numeric query value or the last
/// non-empty path segment.
pub fn extract_item_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;

    for (key, value) in parsed.query_pairs() {
        if matches!(key.as_ref(), "id" | "seq" | "no" | "idx" | "item")
            && !value.is_empty()
        {
            return Some(value.into_owned());
        }
    }

    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(|s| s.to_string())
}
