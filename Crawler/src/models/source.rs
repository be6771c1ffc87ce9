// src/models/source.rs

//! Configuration-driven source definitions.
//!
//! A source definition describes how to query one remote site and which CSS
//! selectors pull results out of its listing and detail pages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A remote source described entirely by configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDefinition {
    /// Unique source name
    pub name: String,

    /// Query URL template with `{keywords}` and optional `{page}` placeholders
    pub query_url: String,

    /// HTTP method of the query request
    #[serde(default)]
    pub method: QueryMethod,

    /// Request body template for POST queries, same placeholders as `query_url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Number of result pages this source serves per query
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Extra request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Case-insensitive substrings that identify an anti-automation page
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_markers: Vec<String>,

    /// Selectors for the results page
    pub listing: ListingSelectors,

    /// Selectors for the details page, if results need a second fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<DetailSelectors>,
}

impl SourceDefinition {
    /// Validate a single source definition.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("source name is empty"));
        }
        let body = self.body.as_deref().unwrap_or_default();
        if !self.query_url.contains("{keywords}") && !body.contains("{keywords}") {
            return Err(AppError::validation(format!(
                "source '{}': query_url or body must contain {{keywords}}",
                self.name
            )));
        }
        match (self.method, &self.body) {
            (QueryMethod::Get, Some(_)) => {
                return Err(AppError::validation(format!(
                    "source '{}': body is only sent with POST methods",
                    self.name
                )));
            }
            (QueryMethod::Post | QueryMethod::PostJson, None) => {
                return Err(AppError::validation(format!(
                    "source '{}': POST queries need a body",
                    self.name
                )));
            }
            _ => {}
        }
        if self.max_pages == 0 {
            return Err(AppError::validation(format!(
                "source '{}': max_pages must be > 0",
                self.name
            )));
        }
        if self.listing.locator_selector.is_none() && self.detail.is_none() {
            return Err(AppError::validation(format!(
                "source '{}': needs either listing.locator_selector or a [detail] section",
                self.name
            )));
        }
        Ok(())
    }

    /// Build the query URL for a page (1-based).
    pub fn query_url_for(&self, page: usize, encoded_keywords: &str) -> String {
        self.query_url
            .replace("{keywords}", encoded_keywords)
            .replace("{page}", &page.to_string())
    }

    /// Build the request body for a page, with keywords already escaped for
    /// the body's content type.
    pub fn body_for(&self, page: usize, escaped_keywords: &str) -> Option<String> {
        self.body.as_ref().map(|body| {
            body.replace("{keywords}", escaped_keywords)
                .replace("{page}", &page.to_string())
        })
    }
}

/// How a source expects its query to be sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMethod {
    #[default]
    Get,
    /// Form-encoded POST
    Post,
    /// POST with a JSON document
    PostJson,
}

fn default_max_pages() -> usize {
    1
}

/// CSS selectors for a results page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// Selector for each result row
    pub row_selector: String,

    /// Selector for the title element within a row
    pub title_selector: String,

    /// Selector for the details link (defaults to the title element)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_selector: Option<String>,

    /// Attribute holding the details link
    #[serde(default = "default_attr_name")]
    pub attr_name: String,

    /// Selector for a human readable size ("1.4 GB")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_selector: Option<String>,

    /// Selector for the resource locator when the listing already has it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator_selector: Option<String>,

    /// Attribute holding the resource locator
    #[serde(default = "default_attr_name")]
    pub locator_attr: String,

    /// Selector for a content hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_selector: Option<String>,
}

/// CSS selectors for a details page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailSelectors {
    /// Selector for the resource locator
    pub locator_selector: String,

    /// Attribute holding the resource locator
    #[serde(default = "default_attr_name")]
    pub locator_attr: String,

    /// Selector for a better title than the listing one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_selector: Option<String>,

    /// Selector for a human readable size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_selector: Option<String>,

    /// Selector for a content hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_selector: Option<String>,

    /// Selector for a license reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_selector: Option<String>,
}

fn default_attr_name() -> String {
    "href".to_string()
}
